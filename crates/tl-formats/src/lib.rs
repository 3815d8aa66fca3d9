//! Format decoders for tracklift.
//!
//! Detects and decodes tracker modules (MOD and its tracker variants,
//! AMD, EMOD, GAL4, MDL, MED4, RAD and ProWizard-packed ProTracker
//! modules) into the canonical [`tl_ir::Song`].

extern crate alloc;

mod amd_format;
mod bits;
mod chunk;
pub mod effect_parser;
mod emod_format;
mod gal4_format;
mod mdl_format;
mod med4_format;
mod mod_format;
mod pw_format;
mod rad_format;
mod reader;
mod registry;

pub use bits::{unpack_sample16, unpack_sample8};
pub use chunk::{ChunkConfig, ChunkHandler, ChunkParser, Endian};
pub use reader::ByteReader;
pub use registry::{detect_format, load_module, load_module_with, Detection, Format};

use tl_ir::AllocError;

/// Error type for format detection and decoding.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// Read or seek past the end of the data
    #[error("unexpected end of data")]
    Truncated,
    /// A header field holds an impossible value
    #[error("malformed header: {0}")]
    MalformedHeader(&'static str),
    /// Recognized, but a variant this crate cannot decode
    #[error("unsupported variant: {0}")]
    UnsupportedVariant(&'static str),
    /// Allocation for the decoded song failed
    #[error("out of memory")]
    OutOfMemory(#[from] AllocError),
    /// No format accepted the data
    #[error("unrecognized format")]
    UnrecognizedFormat,
    /// The detected format failed to decode
    #[error("failed to load {format} module")]
    LoadFailed {
        format: &'static str,
        #[source]
        source: Box<FormatError>,
    },
}

impl From<binrw::Error> for FormatError {
    fn from(err: binrw::Error) -> Self {
        if err.is_eof() {
            FormatError::Truncated
        } else {
            FormatError::MalformedHeader("unreadable fixed header")
        }
    }
}

/// Decoder configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Take MOD loop starts in bytes instead of words
    pub fix_loop: bool,
    /// Decode headers and patterns but leave PCM sample data empty
    pub skip_samples: bool,
}
