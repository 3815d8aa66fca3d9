//! Format detection and dispatch.
//!
//! Each format contributes a detector and a loader. Detection runs the
//! detectors in [`Format::ALL`] order on a fresh reader and the first one
//! that accepts the data decides the loader.

use tl_ir::Song;
use tracing::{debug, warn};

use crate::reader::ByteReader;
use crate::{
    amd_format, emod_format, gal4_format, mdl_format, med4_format, mod_format, pw_format,
    rad_format,
};
use crate::{FormatError, LoadOptions};

type TestFn = fn(&mut ByteReader) -> Result<String, FormatError>;
type LoadFn = fn(&mut Song, &mut ByteReader, &LoadOptions) -> Result<(), FormatError>;

/// Supported module formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    Emod,
    Gal4,
    Mdl,
    Med4,
    Rad,
    Amd,
    Mod,
    Mp,
}

/// Result of a successful detection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Detection {
    pub format: Format,
    /// Module title, empty if the format stores none
    pub title: String,
}

impl Format {
    /// All formats in detection order. Formats with a strong magic come
    /// before MOD, whose numeric tags accept almost anything; the packer
    /// check, which only validates header ranges, is last.
    pub const ALL: [Format; 8] = [
        Format::Emod,
        Format::Gal4,
        Format::Mdl,
        Format::Med4,
        Format::Rad,
        Format::Amd,
        Format::Mod,
        Format::Mp,
    ];

    /// Short identifier.
    pub fn id(self) -> &'static str {
        match self {
            Format::Emod => "EMOD",
            Format::Gal4 => "GAL4",
            Format::Mdl => "MDL",
            Format::Med4 => "MED4",
            Format::Rad => "RAD",
            Format::Amd => "AMD",
            Format::Mod => "MOD",
            Format::Mp => "MP",
        }
    }

    /// Human-readable format name.
    pub fn name(self) -> &'static str {
        match self {
            Format::Emod => "Quadra Composer",
            Format::Gal4 => "Galaxy Music System 4.0",
            Format::Mdl => "Digitrakker",
            Format::Med4 => "MED 2.10 MED4",
            Format::Rad => "Reality Adlib Tracker",
            Format::Amd => "Amusic Adlib Tracker",
            Format::Mod => "Noise/Fast/Protracker",
            Format::Mp => "Module Protector",
        }
    }

    fn test_fn(self) -> TestFn {
        match self {
            Format::Emod => emod_format::test_emod,
            Format::Gal4 => gal4_format::test_gal4,
            Format::Mdl => mdl_format::test_mdl,
            Format::Med4 => med4_format::test_med4,
            Format::Rad => rad_format::test_rad,
            Format::Amd => amd_format::test_amd,
            Format::Mod => mod_format::test_mod,
            Format::Mp => pw_format::test_mp,
        }
    }

    fn load_fn(self) -> LoadFn {
        match self {
            Format::Emod => emod_format::load_emod,
            Format::Gal4 => gal4_format::load_gal4,
            Format::Mdl => mdl_format::load_mdl,
            Format::Med4 => med4_format::load_med4,
            Format::Rad => rad_format::load_rad,
            Format::Amd => amd_format::load_amd,
            Format::Mod => mod_format::load_mod,
            Format::Mp => pw_format::load_mp,
        }
    }

    /// Run this format's detector on `data` from `start`.
    pub fn detect(self, data: &[u8], start: usize) -> Option<Detection> {
        if start > data.len() {
            return None;
        }
        let mut r = ByteReader::new(data, start);
        (self.test_fn())(&mut r).ok().map(|title| Detection { format: self, title })
    }

    /// Decode `data` as this format, without detection.
    pub fn load(self, data: &[u8], start: usize, opts: &LoadOptions) -> Result<Song, FormatError> {
        let fail = |source: FormatError| FormatError::LoadFailed {
            format: self.id(),
            source: Box::new(source),
        };
        if start > data.len() {
            return Err(fail(FormatError::Truncated));
        }

        let mut song = Song::default();
        let mut r = ByteReader::new(data, start);
        (self.load_fn())(&mut song, &mut r, opts).map_err(fail)?;

        let replaced = song.sanitize_order();
        if replaced > 0 {
            warn!(format = self.id(), replaced, "order entries past the last pattern");
        }
        if let Err(err) = song.validate() {
            warn!(format = self.id(), %err, "decoded song is inconsistent");
            return Err(fail(FormatError::MalformedHeader("inconsistent track references")));
        }
        Ok(song)
    }
}

/// Find the first format that accepts `data`.
pub fn detect_format(data: &[u8], start: usize) -> Option<Detection> {
    Format::ALL.iter().find_map(|f| f.detect(data, start))
}

/// Detect and decode a module with default options.
pub fn load_module(data: &[u8], start: usize) -> Result<Song, FormatError> {
    load_module_with(data, start, &LoadOptions::default())
}

/// Detect and decode a module.
///
/// A load failure in the detected format is returned as is; other formats
/// are not tried.
pub fn load_module_with(data: &[u8], start: usize, opts: &LoadOptions) -> Result<Song, FormatError> {
    let detection = detect_format(data, start).ok_or(FormatError::UnrecognizedFormat)?;
    debug!(
        format = detection.format.id(),
        name = detection.format.name(),
        title = %detection.title,
        "detected module"
    );

    detection.format.load(data, start, opts).inspect_err(|err| {
        warn!(format = detection.format.id(), %err, "load failed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        for (i, a) in Format::ALL.iter().enumerate() {
            for b in &Format::ALL[i + 1..] {
                assert_ne!(a.id(), b.id());
            }
        }
    }

    #[test]
    fn empty_input() {
        assert_eq!(detect_format(&[], 0), None);
        assert!(matches!(load_module(&[], 0), Err(FormatError::UnrecognizedFormat)));
        assert_eq!(detect_format(&[0; 4], 10), None);
    }

    #[test]
    fn magic_decides_format() {
        let mut data = b"RAD by REALiTY!!".to_vec();
        data.extend_from_slice(&[0x10, 0x06, 0x00, 0x00]);
        data.extend_from_slice(&[0; 64]);
        let found = detect_format(&data, 0).unwrap();
        assert_eq!(found.format, Format::Rad);
    }

    #[test]
    fn load_failure_does_not_fall_through() {
        // Song header chunk cut short
        let data = b"DMDL\x11IN\x40\x00\x00\x00abc";
        match load_module(data, 0) {
            Err(FormatError::LoadFailed { format, .. }) => assert_eq!(format, "MDL"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
