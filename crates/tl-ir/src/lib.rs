//! Canonical module model for tracklift.
//!
//! Every format decoder emits this representation and playback consumes
//! it. Patterns reference tracks by index so several patterns can share
//! one track.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod effects;
mod event;
mod instrument;
mod pattern;
mod sample;
pub mod song;

pub use effects::{Effect, VolumeCommand};
pub use event::{Event, Note};
pub use instrument::{
    Envelope, EnvelopePoint, Instrument, SubInstrument, SynthTables, MAX_ENVELOPE_POINTS,
    NOTE_RANGE,
};
pub use pattern::{Pattern, Track, TrackId};
pub use sample::{
    c2spd_to_note, AdlibPatch, AutoVibrato, LoopType, Sample, SampleData, C4_NTSC_RATE,
    C4_PAL_RATE,
};
pub use song::{AllocError, ChannelSettings, OrderEntry, Quirks, Song, ValidationError};
