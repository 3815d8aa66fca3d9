//! Note and event types stored in tracks.

use crate::effects::{Effect, VolumeCommand};
use crate::instrument::NOTE_RANGE;

/// A note value in a track event.
///
/// Note numbers are semitones where ProTracker period 428 (C-2 on the
/// Amiga) is `On(60)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Note {
    /// No note
    #[default]
    None,
    /// Note on with semitone number (0-119)
    On(u8),
    /// Key off / release
    Off,
}

impl Note {
    /// Note on for semitone `n`, or `Note::None` if `n` is out of range.
    pub fn from_semitone(n: i32) -> Note {
        if (0..NOTE_RANGE as i32).contains(&n) {
            Note::On(n as u8)
        } else {
            Note::None
        }
    }
}

/// A single row of a track.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Event {
    /// Note value
    pub note: Note,
    /// Instrument number (0 = none, 1-255 = instrument index + 1)
    pub instrument: u8,
    /// Volume column command
    pub volume: VolumeCommand,
    /// First effect column
    pub effect: Effect,
    /// Second effect column (dual-effect formats)
    pub effect2: Effect,
}

impl Event {
    /// Create an empty event.
    pub const fn empty() -> Self {
        Self {
            note: Note::None,
            instrument: 0,
            volume: VolumeCommand::None,
            effect: Effect::None,
            effect2: Effect::None,
        }
    }

    /// Returns true if the event is completely empty.
    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }
}
