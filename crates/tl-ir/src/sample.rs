//! Sample data types.

use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::song::push_truncated;

/// Reference playback rate of C-4 for NTSC-tuned formats.
pub const C4_NTSC_RATE: u32 = 8363;
/// Reference playback rate of C-4 for PAL Amiga formats.
pub const C4_PAL_RATE: u32 = 8287;

/// A sample definition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sample {
    /// Sample name
    pub name: ArrayString<32>,
    /// Audio data, empty until the decoder reads it
    pub data: SampleData,
    /// Loop start position (in frames)
    pub loop_start: u32,
    /// Loop end position (in frames)
    pub loop_end: u32,
    /// Loop type
    pub loop_type: LoopType,
    /// Length in frames as declared by the module, set even when the
    /// data is not loaded
    pub length: u32,
    /// Declared as 16-bit PCM
    pub bits16: bool,
}

impl Sample {
    /// Create a new empty sample, truncating the name to capacity.
    pub fn new(name: &str) -> Self {
        let mut sample = Self::default();
        push_truncated(&mut sample.name, name);
        sample
    }

    /// Get the declared length of the sample in frames.
    pub fn len(&self) -> usize {
        self.length as usize
    }

    /// Returns true if the sample declares no frames.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns true if the sample has a loop.
    pub fn has_loop(&self) -> bool {
        self.loop_type != LoopType::None && self.loop_end > self.loop_start
    }
}

/// Eleven OPL2 registers in SBI order: modulator/carrier characteristic,
/// scaling/level, attack/decay, sustain/release, waveform, then
/// feedback/connection.
pub type AdlibPatch = [u8; 11];

/// Sample payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SampleData {
    /// 8-bit signed PCM
    Mono8(Vec<i8>),
    /// 16-bit signed PCM
    Mono16(Vec<i16>),
    /// FM patch for channels flagged as synth
    Adlib(AdlibPatch),
}

impl Default for SampleData {
    fn default() -> Self {
        SampleData::Mono8(Vec::new())
    }
}

impl SampleData {
    /// Get the number of PCM frames (0 for FM patches).
    pub fn len(&self) -> usize {
        match self {
            SampleData::Mono8(v) => v.len(),
            SampleData::Mono16(v) => v.len(),
            SampleData::Adlib(_) => 0,
        }
    }

    /// Returns true if there is no PCM data.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true for 16-bit PCM.
    pub fn is_16bit(&self) -> bool {
        matches!(self, SampleData::Mono16(_))
    }
}

/// Sample loop type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopType {
    /// No loop
    #[default]
    None,
    /// Forward loop
    Forward,
    /// Ping-pong (bidirectional) loop
    PingPong,
    /// Forward loop entered only after the whole sample played once
    Full,
}

/// Auto-vibrato settings for a sub-instrument.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AutoVibrato {
    /// Vibrato rate
    pub rate: u8,
    /// Vibrato depth
    pub depth: u8,
    /// Vibrato sweep (ramp-up time)
    pub sweep: u8,
    /// Waveform type (0=sine, 1=ramp down, 2=square, 3=random)
    pub waveform: u8,
}

/// Split a C-4 playback rate into (transpose, finetune).
///
/// Finetune is in 1/128 semitone units relative to 8363 Hz.
pub fn c2spd_to_note(c2spd: u32) -> (i8, i8) {
    if c2spd == 0 {
        return (0, 0);
    }
    let c = (1536.0 * libm::log2(c2spd as f64 / C4_NTSC_RATE as f64)) as i32;
    let transpose = (c / 128).clamp(i8::MIN as i32, i8::MAX as i32) as i8;
    (transpose, (c % 128) as i8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_rate_has_no_offset() {
        assert_eq!(c2spd_to_note(8363), (0, 0));
        assert_eq!(c2spd_to_note(0), (0, 0));
    }

    #[test]
    fn octave_up_is_twelve_semitones() {
        assert_eq!(c2spd_to_note(8363 * 2), (12, 0));
        assert_eq!(c2spd_to_note(8363 / 2).0, -12);
    }

    #[test]
    fn fractional_rate_sets_finetune() {
        // 44100 Hz is 28.79 semitones above 8363
        let (xpo, fin) = c2spd_to_note(44100);
        assert_eq!(xpo, 28);
        assert!(fin > 90 && fin < 110, "finetune {}", fin);
    }

    #[test]
    fn adlib_patch_has_no_frames() {
        let sample = Sample {
            data: SampleData::Adlib([0; 11]),
            ..Sample::new("fm")
        };
        assert!(sample.is_empty());
        assert!(!sample.data.is_16bit());
        assert!(!sample.has_loop());
    }

    #[test]
    fn long_names_are_truncated() {
        let name = "a forty character sample name, too long!";
        let sample = Sample::new(name);
        assert_eq!(sample.name.as_str(), &name[..32]);
    }

    #[test]
    fn length_is_declared_not_loaded() {
        let sample = Sample {
            length: 8,
            bits16: true,
            ..Sample::new("skipped")
        };
        assert_eq!(sample.len(), 8);
        assert!(!sample.is_empty());
        assert!(sample.data.is_empty());
    }
}
