//! Instrument and envelope types.

use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::sample::AutoVibrato;
use crate::song::push_truncated;

/// Number of playable notes covered by an instrument's note map.
pub const NOTE_RANGE: usize = 120;

/// Maximum number of points an envelope may hold.
pub const MAX_ENVELOPE_POINTS: usize = 32;

/// An instrument definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instrument {
    /// Instrument name
    pub name: ArrayString<32>,
    /// Sample-bound playback settings
    pub subs: Vec<SubInstrument>,
    /// Note (0-119) -> index into `subs`
    pub note_map: [Option<u8>; NOTE_RANGE],
    /// Volume envelope
    pub volume_envelope: Option<Envelope>,
    /// Panning envelope
    pub panning_envelope: Option<Envelope>,
    /// Pitch envelope
    pub pitch_envelope: Option<Envelope>,
    /// Fadeout speed after key off (0 = no fade)
    pub fadeout: u16,
    /// Synth sequencing tables (MED synthetic and hybrid instruments)
    pub synth: Option<SynthTables>,
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            name: ArrayString::new(),
            subs: Vec::new(),
            note_map: [Some(0); NOTE_RANGE],
            volume_envelope: None,
            panning_envelope: None,
            pitch_envelope: None,
            fadeout: 0,
            synth: None,
        }
    }
}

impl Instrument {
    /// Create a new instrument with default settings.
    pub fn new(name: &str) -> Self {
        let mut inst = Self::default();
        inst.set_name(name);
        inst
    }

    /// Replace the name, truncating to capacity.
    pub fn set_name(&mut self, name: &str) {
        self.name.clear();
        push_truncated(&mut self.name, name);
    }

    /// Replace all subs with one playing `sample`, mapped to every note.
    pub fn set_single_sample(&mut self, sample: u16) -> &mut SubInstrument {
        self.subs.clear();
        self.subs.push(SubInstrument::new(sample));
        self.note_map.fill(Some(0));
        &mut self.subs[0]
    }

    /// Sub-instrument that plays `note`, if mapped.
    pub fn sub_for_note(&self, note: u8) -> Option<&SubInstrument> {
        let idx = (*self.note_map.get(note as usize)?)?;
        self.subs.get(idx as usize)
    }
}

/// Per-sample playback settings inside an instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubInstrument {
    /// Index into `Song::samples`
    pub sample: u16,
    /// Default volume, on the song's volume scale
    pub volume: u8,
    /// Default pan (0-255, 0x80 = center)
    pub pan: u8,
    /// Finetune in 1/128 semitone
    pub finetune: i8,
    /// Transpose in semitones
    pub transpose: i8,
    pub vibrato: AutoVibrato,
}

impl SubInstrument {
    pub fn new(sample: u16) -> Self {
        Self {
            sample,
            volume: 0x40,
            pan: 0x80,
            finetune: 0,
            transpose: 0,
            vibrato: AutoVibrato::default(),
        }
    }
}

/// Volume and waveform sequencing for synthetic instruments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SynthTables {
    pub volume_speed: u8,
    pub wave_speed: u8,
    pub volume_table: Vec<u8>,
    pub wave_table: Vec<u8>,
}

/// An envelope (volume, panning, or pitch).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Envelope points, ordered by tick
    pub points: Vec<EnvelopePoint>,
    /// Sustain point index (None = no sustain)
    pub sustain: Option<u8>,
    /// Loop start and end point indices (None = no loop)
    pub loop_range: Option<(u8, u8)>,
    /// Is the envelope enabled?
    pub enabled: bool,
}

impl Envelope {
    /// Create a new empty envelope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a point to the envelope.
    pub fn add_point(&mut self, tick: u16, value: i16) {
        self.points.push(EnvelopePoint { tick, value });
    }

    /// Enforce the point limit and pull sustain/loop indices into range.
    ///
    /// Decoders call this after filling an envelope from file data. An
    /// envelope left without points is disabled.
    pub fn sanitize(&mut self) {
        self.points.truncate(MAX_ENVELOPE_POINTS);
        if self.points.is_empty() {
            self.enabled = false;
            self.sustain = None;
            self.loop_range = None;
            return;
        }
        let last = (self.points.len() - 1) as u8;
        if let Some(sus) = self.sustain.as_mut() {
            *sus = (*sus).min(last);
        }
        if let Some((start, end)) = self.loop_range.as_mut() {
            *end = (*end).min(last);
            *start = (*start).min(*end);
        }
    }

    /// Get the interpolated value at a given tick.
    pub fn value_at(&self, tick: u16) -> i16 {
        let Some(first) = self.points.first() else {
            return 0;
        };

        let mut prev = first;
        for point in &self.points {
            if point.tick > tick {
                if point.tick == prev.tick || tick < prev.tick {
                    return point.value;
                }
                let t = (tick - prev.tick) as i32;
                let d = (point.tick - prev.tick) as i32;
                let v = prev.value as i32 + (point.value as i32 - prev.value as i32) * t / d;
                return v as i16;
            }
            prev = point;
        }

        // Past the last point
        prev.value
    }
}

/// A point in an envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnvelopePoint {
    /// Tick position (0-65535)
    pub tick: u16,
    /// Value (0-64 for volume, signed for pan/pitch)
    pub value: i16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_interpolation() {
        let mut env = Envelope::new();
        env.add_point(0, 64);
        env.add_point(100, 0);

        assert_eq!(env.value_at(0), 64);
        assert_eq!(env.value_at(50), 32);
        assert_eq!(env.value_at(100), 0);
        assert_eq!(env.value_at(200), 0); // Past end
    }

    #[test]
    fn sanitize_clamps_indices() {
        let mut env = Envelope {
            enabled: true,
            sustain: Some(9),
            loop_range: Some((7, 12)),
            ..Envelope::new()
        };
        for i in 0..4 {
            env.add_point(i * 10, 32);
        }
        env.sanitize();
        assert_eq!(env.sustain, Some(3));
        assert_eq!(env.loop_range, Some((3, 3)));
        assert!(env.enabled);
    }

    #[test]
    fn sanitize_disables_empty_envelope() {
        let mut env = Envelope {
            enabled: true,
            sustain: Some(0),
            ..Envelope::new()
        };
        env.sanitize();
        assert!(!env.enabled);
        assert_eq!(env.sustain, None);
    }

    #[test]
    fn note_map_selects_sub() {
        let mut inst = Instrument::new("piano");
        inst.set_single_sample(3).volume = 20;
        inst.subs.push(SubInstrument::new(4));
        inst.note_map[60] = Some(1);
        inst.note_map[61] = None;

        assert_eq!(inst.sub_for_note(0).map(|s| s.sample), Some(3));
        assert_eq!(inst.sub_for_note(60).map(|s| s.sample), Some(4));
        assert!(inst.sub_for_note(61).is_none());
        assert!(inst.sub_for_note(200).is_none());
    }
}
