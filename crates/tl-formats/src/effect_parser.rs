//! Native effect codes to the canonical [`Effect`] vocabulary.
//!
//! ProTracker's command set is the common base; each dialect has a
//! translator that remaps its own codes and parameter encodings. Codes a
//! dialect reserves or leaves unused translate to `Effect::None`.

use tl_ir::Effect;

/// Parse a ProTracker effect command.
pub fn protracker_effect(cmd: u8, param: u8) -> Effect {
    match cmd {
        0x0 if param != 0 => Effect::Arpeggio(param),
        0x0 => Effect::None,
        0x1 => Effect::PortaUp(param),
        0x2 => Effect::PortaDown(param),
        0x3 => Effect::TonePorta(param),
        0x4 => Effect::Vibrato(param),
        0x5 => Effect::TonePortaVolSlide(param),
        0x6 => Effect::VibratoVolSlide(param),
        0x7 => Effect::Tremolo(param),
        0x8 => Effect::SetPan(param),
        0x9 => Effect::SampleOffset(param),
        0xA => Effect::VolumeSlide(param),
        0xB => Effect::PositionJump(param),
        0xC => Effect::SetVolume(param),
        0xD => Effect::PatternBreak(bcd(param)),
        0xE => extended_effect(param),
        0xF => Effect::SetTempo(param),
        _ => Effect::None,
    }
}

/// Parse extended effect (Exy).
pub fn extended_effect(param: u8) -> Effect {
    let val = param & 0x0F;

    match param >> 4 {
        0x0 => Effect::SetFilter(val),
        0x1 => Effect::FinePortaUp(val),
        0x2 => Effect::FinePortaDown(val),
        0x3 => Effect::Glissando(val),
        0x4 => Effect::SetVibratoWaveform(val),
        0x5 => Effect::SetFinetune(val),
        0x6 => Effect::PatternLoop(val),
        0x7 => Effect::SetTremoloWaveform(val),
        0x8 => Effect::SetPanPosition(val),
        0x9 => Effect::RetriggerNote(val),
        0xA => Effect::FineVolumeSlideUp(val),
        0xB => Effect::FineVolumeSlideDown(val),
        0xC => Effect::NoteCut(val),
        0xD => Effect::NoteDelay(val),
        0xE => Effect::PatternDelay(val),
        _ => Effect::InvertLoop(val),
    }
}

/// Remove effect memory ProTracker never had: 1xx, 2xx and Axx with a
/// zero parameter do nothing, 5xx and 6xx keep only their porta/vibrato.
pub fn disable_continue_effect(cmd: u8, param: u8) -> (u8, u8) {
    if param != 0 {
        return (cmd, param);
    }
    match cmd {
        0x5 => (0x3, 0),
        0x6 => (0x4, 0),
        0x1 | 0x2 | 0xA => (0x0, 0),
        _ => (cmd, param),
    }
}

/// Decode a two-digit BCD byte.
pub fn bcd(x: u8) -> u8 {
    (x >> 4) * 10 + (x & 0x0F)
}

/// Amusic: the tempo command depends on a mode switched by `7 00`.
///
/// Returns the effect and the tempo mode for the following events.
pub fn amd_effect(cmd: u8, param: u8, tempo_mode: u8) -> (Effect, u8) {
    let effect = match cmd {
        0x0 => protracker_effect(0x0, param),
        0x4 => Effect::SetVolume(param),
        0x5 => Effect::PositionJump(param),
        0x6 => Effect::PatternBreak(bcd(param)),
        0x7 => {
            if param == 0 {
                return (Effect::None, 3);
            }
            if param > 31 {
                Effect::None
            } else {
                Effect::SetTempo(param.wrapping_mul(tempo_mode))
            }
        }
        _ => Effect::None,
    };
    (effect, tempo_mode)
}

/// Quadra Composer: doubled vibrato depth and sample offset, decimal
/// position jumps.
pub fn emod_effect(cmd: u8, param: u8) -> Effect {
    match cmd {
        0x4 => Effect::Vibrato((param & 0xF0) | ((param << 1) & 0x0F)),
        0x9 => Effect::SampleOffset(param.wrapping_shl(1)),
        0xB => Effect::PositionJump((param / 10).wrapping_mul(16).wrapping_add(param % 10)),
        _ => protracker_effect(cmd, param),
    }
}

/// Galaxy Music System: ProTracker codes plus an S3M speed command.
pub fn gal4_effect(cmd: u8, param: u8) -> Effect {
    match cmd {
        0x00..=0x0F => protracker_effect(cmd, param),
        0x14 => Effect::SetSpeed(param),
        _ => Effect::None,
    }
}

/// Digitrakker first effect column (note effects 1-6).
pub fn mdl_effect1(cmd: u8, param: u8) -> Effect {
    match cmd {
        0x1..=0x4 => protracker_effect(cmd, param),
        0x5 => Effect::Arpeggio(param),
        0x6 => Effect::None,
        _ => mdl_common_effect(cmd, param),
    }
}

/// Digitrakker second effect column (volume effects G-L).
pub fn mdl_effect2(cmd: u8, param: u8) -> Effect {
    match cmd {
        0x1 => Effect::VolumeSlideUp(param),
        0x2 => Effect::VolumeSlideDown(param),
        0x3 => Effect::MultiRetrigger(param),
        0x4 => Effect::Tremolo(param),
        0x5 => Effect::Tremor(param),
        0x6 => Effect::None,
        _ => mdl_common_effect(cmd, param),
    }
}

fn mdl_common_effect(cmd: u8, param: u8) -> Effect {
    match cmd {
        0x7 => Effect::SetBpm(param),
        0xB..=0xD => protracker_effect(cmd, param),
        0xE => match param >> 4 {
            // E0, E3 unused; E8 sets sample status
            0x0 | 0x3 | 0x8 => Effect::None,
            0x1 => Effect::PanSlide(param << 4),
            0x2 => Effect::PanSlide(param & 0x0F),
            _ => extended_effect(param),
        },
        0xF => Effect::SetSpeed(param),
        // 0 empty, 8 pan, 9 envelope select, A unused
        _ => Effect::None,
    }
}

/// MED: BCD volumes and a tempo command overloaded with note control.
pub fn med4_effect(cmd: u8, param: u8) -> Effect {
    match cmd {
        0x0..=0x2 => protracker_effect(cmd, param),
        0x3 => Effect::Vibrato(param),
        0xC => Effect::SetVolume(bcd(param)),
        0xD => Effect::VolumeSlide(param),
        0xF => match param {
            0x00 => Effect::PatternBreak(0),
            0xFF => Effect::NoteCut(0),
            0xFE => Effect::None,
            0xF1 => Effect::RetriggerNote(3),
            0xF2 => Effect::NoteCut(3),
            0xF3 => Effect::NoteDelay(3),
            0x01..=0x0A => Effect::SetTempo(param),
            _ => Effect::SetBpm((125 * param as u32 / 33).min(255) as u8),
        },
        _ => Effect::None,
    }
}

/// Reality Adlib Tracker: a ProTracker subset; speeds below 3 mean 6.
pub fn rad_effect(cmd: u8, param: u8) -> Effect {
    match cmd {
        0x1 | 0x2 | 0x3 | 0x5 | 0xA | 0xC | 0xD => protracker_effect(cmd, param),
        0xF => Effect::SetTempo(if param <= 2 { 6 } else { param }),
        _ => Effect::None,
    }
}
