//! Canonical effect vocabulary.
//!
//! Every format decoder translates its native effect codes into these
//! variants. Parameters are kept as the raw byte the player interprets,
//! so nibble-packed values (slides, vibrato speed/depth) stay packed.

/// Volume column command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum VolumeCommand {
    #[default]
    None,
    /// Set volume, on the song's volume scale (see `Song::volume_base`)
    Volume(u8),
}

impl VolumeCommand {
    /// Returns the volume value, if any.
    pub fn value(self) -> Option<u8> {
        match self {
            VolumeCommand::None => None,
            VolumeCommand::Volume(v) => Some(v),
        }
    }
}

/// Effect column command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Effect {
    #[default]
    None,

    // === Arpeggio & Portamento ===
    /// Cycle between note, note+x, note+y (param `xy`)
    Arpeggio(u8),
    PortaUp(u8),
    PortaDown(u8),
    /// Slide toward the target note
    TonePorta(u8),
    /// Vibrato, param `xy` = speed/depth
    Vibrato(u8),
    /// Continue tone portamento while sliding volume
    TonePortaVolSlide(u8),
    /// Continue vibrato while sliding volume
    VibratoVolSlide(u8),

    // === Tremolo & Volume ===
    Tremolo(u8),
    /// Set channel panning (0-255)
    SetPan(u8),
    /// Set sample offset (in 256-byte units)
    SampleOffset(u8),
    /// Volume slide, param `xy` = up/down
    VolumeSlide(u8),
    VolumeSlideUp(u8),
    VolumeSlideDown(u8),
    /// Jump to order position
    PositionJump(u8),
    SetVolume(u8),
    /// Break to row (decoded, not BCD) in next pattern
    PatternBreak(u8),

    // === Extended effects (Exy style) ===
    SetFilter(u8),
    FinePortaUp(u8),
    FinePortaDown(u8),
    Glissando(u8),
    SetVibratoWaveform(u8),
    /// Set finetune, raw nibble
    SetFinetune(u8),
    /// Pattern loop (0 = set start, n = loop n times)
    PatternLoop(u8),
    SetTremoloWaveform(u8),
    /// Coarse pan position, raw nibble
    SetPanPosition(u8),
    /// Retrigger note every n ticks
    RetriggerNote(u8),
    FineVolumeSlideUp(u8),
    FineVolumeSlideDown(u8),
    /// Cut note after n ticks
    NoteCut(u8),
    /// Delay note by n ticks
    NoteDelay(u8),
    /// Delay pattern by n rows
    PatternDelay(u8),
    InvertLoop(u8),

    // === Speed & Tempo ===
    /// ProTracker Fxx: values below 0x20 set ticks per row, others set BPM
    SetTempo(u8),
    /// Set ticks per row
    SetSpeed(u8),
    /// Set BPM
    SetBpm(u8),

    // === Dual-column extras ===
    /// Pan slide, param `xy` = left/right
    PanSlide(u8),
    /// Retrigger with volume change, param `xy` = volume change/interval
    MultiRetrigger(u8),
    /// Tremor, param `xy` = on/off ticks
    Tremor(u8),
}

impl Effect {
    /// Raw parameter byte (0 for `None`).
    pub fn param(&self) -> u8 {
        match *self {
            Effect::None => 0,
            Effect::Arpeggio(p)
            | Effect::PortaUp(p)
            | Effect::PortaDown(p)
            | Effect::TonePorta(p)
            | Effect::Vibrato(p)
            | Effect::TonePortaVolSlide(p)
            | Effect::VibratoVolSlide(p)
            | Effect::Tremolo(p)
            | Effect::SetPan(p)
            | Effect::SampleOffset(p)
            | Effect::VolumeSlide(p)
            | Effect::VolumeSlideUp(p)
            | Effect::VolumeSlideDown(p)
            | Effect::PositionJump(p)
            | Effect::SetVolume(p)
            | Effect::PatternBreak(p)
            | Effect::SetFilter(p)
            | Effect::FinePortaUp(p)
            | Effect::FinePortaDown(p)
            | Effect::Glissando(p)
            | Effect::SetVibratoWaveform(p)
            | Effect::SetFinetune(p)
            | Effect::PatternLoop(p)
            | Effect::SetTremoloWaveform(p)
            | Effect::SetPanPosition(p)
            | Effect::RetriggerNote(p)
            | Effect::FineVolumeSlideUp(p)
            | Effect::FineVolumeSlideDown(p)
            | Effect::NoteCut(p)
            | Effect::NoteDelay(p)
            | Effect::PatternDelay(p)
            | Effect::InvertLoop(p)
            | Effect::SetTempo(p)
            | Effect::SetSpeed(p)
            | Effect::SetBpm(p)
            | Effect::PanSlide(p)
            | Effect::MultiRetrigger(p)
            | Effect::Tremor(p) => p,
        }
    }
}
