//! ProTracker MOD format parser.
//!
//! Besides the ProTracker `M.K.` layout this recognizes the 4/6/8-channel
//! tags written by other Amiga, Atari and PC trackers, the `xCHN`/`xxCH`
//! tags of FastTracker and TakeTracker, Mod's Grave 8-channel `M.K.` files
//! and ProTracker song files without sample data. When the tag does not
//! name a tracker, the header is matched against known tracker habits to
//! name it.

use alloc::vec::Vec;
use binrw::BinRead;
use tl_ir::{Event, LoopType, Note, OrderEntry, Song, VolumeCommand};
use tracing::{debug, warn};

use crate::effect_parser::{disable_continue_effect, protracker_effect};
use crate::reader::{parse_string, ByteReader};
use crate::{FormatError, LoadOptions};

/// Offset of the first pattern.
const PATTERN_START: usize = 0x43c;

/// A 4-byte tag at offset 1080 and what it says about the file.
struct MagicInfo {
    magic: &'static [u8; 4],
    /// Tracker is known from the tag alone
    detected: bool,
    /// Loops starting at 0 play the whole sample first
    ptkloop: bool,
    tracker: &'static str,
    channels: usize,
}

const MOD_MAGIC: &[MagicInfo] = &[
    MagicInfo { magic: b"M.K.", detected: false, ptkloop: true, tracker: "Protracker", channels: 4 },
    MagicInfo { magic: b"M!K!", detected: true, ptkloop: true, tracker: "Protracker", channels: 4 },
    MagicInfo { magic: b"M&K!", detected: true, ptkloop: true, tracker: "Noisetracker", channels: 4 },
    MagicInfo { magic: b"N.T.", detected: true, ptkloop: true, tracker: "Noisetracker", channels: 4 },
    MagicInfo { magic: b"6CHN", detected: false, ptkloop: false, tracker: "Fast Tracker", channels: 6 },
    MagicInfo { magic: b"8CHN", detected: false, ptkloop: false, tracker: "Fast Tracker", channels: 8 },
    MagicInfo { magic: b"CD61", detected: true, ptkloop: false, tracker: "Octalyser", channels: 6 },
    MagicInfo { magic: b"CD81", detected: true, ptkloop: false, tracker: "Octalyser", channels: 8 },
    MagicInfo { magic: b"TDZ4", detected: true, ptkloop: false, tracker: "TakeTracker", channels: 4 },
    MagicInfo { magic: b"FA04", detected: true, ptkloop: false, tracker: "Digital Tracker", channels: 4 },
    MagicInfo { magic: b"FA06", detected: true, ptkloop: false, tracker: "Digital Tracker", channels: 6 },
    MagicInfo { magic: b"FA08", detected: true, ptkloop: false, tracker: "Digital Tracker", channels: 8 },
    MagicInfo { magic: b"NSMS", detected: true, ptkloop: false, tracker: "unknown", channels: 4 },
];

fn lookup_magic(magic: &[u8; 4]) -> Option<&'static MagicInfo> {
    MOD_MAGIC.iter().find(|m| m.magic == magic)
}

/// Channel count from a FastTracker `xxCH` or `xCHN` tag.
fn numeric_channels(magic: &[u8; 4]) -> Option<usize> {
    if &magic[2..] == b"CH" && magic[0].is_ascii_digit() && magic[1].is_ascii_digit() {
        return Some(((magic[0] - b'0') * 10 + magic[1] - b'0') as usize);
    }
    if &magic[1..] == b"CHN" && magic[0].is_ascii_digit() {
        return Some((magic[0] - b'0') as usize);
    }
    None
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

#[derive(BinRead, Debug, Clone)]
#[br(big)]
pub(crate) struct ModSampleHeader {
    pub name: [u8; 22],
    /// Length in 16-bit words
    pub size: u16,
    /// Finetune (signed nibble)
    pub finetune: u8,
    pub volume: u8,
    /// Loop start in 16-bit words
    pub loop_start: u16,
    /// Loop size in 16-bit words
    pub loop_size: u16,
}

#[derive(BinRead, Debug, Clone)]
#[br(big)]
pub(crate) struct ModHeader {
    pub name: [u8; 20],
    #[br(count = 31)]
    pub samples: Vec<ModSampleHeader>,
    pub len: u8,
    pub restart: u8,
    pub order: [u8; 128],
    pub magic: [u8; 4],
}

impl ModHeader {
    /// Total sample bytes declared by the header.
    pub fn sample_bytes(&self) -> usize {
        self.samples.iter().map(|s| 2 * s.size as usize).sum()
    }

    /// Number of stored patterns: highest order entry plus one. Entries
    /// after the first value above 0x7f are garbage.
    pub fn pattern_count(&self) -> usize {
        self.order
            .iter()
            .take_while(|&&x| x <= 0x7f)
            .max()
            .map_or(1, |&x| x as usize + 1)
    }

    pub fn order_list(&self) -> Vec<OrderEntry> {
        self.order
            .iter()
            .take(self.len as usize)
            .map(|&p| OrderEntry::Pattern(p))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

pub(crate) fn test_mod(r: &mut ByteReader) -> Result<String, FormatError> {
    r.seek_to(1080)?;
    let magic: [u8; 4] = r.read_magic()?;

    match numeric_channels(&magic) {
        Some(n) if (1..=32).contains(&n) => return Ok(String::new()),
        _ => {}
    }

    if lookup_magic(&magic).is_none() {
        return Err(FormatError::MalformedHeader("no MOD tag"));
    }

    // Reject NoiseRunner and other formats with a valid tag at 1080
    r.seek_to(20)?;
    for _ in 0..31 {
        r.skip(22)?;
        let size = r.read_u16_be()?;
        let finetune = r.read_u8()?;
        let volume = r.read_u8()?;
        let loop_start = r.read_u16_be()?;
        let loop_size = r.read_u16_be()?;
        if size & 0x8000 != 0
            || finetune & 0xf0 != 0
            || volume > 0x40
            || loop_start & 0x8000 != 0
            || loop_size & 0x8000 != 0
        {
            return Err(FormatError::MalformedHeader("bad MOD sample header"));
        }
    }

    // UNIC Tracker modules have the same header with 768-byte patterns
    r.seek_to(0)?;
    let header = ModHeader::read(r)?;
    let unic_size = 1084 + header.pattern_count() * 0x300 + header.sample_bytes();
    if unic_size == r.len() {
        return Err(FormatError::MalformedHeader("UNIC Tracker module"));
    }

    Ok(parse_string(&header.name))
}

fn is_st_ins(name: &[u8; 22]) -> bool {
    name[0].eq_ignore_ascii_case(&b's')
        && name[1].eq_ignore_ascii_case(&b't')
        && name[2] == b'-'
        && name[5] == b':'
        && name[3].is_ascii_digit()
        && name[4].is_ascii_digit()
}

// ---------------------------------------------------------------------------
// Tracker guessing
// ---------------------------------------------------------------------------

/// What the header says about the file's origin.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Variant {
    channels: usize,
    tracker: &'static str,
    ptkloop: bool,
    amiga_range: bool,
    restart: u8,
    /// ProTracker song: patterns only, samples live in separate files
    ptsong: bool,
}

/// Narrow down the tracker for tags that do not identify one.
///
/// `size` is the size of the module data from its first byte.
fn guess_tracker(
    v: &mut Variant,
    h: &ModHeader,
    r: &mut ByteReader,
    size: usize,
) -> Result<(), FormatError> {
    let pat = h.pattern_count();
    let smp_size = h.sample_bytes();
    let samples = &h.samples;

    // Flextrax stores an extension chunk after the samples
    let flex_pos = PATTERN_START + pat * 4 * v.channels * 0x40 + smp_size;
    if flex_pos < size {
        let pos = r.position();
        let is_flex = r.seek_to(flex_pos).is_ok()
            && r.peek_bytes(4).map_or(false, |id| id == b"FLEX");
        r.seek_to(pos)?;
        if is_flex {
            v.tracker = "Flextrax";
            v.ptkloop = false;
            return Ok(());
        }
    }

    // Mod's Grave: 8CHN data under an M.K. tag, only visible in the size
    if &h.magic == b"M.K." && PATTERN_START + pat * 32 * 0x40 + smp_size == size {
        v.channels = 8;
        v.tracker = "Mod's Grave";
        v.ptkloop = false;
        return Ok(());
    }

    if &h.magic == b"M.K." && PATTERN_START + pat * 0x400 == size {
        v.tracker = "Protracker";
        v.ptsong = true;
        return Ok(());
    }

    let restart = h.restart;
    if v.channels == 4 && restart as usize == pat {
        v.tracker = "Soundtracker";
    } else if v.channels == 4 && restart == 0x78 {
        v.tracker = "Noisetracker";
        v.ptkloop = true;
    } else if restart < 0x7f {
        if v.channels == 4 {
            v.tracker = "Noisetracker";
            v.ptkloop = true;
        } else {
            v.tracker = "unknown tracker";
            v.ptkloop = false;
        }
        v.restart = restart;
    }

    if v.channels != 4 && restart == 0x7f {
        v.tracker = "Scream Tracker 3";
        v.ptkloop = false;
        v.amiga_range = false;
    }

    let has_empty_loop = samples.iter().any(|s| s.loop_size == 0);

    if v.channels == 4 && restart == 0x7f && has_empty_loop {
        v.tracker = "Protracker clone";
        v.ptkloop = false;
    }

    if restart == 0x78 || restart >= 0x7f {
        return Ok(());
    }

    if !has_empty_loop {
        // All loops are size 2 or greater
        if samples.iter().any(|s| s.size == 1 && s.volume == 0) {
            v.tracker = "Probably converted";
            v.ptkloop = false;
            return Ok(());
        }
        if samples.iter().any(|s| is_st_ins(&s.name)) {
            return Ok(());
        }
        if samples.iter().any(|s| s.size == 0 && s.loop_size == 1) {
            match v.channels {
                4 => v.tracker = "Noisetracker",
                6 | 8 => {
                    v.tracker = "Octalyser";
                    v.ptkloop = false;
                }
                _ => {
                    v.tracker = "unknown tracker";
                    v.ptkloop = false;
                }
            }
            return Ok(());
        }
        v.ptkloop = false;
        match v.channels {
            4 => v.tracker = "Maybe Protracker",
            6 | 8 => {
                v.tracker = "FastTracker 1.01?";
                v.amiga_range = false;
            }
            _ => v.tracker = "unknown tracker",
        }
    } else {
        let upper_empty = samples[15..]
            .iter()
            .all(|s| s.name[0] == 0 && s.size == 0);
        if upper_empty && is_st_ins(&samples[14].name) {
            v.tracker = "converted 15 instrument";
            v.ptkloop = false;
            return Ok(());
        }

        // Assume FastTracker modules won't have ST- instruments
        if samples.iter().any(|s| is_st_ins(&s.name)) {
            v.tracker = "unknown/converted";
            v.ptkloop = false;
            return Ok(());
        }

        v.ptkloop = false;
        if matches!(v.channels, 4 | 6 | 8) {
            v.tracker = "Fast Tracker";
            v.amiga_range = false;
        } else {
            v.tracker = "unknown tracker";
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Convert an Amiga period to a note; period 428 is `On(60)`.
pub(crate) fn period_to_note(period: u16) -> Note {
    if period == 0 {
        return Note::None;
    }
    let n = libm::round(12.0 * libm::log2(13696.0 / period as f64));
    Note::from_semitone(n as i32)
}

/// Decode a 4-byte ProTracker pattern cell.
///
/// ```text
/// byte 0: instrument high nibble | period bits 8-11
/// byte 1: period bits 0-7
/// byte 2: instrument low nibble | effect command
/// byte 3: effect parameter
/// ```
pub(crate) fn convert_pt_event(data: &[u8; 4]) -> Event {
    let period = (((data[0] & 0x0F) as u16) << 8) | data[1] as u16;
    let (cmd, param) = disable_continue_effect(data[2] & 0x0F, data[3]);

    Event {
        note: period_to_note(period),
        instrument: (data[0] & 0xF0) | (data[2] >> 4),
        volume: VolumeCommand::None,
        effect: protracker_effect(cmd, param),
        effect2: tl_ir::Effect::None,
    }
}

/// Read `patterns` 64-row patterns of `song.num_channels()` channels.
pub(crate) fn read_pt_patterns(
    song: &mut Song,
    r: &mut ByteReader,
    patterns: usize,
) -> Result<(), FormatError> {
    let chn = song.num_channels();
    song.alloc_patterns(patterns)?;
    for pat in 0..patterns {
        song.alloc_pattern_tracks(pat, 64)?;
        for j in 0..64 * chn {
            let cell: [u8; 4] = r.read_magic()?;
            let event = song
                .event_mut(pat, j % chn, (j / chn) as u16)
                .ok_or(FormatError::MalformedHeader("event outside pattern"))?;
            *event = convert_pt_event(&cell);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

pub(crate) fn load_mod(
    song: &mut Song,
    r: &mut ByteReader,
    opts: &LoadOptions,
) -> Result<(), FormatError> {
    let header = ModHeader::read(r)?;
    let lps_mult = if opts.fix_loop { 1 } else { 2 };

    let mut variant = match lookup_magic(&header.magic) {
        Some(info) => Variant {
            channels: info.channels,
            tracker: info.tracker,
            ptkloop: info.ptkloop,
            amiga_range: true,
            restart: 0,
            ptsong: false,
        },
        None => match numeric_channels(&header.magic) {
            Some(n) if (1..=32).contains(&n) => Variant {
                channels: n,
                tracker: "TakeTracker/FastTracker II",
                ptkloop: false,
                amiga_range: false,
                restart: 0,
                ptsong: false,
            },
            Some(_) => return Err(FormatError::UnsupportedVariant("MOD channel count")),
            None => return Err(FormatError::MalformedHeader("no MOD tag")),
        },
    };
    let detected = lookup_magic(&header.magic).map_or(true, |info| info.detected);
    if !detected {
        let size = r.len();
        guess_tracker(&mut variant, &header, r, size)?;
    }

    let magic = String::from_utf8_lossy(&header.magic);
    song.set_title(&parse_string(&header.name));
    song.format = format!("{} ({})", magic, variant.tracker);
    song.set_channels(variant.channels);
    song.order = header.order_list();
    song.restart = variant.restart;
    song.quirks.amiga_range = variant.amiga_range;

    let pat = header.pattern_count();
    if let Some(position) = header.order.iter().position(|&x| x > 0x7f) {
        warn!(position, "MOD order ends in garbage");
    }
    debug!(
        format = %song.format,
        title = %song.title,
        channels = variant.channels,
        patterns = pat,
        length = header.len,
        "MOD module"
    );

    song.alloc_instruments(31)?;
    song.alloc_samples(31)?;
    for (i, sh) in header.samples.iter().enumerate() {
        let name = parse_string(&sh.name);
        let len = 2 * sh.size as u32;
        let loop_start = lps_mult * sh.loop_start as u32;
        let loop_end = (loop_start + 2 * sh.loop_size as u32).min(len);
        let looped = sh.loop_size > 1 && loop_end > 8;
        let full = looped && variant.ptkloop && loop_start == 0 && len > loop_end;

        let sample = &mut song.samples[i];
        *sample = tl_ir::Sample::new(&name);
        sample.loop_start = loop_start;
        sample.loop_end = loop_end;
        sample.loop_type = match (looped, full) {
            (true, true) => LoopType::Full,
            (true, false) => LoopType::Forward,
            _ => LoopType::None,
        };
        sample.length = len;

        let inst = &mut song.instruments[i];
        inst.set_name(&name);
        if len > 0 {
            let sub = inst.set_single_sample(i as u16);
            sub.volume = sh.volume;
            sub.finetune = (sh.finetune << 4) as i8;
        }
        debug!(
            "[{:2X}] {:<22} {:04x} {:04x} {:04x} {} V{:02x} {:+}",
            i,
            name,
            len,
            loop_start,
            loop_end,
            if looped { 'L' } else { ' ' },
            sh.volume,
            ((sh.finetune << 4) as i8) >> 4
        );
    }

    read_pt_patterns(song, r, pat)?;

    if variant.ptsong {
        debug!("song file without sample data");
    } else if !opts.skip_samples {
        for sample in song.samples.iter_mut().filter(|s| !s.is_empty()) {
            sample.data = tl_ir::SampleData::Mono8(r.read_pcm8(sample.len())?);
        }
    }

    if variant.channels > 4 {
        song.quirks.amiga_range = false;
        song.quirks.ft2 = true;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tl_ir::Effect;

    /// Minimal module header: 31 empty samples, one order, given tag.
    fn header_bytes(magic: &[u8; 4], restart: u8) -> Vec<u8> {
        let mut buf = vec![0u8; 1084];
        buf[..4].copy_from_slice(b"test");
        buf[950] = 1;
        buf[951] = restart;
        buf[1080..1084].copy_from_slice(magic);
        buf
    }

    fn parse_header(buf: &[u8]) -> ModHeader {
        ModHeader::read(&mut ByteReader::new(buf, 0)).unwrap()
    }

    fn base_variant(channels: usize) -> Variant {
        Variant {
            channels,
            tracker: "Protracker",
            ptkloop: true,
            amiga_range: true,
            restart: 0,
            ptsong: false,
        }
    }

    #[test]
    fn test_period_to_note() {
        assert_eq!(period_to_note(428), Note::On(60));
        assert_eq!(period_to_note(856), Note::On(48));
        assert_eq!(period_to_note(453), Note::On(59));
        assert_eq!(period_to_note(0), Note::None);
        // Periods too short for any note
        assert_eq!(period_to_note(1), Note::None);
        assert_eq!(period_to_note(20), Note::None);
    }

    #[test]
    fn pt_cell_decoding() {
        // Instrument 0x1F, period 428, effect C20
        let ev = convert_pt_event(&[0x11, 0xAC, 0xFC, 0x20]);
        assert_eq!(ev.note, Note::On(60));
        assert_eq!(ev.instrument, 0x1F);
        assert_eq!(ev.effect, Effect::SetVolume(0x20));

        // 5xx with no parameter keeps only the tone portamento
        let ev = convert_pt_event(&[0x00, 0x00, 0x05, 0x00]);
        assert_eq!(ev.effect, Effect::TonePorta(0));
        let ev = convert_pt_event(&[0x00, 0x00, 0x0A, 0x00]);
        assert_eq!(ev.effect, Effect::None);
    }

    #[test]
    fn numeric_tags() {
        assert_eq!(numeric_channels(b"12CH"), Some(12));
        assert_eq!(numeric_channels(b"6CHN"), Some(6));
        assert_eq!(numeric_channels(b"M.K."), None);
        assert_eq!(numeric_channels(b"x2CH"), None);
    }

    #[test]
    fn pattern_count_stops_at_garbage() {
        let mut buf = header_bytes(b"M.K.", 0);
        buf[952] = 3;
        buf[953] = 0x80;
        buf[954] = 9;
        assert_eq!(parse_header(&buf).pattern_count(), 4);
    }

    #[test]
    fn st_instrument_names() {
        let mut name = [0u8; 22];
        name[..6].copy_from_slice(b"ST-01:");
        assert!(is_st_ins(&name));
        name[3] = b'x';
        assert!(!is_st_ins(&name));
    }

    #[test]
    fn mods_grave_detected_by_size() {
        let buf = header_bytes(b"M.K.", 0);
        let h = parse_header(&buf);
        let mut v = base_variant(4);
        let size = PATTERN_START + 32 * 0x40;
        guess_tracker(&mut v, &h, &mut ByteReader::new(&buf, 0), size).unwrap();
        assert_eq!(v.channels, 8);
        assert_eq!(v.tracker, "Mod's Grave");
    }

    #[test]
    fn protracker_song_detected_by_size() {
        let buf = header_bytes(b"M.K.", 0);
        let h = parse_header(&buf);
        let mut v = base_variant(4);
        guess_tracker(&mut v, &h, &mut ByteReader::new(&buf, 0), PATTERN_START + 0x400).unwrap();
        assert!(v.ptsong);
        assert_eq!(v.tracker, "Protracker");
    }

    #[test]
    fn restart_byte_heuristics() {
        let buf = header_bytes(b"M.K.", 0x78);
        let h = parse_header(&buf);
        let mut v = base_variant(4);
        guess_tracker(&mut v, &h, &mut ByteReader::new(&buf, 0), 99_999).unwrap();
        assert_eq!(v.tracker, "Noisetracker");
        assert!(v.ptkloop);

        // Restart 1 == pattern count, and all loops empty
        let buf = header_bytes(b"M.K.", 1);
        let h = parse_header(&buf);
        let mut v = base_variant(4);
        guess_tracker(&mut v, &h, &mut ByteReader::new(&buf, 0), 99_999).unwrap();
        assert_eq!(v.tracker, "Fast Tracker");
        assert!(!v.amiga_range);
        assert_eq!(v.restart, 0);

        let buf = header_bytes(b"6CHN", 0x7f);
        let h = parse_header(&buf);
        let mut v = base_variant(6);
        guess_tracker(&mut v, &h, &mut ByteReader::new(&buf, 0), 99_999).unwrap();
        assert_eq!(v.tracker, "Scream Tracker 3");
    }

    #[test]
    fn flextrax_chunk_after_samples() {
        let mut buf = header_bytes(b"M.K.", 0);
        buf.resize(PATTERN_START + 0x400, 0);
        buf.extend_from_slice(b"FLEX");
        buf.extend_from_slice(&[0; 16]);
        let h = parse_header(&buf);
        let mut v = base_variant(4);
        let size = buf.len();
        guess_tracker(&mut v, &h, &mut ByteReader::new(&buf, 0), size).unwrap();
        assert_eq!(v.tracker, "Flextrax");
        assert!(!v.ptkloop);
    }

    #[test]
    fn flextrax_detection_restores_position() {
        let mut buf = header_bytes(b"M.K.", 0);
        buf.resize(PATTERN_START + 0x400, 0);
        buf.extend_from_slice(b"FLEX");
        let h = parse_header(&buf);
        let size = buf.len();

        let mut r = ByteReader::new(&buf, 0);
        r.seek_to(PATTERN_START).unwrap();
        guess_tracker(&mut base_variant(4), &h, &mut r, size).unwrap();
        assert_eq!(r.position(), PATTERN_START);

        // Also when the signature check lands past the end of the data
        let mut r = ByteReader::new(&buf[..PATTERN_START], 0);
        r.seek_to(PATTERN_START).unwrap();
        guess_tracker(&mut base_variant(4), &h, &mut r, size).unwrap();
        assert_eq!(r.position(), PATTERN_START);
    }
}
