//! Amusic Adlib Tracker (AMD) format parser.
//!
//! Nine FM channels, 26 AdLib instruments and 64-row tracks shared between
//! patterns. Track rows are either a 3-byte event or a single byte with the
//! high bit set that skips `n` rows.

use alloc::vec::Vec;
use binrw::BinRead;
use tl_ir::{ChannelSettings, Event, Note, OrderEntry, Sample, SampleData, Song};
use tracing::{debug, warn};

use crate::effect_parser::amd_effect;
use crate::reader::{parse_string, ByteReader};
use crate::{FormatError, LoadOptions};

const CHANNELS: usize = 9;
const INSTRUMENTS: usize = 26;
const ROWS: u16 = 64;

/// AMD register order to SBI register order.
const REG_XLAT: [usize; 11] = [0, 5, 1, 6, 2, 7, 3, 8, 4, 9, 10];

#[derive(BinRead, Debug)]
#[br(big)]
struct AmdInstrument {
    name: [u8; 23],
    regs: [u8; 11],
}

#[derive(BinRead, Debug)]
#[br(big)]
struct AmdHeader {
    name: [u8; 24],
    author: [u8; 24],
    #[br(count = INSTRUMENTS)]
    instruments: Vec<AmdInstrument>,
    len: u8,
    /// Index of the last pattern
    last_pattern: u8,
    order: [u8; 128],
    #[br(assert(&magic[..2] == b"<o" && &magic[6..] == b"RoR"))]
    magic: [u8; 9],
    /// 0x10 normal, 0x11 packed; 0 is the unpacked layout
    version: u8,
}

pub(crate) fn test_amd(r: &mut ByteReader) -> Result<String, FormatError> {
    r.seek_to(1062)?;
    let magic: [u8; 9] = r.read_magic()?;
    if &magic[..2] != b"<o" || &magic[6..] != b"RoR" {
        return Err(FormatError::MalformedHeader("no AMD tag"));
    }
    r.seek_to(0)?;
    Ok(parse_string(r.read_bytes(24)?))
}

fn to_sbi(regs: &[u8; 11]) -> [u8; 11] {
    REG_XLAT.map(|i| regs[i])
}

/// Decode one 3-byte track event.
fn read_event(r: &mut ByteReader, param: u8, tempo_mode: &mut u8) -> Result<Event, FormatError> {
    let b = r.read_u8()?;
    let (effect, mode) = amd_effect(b & 0x0F, param, *tempo_mode);
    *tempo_mode = mode;

    let n = r.read_u8()?;
    let note = match n >> 4 {
        0 => Note::None,
        semitone => Note::from_semitone(semitone as i32 + (1 + ((n as i32 & 0x0e) >> 1)) * 12 - 1),
    };

    Ok(Event {
        note,
        instrument: (b >> 4) | ((n & 1) << 4),
        effect,
        ..Event::empty()
    })
}

pub(crate) fn load_amd(
    song: &mut Song,
    r: &mut ByteReader,
    _opts: &LoadOptions,
) -> Result<(), FormatError> {
    let header = AmdHeader::read(r)?;

    song.set_title(&parse_string(&header.name));
    song.set_author(&parse_string(&header.author));
    song.format = "Amusic".into();
    song.initial_tempo = 125;
    song.initial_speed = 6;
    song.channels = (0..CHANNELS)
        .map(|_| ChannelSettings {
            synth: true,
            ..ChannelSettings::default()
        })
        .collect();
    song.order = header
        .order
        .iter()
        .take(header.len as usize)
        .map(|&p| OrderEntry::Pattern(p))
        .collect();

    let patterns = header.last_pattern as usize + 1;
    debug!(
        title = %song.title,
        author = %song.author,
        length = header.len,
        patterns,
        "Amusic module"
    );

    song.alloc_instruments(INSTRUMENTS)?;
    song.alloc_samples(INSTRUMENTS)?;
    for (i, ins) in header.instruments.iter().enumerate() {
        let name = parse_string(&ins.name);
        let inst = &mut song.instruments[i];
        inst.set_name(&name);
        inst.set_single_sample(i as u16).transpose = -1;

        song.samples[i] = Sample {
            data: SampleData::Adlib(to_sbi(&ins.regs)),
            ..Sample::new(&name)
        };
        debug!("[{:2X}] {:<23}", i, name);
    }

    if header.version == 0 {
        return Err(FormatError::UnsupportedVariant("unpacked AMD module"));
    }

    // Pattern track lists refer to tracks stored afterwards
    song.alloc_patterns(patterns)?;
    let mut track_count = 0;
    for pat in song.patterns.iter_mut() {
        pat.rows = ROWS;
        for ch in 0..CHANNELS {
            let track = r.read_u16_le()? as usize;
            pat.tracks[ch] = track;
            track_count = track_count.max(track + 1);
        }
    }
    song.resize_tracks(track_count, ROWS)?;

    let stored = r.read_u16_le()?;
    debug!(stored, referenced = track_count, "tracks");

    let mut tempo_mode = 1;
    for _ in 0..stored {
        let index = r.read_u16_le()? as usize;
        if index >= song.tracks.len() {
            warn!(index, "unreferenced AMD track");
            song.resize_tracks(index + 1, ROWS)?;
        }

        let mut row: i32 = 0;
        while row < ROWS as i32 {
            let param = r.read_u8()?;
            if param & 0x80 != 0 {
                row += (param & 0x7f) as i32;
                continue;
            }
            let event = read_event(r, param, &mut tempo_mode)?;
            if let Some(slot) = song.tracks[index].event_mut(row as u16) {
                *slot = event;
            }
            row += 1;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tl_ir::Effect;

    #[test]
    fn sbi_register_order() {
        let regs = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        assert_eq!(to_sbi(&regs), [0, 5, 1, 6, 2, 7, 3, 8, 4, 9, 10]);
    }

    #[test]
    fn event_bytes() {
        // Param 0x05, instrument low nibble 3 + tempo, note 2 octave 1 + ins bit 4
        let data = [0x37, 0x23];
        let mut r = ByteReader::new(&data, 0);
        let mut mode = 1;
        let ev = read_event(&mut r, 0x05, &mut mode).unwrap();
        assert_eq!(ev.instrument, 0x13);
        assert_eq!(ev.note, Note::On(2 + 24 - 1));
        assert_eq!(ev.effect, Effect::SetTempo(5));
    }

    #[test]
    fn zero_tempo_switches_mode() {
        let data = [0x07, 0x00, 0x07, 0x00];
        let mut r = ByteReader::new(&data, 0);
        let mut mode = 1;
        let ev = read_event(&mut r, 0x00, &mut mode).unwrap();
        assert_eq!(ev.effect, Effect::None);
        assert_eq!(mode, 3);
        let ev = read_event(&mut r, 0x04, &mut mode).unwrap();
        assert_eq!(ev.effect, Effect::SetTempo(12));
    }

    #[test]
    fn rejects_missing_tag() {
        let data = vec![0u8; 1100];
        assert!(test_amd(&mut ByteReader::new(&data, 0)).is_err());
    }
}
