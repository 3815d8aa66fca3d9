//! Reality Adlib Tracker (RAD) format parser.
//!
//! Nine FM channels. Instruments are 11-byte OPL register sets keyed by
//! instrument number; patterns are stored sparsely as row and channel
//! lists behind a table of 32 file offsets.

use tl_ir::{ChannelSettings, Effect, Event, Note, OrderEntry, Sample, SampleData, Song};
use tracing::{debug, warn};

use crate::effect_parser::rad_effect;
use crate::reader::ByteReader;
use crate::{FormatError, LoadOptions};

const MAGIC: &[u8; 16] = b"RAD by REALiTY!!";
const CHANNELS: usize = 9;
const ROWS: u16 = 64;
const MAX_PATTERNS: usize = 32;
const LAST: u8 = 0x80;

/// RAD register order (carrier first, feedback before waveforms) to SBI
/// register order.
const REG_XLAT: [usize; 11] = [1, 0, 3, 2, 5, 4, 7, 6, 10, 9, 8];

pub(crate) fn test_rad(r: &mut ByteReader) -> Result<String, FormatError> {
    if &r.read_magic::<16>()? != MAGIC {
        return Err(FormatError::MalformedHeader("no RAD tag"));
    }
    Ok(String::new())
}

fn to_sbi(regs: &[u8]) -> [u8; 11] {
    REG_XLAT.map(|i| regs[i])
}

/// Decode the note byte and the instrument/effect byte of one cell,
/// reading the effect parameter if an effect is present.
fn read_event(r: &mut ByteReader<'_>) -> Result<Event, FormatError> {
    let b = r.read_u8()?;
    let note = match b & 0x0f {
        0 => Note::None,
        15 => Note::Off,
        n => Note::from_semitone((n + 13 + 12 * ((b & 0x70) >> 4)) as i32),
    };

    let c = r.read_u8()?;
    let cmd = c & 0x0f;
    let effect = if cmd != 0 {
        rad_effect(cmd, r.read_u8()?)
    } else {
        Effect::None
    };

    Ok(Event {
        note,
        instrument: ((b & 0x80) >> 3) | (c >> 4),
        effect,
        ..Event::empty()
    })
}

/// Read one pattern's row lists into `pat`. Returns the number of events
/// that fell outside the pattern.
fn read_pattern(song: &mut Song, pat: usize, r: &mut ByteReader<'_>) -> Result<usize, FormatError> {
    let mut dropped = 0;
    loop {
        let row = r.read_u8()?;
        loop {
            let ch = r.read_u8()?;
            let event = read_event(r)?;
            match song.event_mut(pat, (ch & 0x7f) as usize, (row & 0x7f) as u16) {
                Some(slot) => *slot = event,
                None => dropped += 1,
            }
            if ch & LAST != 0 {
                break;
            }
        }
        if row & LAST != 0 {
            return Ok(dropped);
        }
    }
}

pub(crate) fn load_rad(
    song: &mut Song,
    r: &mut ByteReader,
    _opts: &LoadOptions,
) -> Result<(), FormatError> {
    r.skip(16)?; // magic
    let version = r.read_u8()?;
    let flags = r.read_u8()?;

    song.format = format!("RAD {}.{} (Reality Adlib Tracker)", version >> 4, version & 0x0f);
    song.initial_tempo = 125;
    song.initial_speed = match flags & 0x1f {
        0..=2 => 6,
        speed => speed,
    };
    song.quirks.linear_periods = true;
    song.channels = (0..CHANNELS)
        .map(|_| ChannelSettings {
            synth: true,
            ..ChannelSettings::default()
        })
        .collect();

    if flags & 0x80 != 0 {
        let description = r.read_cstring()?;
        debug!(%description, "RAD description");
    }

    let mut patches: Vec<(usize, [u8; 11])> = Vec::new();
    loop {
        let num = r.read_u8()?;
        if num == 0 {
            break;
        }
        patches.push((num as usize - 1, to_sbi(r.read_bytes(11)?)));
    }
    let instruments = patches.iter().map(|&(i, _)| i + 1).max().unwrap_or(0);

    song.alloc_instruments(instruments)?;
    song.alloc_samples(instruments)?;
    for (i, inst) in song.instruments.iter_mut().enumerate() {
        inst.set_single_sample(i as u16).transpose = -1;
    }
    for (i, regs) in patches {
        song.samples[i] = Sample {
            data: SampleData::Adlib(regs),
            ..Sample::default()
        };
    }

    let len = r.read_u8()? as usize;
    song.order = r
        .read_bytes(len)?
        .iter()
        .filter(|&&p| p < 0x80)
        .map(|&p| OrderEntry::Pattern(p))
        .collect();

    let mut offsets = [0usize; MAX_PATTERNS];
    for offset in offsets.iter_mut() {
        *offset = r.read_u16_le()? as usize;
    }
    let patterns = offsets.iter().rposition(|&o| o != 0).map_or(0, |p| p + 1);

    debug!(
        format = %song.format,
        length = len,
        instruments,
        patterns,
        "RAD module"
    );

    song.alloc_patterns(patterns)?;
    for pat in 0..patterns {
        let offset = offsets[pat];
        if let Some(first) = offsets[..pat].iter().position(|&o| o == offset && o != 0) {
            // Same data as an earlier pattern
            song.patterns[pat] = song.patterns[first].clone();
            continue;
        }
        song.alloc_pattern_tracks(pat, ROWS)?;
        if offset == 0 {
            continue;
        }

        r.seek_to(offset)?;
        let dropped = read_pattern(song, pat, r)?;
        if dropped > 0 {
            warn!(pattern = pat, dropped, "RAD events outside the pattern");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sbi_register_order() {
        let regs = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        assert_eq!(to_sbi(&regs), [1, 0, 3, 2, 5, 4, 7, 6, 10, 9, 8]);
    }

    #[test]
    fn cell_bytes() {
        // Octave 3 note 10, instrument 0x12, speed 2 (forced to 6)
        let data = [0xba, 0x2f, 0x02];
        let ev = read_event(&mut ByteReader::new(&data, 0)).unwrap();
        assert_eq!(ev.note, Note::On(10 + 13 + 36));
        assert_eq!(ev.instrument, 0x12);
        assert_eq!(ev.effect, Effect::SetTempo(6));

        // Key off, no effect parameter byte
        let data = [0x0f, 0x10];
        let mut r = ByteReader::new(&data, 0);
        let ev = read_event(&mut r).unwrap();
        assert_eq!(ev.note, Note::Off);
        assert_eq!(ev.instrument, 1);
        assert_eq!(r.position(), 2);
    }

    #[test]
    fn rows_outside_are_dropped() {
        let mut song = Song::default();
        song.set_channels(2);
        song.alloc_patterns(1).unwrap();
        song.alloc_pattern_tracks(0, ROWS).unwrap();

        // Row 1: channel 0, then channel 5 (outside); row 70 (outside), last
        let data = [0x01, 0x00, 0x01, 0x10, 0x85, 0x01, 0x10, 0xc6, 0x80, 0x01, 0x10];
        let dropped = read_pattern(&mut song, 0, &mut ByteReader::new(&data, 0)).unwrap();
        assert_eq!(dropped, 2);
        assert_eq!(song.event(0, 0, 1).unwrap().instrument, 1);
    }
}
