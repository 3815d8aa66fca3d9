//! Quadra Composer (EMOD) format parser.
//!
//! An IFF `FORM` of type `EMOD` with three chunks: `EMIC` (song header,
//! instruments, pattern list and order), `PATT` (pattern data) and `8SMP`
//! (sample data). Patterns carry an ID of their own; the order list names
//! patterns by ID, so IDs are mapped to pattern indices as the pattern
//! list is read.

use tl_ir::{Event, LoopType, Note, OrderEntry, Sample, SampleData, Song};
use tracing::debug;

use crate::chunk::{ChunkConfig, ChunkParser};
use crate::effect_parser::emod_effect;
use crate::reader::{parse_string, ByteReader};
use crate::{FormatError, LoadOptions};

const CHANNELS: usize = 4;

struct EmodLoader<'s> {
    song: &'s mut Song,
    /// Pattern ID to pattern index
    reorder: [u8; 256],
    skip_samples: bool,
}

pub(crate) fn test_emod(r: &mut ByteReader) -> Result<String, FormatError> {
    if &r.read_magic::<4>()? != b"FORM" {
        return Err(FormatError::MalformedHeader("no FORM tag"));
    }
    r.read_u32_be()?;
    if &r.read_magic::<4>()? != b"EMOD" {
        return Err(FormatError::MalformedHeader("FORM is not EMOD"));
    }

    // The title lives in the song header chunk, usually the first one
    if r.peek_bytes(4).map_or(false, |id| id == b"EMIC") && r.skip(10).is_ok() {
        if let Ok(name) = r.read_bytes(20) {
            return Ok(parse_string(name));
        }
    }
    Ok(String::new())
}

fn get_emic(ctx: &mut EmodLoader<'_>, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    let song = &mut *ctx.song;
    let version = r.read_u16_be()?;
    song.set_title(&parse_string(r.read_bytes(20)?));
    song.set_author(&parse_string(r.read_bytes(20)?));
    song.initial_tempo = r.read_u8()? as u16;
    let instruments = r.read_u8()? as usize;

    song.format = format!("EMOD v{} (Quadra Composer)", version);
    song.quirks.amiga_range = true;
    debug!(format = %song.format, title = %song.title, instruments, "EMOD module");

    song.alloc_instruments(instruments)?;
    song.alloc_samples(instruments)?;
    for i in 0..instruments {
        r.read_u8()?; // number
        let volume = r.read_u8()?;
        let len = 2 * r.read_u16_be()? as u32;
        let name = parse_string(r.read_bytes(20)?);
        let looped = r.read_u8()? & 1 != 0;
        let finetune = r.read_u8()?;
        let loop_start = 2 * r.read_u16_be()? as u32;
        let loop_end = loop_start + 2 * r.read_u16_be()? as u32;
        r.read_u32_be()?; // sample pointer

        let inst = &mut song.instruments[i];
        inst.set_name(&name);
        let sub = inst.set_single_sample(i as u16);
        sub.volume = volume;
        sub.finetune = (finetune << 4) as i8;

        let sample = &mut song.samples[i];
        *sample = Sample::new(&name);
        sample.loop_start = loop_start;
        sample.loop_end = loop_end;
        sample.loop_type = if looped { LoopType::Forward } else { LoopType::None };
        sample.length = len;

        debug!(
            "[{:2X}] {:<20} {:05x} {:05x} {:05x} {} V{:02x}",
            i,
            name,
            len,
            loop_start,
            loop_end,
            if looped { 'L' } else { ' ' },
            volume
        );
    }

    r.read_u8()?; // pad
    let patterns = r.read_u8()? as usize;
    song.alloc_patterns(patterns)?;
    for i in 0..patterns {
        let id = r.read_u8()?;
        ctx.reorder[id as usize] = i as u8;
        let rows = r.read_u8()? as u16 + 1;
        song.alloc_pattern_tracks(i, rows)?;
        r.skip(20)?; // name
        r.read_u32_be()?; // pattern pointer
    }

    let len = r.read_u8()? as usize;
    debug!(patterns, length = len, "EMOD patterns");
    song.order = r
        .read_bytes(len)?
        .iter()
        .map(|&id| OrderEntry::Pattern(ctx.reorder[id as usize]))
        .collect();
    Ok(())
}

/// Decode one 4-byte pattern cell.
fn convert_event(cell: &[u8; 4]) -> Event {
    Event {
        instrument: cell[0],
        note: match cell[1] {
            0xff => Note::None,
            n => Note::from_semitone(n as i32 + 36),
        },
        effect: emod_effect(cell[2] & 0x0f, cell[3]),
        ..Event::empty()
    }
}

fn get_patt(ctx: &mut EmodLoader<'_>, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    let song = &mut *ctx.song;
    for pat in 0..song.patterns.len() {
        let rows = song.patterns[pat].rows;
        for row in 0..rows {
            for ch in 0..CHANNELS {
                let cell: [u8; 4] = r.read_magic()?;
                let event = song
                    .event_mut(pat, ch, row)
                    .ok_or(FormatError::MalformedHeader("EMOD event outside pattern"))?;
                *event = convert_event(&cell);
            }
        }
    }
    Ok(())
}

fn get_8smp(ctx: &mut EmodLoader<'_>, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    if ctx.skip_samples {
        return Ok(());
    }
    for sample in ctx.song.samples.iter_mut() {
        sample.data = SampleData::Mono8(r.read_pcm8(sample.len())?);
    }
    Ok(())
}

pub(crate) fn load_emod(
    song: &mut Song,
    r: &mut ByteReader,
    opts: &LoadOptions,
) -> Result<(), FormatError> {
    r.skip(12)?; // FORM, size, EMOD
    song.set_channels(CHANNELS);

    let mut parser: ChunkParser<EmodLoader<'_>> = ChunkParser::new(ChunkConfig::default());
    parser.register("EMIC", get_emic);
    parser.register("PATT", get_patt);
    parser.register("8SMP", get_8smp);

    let mut ctx = EmodLoader {
        song,
        reorder: [0; 256],
        skip_samples: opts.skip_samples,
    };
    parser.parse(r, &mut ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tl_ir::Effect;

    #[test]
    fn cell_decoding() {
        // Jump parameter 12 is decimal for position 0x12
        let ev = convert_event(&[0x02, 0x0c, 0x0b, 12]);
        assert_eq!(ev.instrument, 2);
        assert_eq!(ev.note, Note::On(48));
        assert_eq!(ev.effect, Effect::PositionJump(0x12));

        let ev = convert_event(&[0, 0xff, 0x19, 0x10]);
        assert_eq!(ev.note, Note::None);
        assert_eq!(ev.effect, Effect::SampleOffset(0x20));
    }

    #[test]
    fn note_byte_zero_is_the_lowest_note() {
        assert_eq!(convert_event(&[1, 0x00, 0, 0]).note, Note::On(36));
        assert_eq!(convert_event(&[1, 0xff, 0, 0]).note, Note::None);
        // Bytes past the note range carry no note
        assert_eq!(convert_event(&[1, 0xf0, 0, 0]).note, Note::None);
    }

    #[test]
    fn rejects_other_forms() {
        let mut data = b"FORM".to_vec();
        data.extend_from_slice(&4u32.to_be_bytes());
        data.extend_from_slice(b"8SVX");
        assert!(test_emod(&mut ByteReader::new(&data, 0)).is_err());
    }
}
