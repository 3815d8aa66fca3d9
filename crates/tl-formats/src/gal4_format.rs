//! Galaxy Music System 4.0 (GAL4) format parser.
//!
//! A little-endian RIFF file of type `AMFF`. Chunk counts are not stored
//! anywhere, so the chunks are walked twice: the first pass reads the song
//! header and order and counts patterns, instruments and samples; the
//! second pass, after rewinding, decodes patterns and instruments.

use tl_ir::{
    c2spd_to_note, AutoVibrato, ChannelSettings, Envelope, Event, LoopType, Note, OrderEntry,
    Sample, SampleData, Song, SubInstrument, VolumeCommand,
};
use tracing::{debug, warn};

use crate::chunk::{ChunkConfig, ChunkParser, Endian};
use crate::effect_parser::gal4_effect;
use crate::reader::{parse_string, ByteReader};
use crate::{FormatError, LoadOptions};

const CHUNKS: ChunkConfig = ChunkConfig {
    id_size: 4,
    endian: Endian::Little,
    truncate_ids: true,
};

/// Envelope points stored per instrument.
const ENVELOPE_POINTS: usize = 10;

struct Gal4Loader<'s> {
    song: &'s mut Song,
    patterns: usize,
    instruments: usize,
    samples: usize,
    /// Next free slot in the sample table
    next_sample: usize,
    /// Patterns decoded in the second pass
    loaded: Vec<bool>,
    skip_samples: bool,
}

pub(crate) fn test_gal4(r: &mut ByteReader) -> Result<String, FormatError> {
    if &r.read_magic::<4>()? != b"RIFF" {
        return Err(FormatError::MalformedHeader("no RIFF tag"));
    }
    r.read_u32_le()?;
    if &r.read_magic::<4>()? != b"AMFF" {
        return Err(FormatError::MalformedHeader("RIFF is not AMFF"));
    }
    if &r.read_magic::<4>()? != b"MAIN" {
        return Err(FormatError::MalformedHeader("AMFF without MAIN chunk"));
    }
    r.read_u32_le()?;
    Ok(parse_string(r.read_bytes(64)?))
}

// ---------------------------------------------------------------------------
// First pass
// ---------------------------------------------------------------------------

fn get_main(ctx: &mut Gal4Loader<'_>, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    let song = &mut *ctx.song;
    song.set_title(&parse_string(r.read_bytes(64)?));
    song.format = "Galaxy Music System 4.0".into();

    let flags = r.read_u8()?;
    song.quirks.linear_periods = flags & 0x01 == 0;
    let channels = r.read_u8()? as usize;
    if channels == 0 {
        return Err(FormatError::MalformedHeader("GAL4 module without channels"));
    }
    song.channels = vec![ChannelSettings::default(); channels];
    song.initial_speed = r.read_u8()?;
    song.initial_tempo = r.read_u8()? as u16;
    Ok(())
}

fn get_ordr(ctx: &mut Gal4Loader<'_>, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    let len = r.read_u8()? as usize;
    ctx.song.order = r
        .read_bytes(len)?
        .iter()
        .map(|&p| OrderEntry::Pattern(p))
        .collect();
    Ok(())
}

fn count_patt(ctx: &mut Gal4Loader<'_>, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    ctx.patterns = ctx.patterns.max(r.read_u8()? as usize + 1);
    Ok(())
}

fn count_inst(ctx: &mut Gal4Loader<'_>, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    r.read_u8()?;
    ctx.instruments = ctx.instruments.max(r.read_u8()? as usize + 1);
    r.skip(28)?;
    ctx.samples += r.read_u8()? as usize;
    Ok(())
}

// ---------------------------------------------------------------------------
// Second pass
// ---------------------------------------------------------------------------

fn get_patt(ctx: &mut Gal4Loader<'_>, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    let song = &mut *ctx.song;
    let pat = r.read_u8()? as usize;
    r.read_u32_le()?; // packed size
    let rows = r.read_u8()? as u16 + 1;

    if pat >= song.patterns.len() {
        return Err(FormatError::MalformedHeader("GAL4 pattern not counted"));
    }
    song.alloc_pattern_tracks(pat, rows)?;
    ctx.loaded[pat] = true;

    let channels = song.num_channels();
    let mut dropped = 0;
    let mut row = 0;
    while row < rows {
        let flag = r.read_u8()?;
        if flag == 0 {
            row += 1;
            continue;
        }

        let mut event = Event::empty();
        if flag & 0x80 != 0 {
            let param = r.read_u8()?;
            let cmd = r.read_u8()?;
            if cmd > 0x0f && cmd != 0x14 {
                warn!(cmd, param, "unknown GAL4 effect");
            }
            event.effect = gal4_effect(cmd, param);
        }
        if flag & 0x40 != 0 {
            event.instrument = r.read_u8()?;
            event.note = match r.read_u8()? {
                128 => Note::Off,
                n if n > 12 => Note::from_semitone(n as i32 - 13),
                _ => Note::None,
            };
        }
        if flag & 0x20 != 0 {
            event.volume = VolumeCommand::Volume(r.read_u8()? / 2);
        }

        let ch = (flag & 0x1f) as usize;
        if ch < channels {
            let slot = song
                .event_mut(pat, ch, row)
                .ok_or(FormatError::MalformedHeader("GAL4 event outside pattern"))?;
            if flag & 0x80 != 0 {
                slot.effect = event.effect;
            }
            if flag & 0x40 != 0 {
                slot.instrument = event.instrument;
                slot.note = event.note;
            }
            if flag & 0x20 != 0 {
                slot.volume = event.volume;
            }
        } else {
            dropped += 1;
        }
    }
    if dropped > 0 {
        warn!(pattern = pat, dropped, "GAL4 events outside the song's channels");
    }
    Ok(())
}

/// Build an envelope from packed flags and up to ten 3-byte points
/// (16-bit tick in 1/16 units, 8-bit value).
fn build_envelope(points: &[u8], count: usize, flags: u8, sustain: u8, loop_range: (u8, u8)) -> Envelope {
    if count > ENVELOPE_POINTS {
        warn!(count, "GAL4 envelope point count clamped");
    }
    let mut env = Envelope::new();
    for p in points.chunks_exact(3).take(count.min(ENVELOPE_POINTS)) {
        env.add_point(u16::from_le_bytes([p[0], p[1]]) / 16, p[2] as i16);
    }
    env.enabled = flags & 0x01 != 0;
    if flags & 0x02 != 0 {
        env.sustain = Some(sustain);
    }
    if flags & 0x04 != 0 {
        env.loop_range = Some(loop_range);
    }
    env.sanitize();
    env
}

fn get_inst(ctx: &mut Gal4Loader<'_>, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    r.read_u8()?;
    let index = r.read_u8()? as usize;
    let name = parse_string(r.read_bytes(28)?);
    let nsm = r.read_u8()? as usize;
    r.skip(12)?; // first octave of the sample map
    let map = r.read_bytes(96)?;

    r.skip(11)?;
    let vibrato = {
        let waveform = r.read_u8()?;
        let sweep = r.read_u8()?;
        r.skip(2)?;
        let depth = r.read_u8()? / 4;
        let rate = (r.read_u16_le()? / 16) as u8;
        r.read_u8()?;
        AutoVibrato {
            rate,
            depth,
            sweep,
            waveform,
        }
    };

    // Volume envelope in the low nibbles, pan envelope in the high nibbles
    let flags = r.read_u8()?;
    let counts = r.read_u8()?;
    let sustain = r.read_u8()?;
    let loop_start = r.read_u8()?;
    let loop_end = r.read_u8()?;
    let volume_points = r.read_bytes(30)?;
    let pan_points = r.read_bytes(30)?;
    r.read_u8()?; // fadeout
    r.read_u8()?;

    let volume_envelope = build_envelope(
        volume_points,
        (counts & 0x0f) as usize + 1,
        flags & 0x0f,
        sustain & 0x0f,
        (loop_start & 0x0f, loop_end & 0x0f),
    );
    let panning_envelope = build_envelope(
        pan_points,
        (counts >> 4) as usize + 1,
        flags >> 4,
        sustain >> 4,
        (loop_start >> 4, loop_end >> 4),
    );

    debug!("[{:2X}] {:<28} {:2}", index, name, nsm);

    let song = &mut *ctx.song;
    let inst = song
        .instruments
        .get_mut(index)
        .ok_or(FormatError::MalformedHeader("GAL4 instrument not counted"))?;
    inst.set_name(&name);
    for (slot, &m) in inst.note_map.iter_mut().zip(map) {
        *slot = Some(m);
    }
    inst.volume_envelope = Some(volume_envelope);
    inst.panning_envelope = Some(panning_envelope);
    inst.subs.clear();

    for j in 0..nsm {
        let snum = ctx.next_sample;
        ctx.next_sample += 1;

        r.skip(8)?; // SAMP, size
        let sample_name = parse_string(r.read_bytes(28)?);
        let pan = match r.read_u8()? as u16 * 4 {
            0 => 0x80,
            p => p.min(0xff) as u8,
        };
        let volume = r.read_u8()?;
        let flags = r.read_u8()?;
        r.read_u8()?;
        let len = r.read_u32_le()?;
        let loop_start = r.read_u32_le()?;
        let loop_end = r.read_u32_le()?;
        let rate = r.read_u32_le()?;
        r.skip(8)?;

        let (transpose, finetune) = c2spd_to_note(rate);
        let mut sub = SubInstrument::new(snum as u16);
        sub.pan = pan;
        sub.volume = volume;
        sub.transpose = transpose;
        sub.finetune = finetune;
        sub.vibrato = vibrato;
        song.instruments[index].subs.push(sub);

        let is_16bit = flags & 0x04 != 0;
        let sample = song
            .samples
            .get_mut(snum)
            .ok_or(FormatError::MalformedHeader("GAL4 sample not counted"))?;
        *sample = Sample::new(&sample_name);
        sample.length = len;
        sample.bits16 = is_16bit;
        sample.loop_start = loop_start;
        sample.loop_end = loop_end;
        sample.loop_type = match (flags & 0x08 != 0, flags & 0x10 != 0) {
            (true, true) => LoopType::PingPong,
            (true, false) => LoopType::Forward,
            _ => LoopType::None,
        };

        debug!(
            "  {:X}: {:05x}{}{:05x} {:05x} V{:02x} P{:02x} {:5}",
            j,
            len,
            if is_16bit { '+' } else { ' ' },
            loop_start,
            loop_end,
            volume,
            pan,
            rate
        );

        if len > 1 {
            let frames = len as usize;
            if ctx.skip_samples {
                // Later sample headers follow the data
                let bytes = if is_16bit { 2 * frames } else { frames };
                r.skip(bytes.min(r.remaining()))?;
            } else if is_16bit {
                sample.data = SampleData::Mono16(r.read_pcm16_le(frames)?);
            } else {
                sample.data = SampleData::Mono8(r.read_pcm8(frames)?);
            }
        }
    }
    Ok(())
}

pub(crate) fn load_gal4(
    song: &mut Song,
    r: &mut ByteReader,
    opts: &LoadOptions,
) -> Result<(), FormatError> {
    r.skip(12)?; // RIFF, size, AMFF
    let offset = r.position();

    let mut ctx = Gal4Loader {
        song,
        patterns: 0,
        instruments: 0,
        samples: 0,
        next_sample: 0,
        loaded: Vec::new(),
        skip_samples: opts.skip_samples,
    };

    let mut counting: ChunkParser<Gal4Loader<'_>> = ChunkParser::new(CHUNKS);
    counting.register("MAIN", get_main);
    counting.register("ORDR", get_ordr);
    counting.register("PATT", count_patt);
    counting.register("INST", count_inst);
    counting.parse(r, &mut ctx)?;

    if ctx.song.channels.is_empty() {
        return Err(FormatError::MalformedHeader("GAL4 module without MAIN chunk"));
    }
    debug!(
        title = %ctx.song.title,
        patterns = ctx.patterns,
        instruments = ctx.instruments,
        samples = ctx.samples,
        "GAL4 module"
    );
    ctx.song.alloc_patterns(ctx.patterns)?;
    ctx.song.alloc_instruments(ctx.instruments)?;
    ctx.song.alloc_samples(ctx.samples)?;
    ctx.loaded = vec![false; ctx.patterns];

    r.seek_to(offset)?;
    let mut decoding: ChunkParser<Gal4Loader<'_>> = ChunkParser::new(CHUNKS);
    decoding.register("PATT", get_patt);
    decoding.register("INST", get_inst);
    decoding.parse(r, &mut ctx)?;

    for pat in 0..ctx.patterns {
        if !ctx.loaded[pat] {
            ctx.song.alloc_pattern_tracks(pat, 64)?;
        }
    }
    Ok(())
}
