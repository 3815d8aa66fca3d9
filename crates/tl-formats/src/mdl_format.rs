//! Digitrakker (MDL) format parser.
//!
//! MDL is an IFF-like sequence of chunks with 2-character IDs and
//! little-endian 32-bit sizes, one chunk per kind of data:
//!
//! | ID | Contents |
//! |----|----------|
//! | `IN` | song header, channel pans, order |
//! | `PA` | patterns (track index per channel) |
//! | `TR` | packed tracks, shared between patterns |
//! | `II` | instruments (v1.0 and later) |
//! | `IS` | sample headers |
//! | `SA` | sample data, optionally bit-packed |
//! | `VE`/`PE`/`FE` | volume, pan and pitch envelopes |
//!
//! Version 0.0 files use a fixed 32-channel pattern layout and a sample
//! header that doubles as instrument list.
//!
//! Events refer to instruments and samples by the numbers they have in
//! the file; these are remapped to table indices once everything is read.

use tl_ir::{
    c2spd_to_note, AllocError, ChannelSettings, Envelope, Event, LoopType, Note, OrderEntry,
    Sample, SampleData, Song, SubInstrument, Track, VolumeCommand, C4_NTSC_RATE, NOTE_RANGE,
};
use tracing::{debug, warn};

use crate::bits::{unpack_sample16, unpack_sample8};
use crate::chunk::{ChunkConfig, ChunkParser, Endian};
use crate::effect_parser::{mdl_effect1, mdl_effect2};
use crate::reader::{parse_string, ByteReader};
use crate::{FormatError, LoadOptions};

const CHUNKS: ChunkConfig = ChunkConfig {
    id_size: 2,
    endian: Endian::Little,
    truncate_ids: false,
};

const MAX_ROWS: usize = 256;

const NOTE_FOLLOWS: u8 = 0x04;
const INSTRUMENT_FOLLOWS: u8 = 0x08;
const VOLUME_FOLLOWS: u8 = 0x10;
const EFFECT_FOLLOWS: u8 = 0x20;
const PARAMETER1_FOLLOWS: u8 = 0x40;
const PARAMETER2_FOLLOWS: u8 = 0x80;

/// A track cell as stored, before effect translation and instrument
/// renumbering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct RawEvent {
    note: u8,
    instrument: u8,
    volume: u8,
    fx1: u8,
    param1: u8,
    fx2: u8,
    param2: u8,
}

impl RawEvent {
    fn to_event(self) -> Event {
        Event {
            note: match self.note {
                0 => Note::None,
                0xff => Note::Off,
                n => Note::from_semitone(n as i32 + 11),
            },
            instrument: self.instrument,
            volume: match self.volume {
                0 => VolumeCommand::None,
                v => VolumeCommand::Volume(v - 1),
            },
            effect: mdl_effect1(self.fx1, self.param1),
            effect2: mdl_effect2(self.fx2, self.param2),
        }
    }
}

/// Envelope as stored in `VE`/`PE`/`FE`: 15 (tick delta, value) pairs.
#[derive(Clone, Debug)]
struct RawEnvelope {
    num: u8,
    data: [u8; 30],
    /// Sustain point in the low nibble, sustain/loop enable in bits 4-5
    sus: u8,
    /// Loop start in the low nibble, loop end in the high nibble
    lp: u8,
}

impl RawEnvelope {
    fn to_envelope(&self) -> Envelope {
        let mut env = Envelope::new();
        env.enabled = true;
        let mut last_tick: i32 = -1;
        for pair in self.data.chunks_exact(2) {
            if pair[0] == 0 {
                break;
            }
            let tick = last_tick + pair[0] as i32;
            env.add_point(tick as u16, pair[1] as i16);
            last_tick = tick;
        }
        if self.sus & 0x10 != 0 {
            env.sustain = Some(self.sus & 0x0f);
        }
        if self.sus & 0x20 != 0 {
            env.loop_range = Some((self.lp & 0x0f, self.lp >> 4));
        }
        env.sanitize();
        env
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct SampleInfo {
    /// File sample number
    number: u8,
    c2spd: u32,
    frames: usize,
    is_16bit: bool,
    /// 0 raw, 1 packed 8-bit, 2 packed 16-bit
    pack: u8,
}

struct MdlLoader<'s> {
    song: &'s mut Song,
    /// File instrument number per instrument
    instrument_numbers: Vec<u8>,
    samples: Vec<SampleInfo>,
    /// Envelope number per instrument
    volume_index: Vec<Option<u8>>,
    pan_index: Vec<Option<u8>>,
    pitch_index: Vec<Option<u8>>,
    volume_envelopes: Vec<RawEnvelope>,
    pan_envelopes: Vec<RawEnvelope>,
    pitch_envelopes: Vec<RawEnvelope>,
    tracks: Vec<Vec<RawEvent>>,
    skip_samples: bool,
}

pub(crate) fn test_mdl(r: &mut ByteReader) -> Result<String, FormatError> {
    if &r.read_magic::<4>()? != b"DMDL" {
        return Err(FormatError::MalformedHeader("no DMDL tag"));
    }
    r.read_u8()?; // version
    if r.peek_bytes(2).map_or(false, |id| id == b"IN") && r.skip(6).is_ok() {
        if let Ok(name) = r.read_bytes(32) {
            return Ok(parse_string(name));
        }
    }
    Ok(String::new())
}

// ---------------------------------------------------------------------------
// Song structure
// ---------------------------------------------------------------------------

fn get_in(ctx: &mut MdlLoader<'_>, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    let song = &mut *ctx.song;
    song.set_title(&parse_string(r.read_bytes(32)?));
    song.set_author(&parse_string(r.read_bytes(20)?));

    let len = r.read_u16_le()? as usize;
    let restart = r.read_u16_le()?;
    song.restart = u8::try_from(restart).unwrap_or(0);
    r.read_u8()?; // global volume
    song.initial_speed = r.read_u8()?;
    song.initial_tempo = r.read_u8()? as u16;

    song.channels.clear();
    for _ in 0..32 {
        let info = r.read_u8()?;
        if info & 0x80 != 0 {
            break;
        }
        song.channels.push(ChannelSettings::with_pan(info << 1));
    }
    let read = (song.channels.len() + 1).min(32);
    r.skip(32 - read)?;

    song.order = r
        .read_bytes(len)?
        .iter()
        .map(|&p| OrderEntry::Pattern(p))
        .collect();

    debug!(
        format = %song.format,
        title = %song.title,
        channels = song.channels.len(),
        length = len,
        "MDL module"
    );
    Ok(())
}

fn get_pa(ctx: &mut MdlLoader<'_>, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    let song = &mut *ctx.song;
    let patterns = r.read_u8()? as usize;
    debug!(patterns, "stored patterns");
    song.alloc_patterns(patterns)?;

    let channels = song.num_channels();
    for pat in song.patterns.iter_mut() {
        let stored = r.read_u8()? as usize;
        pat.rows = r.read_u8()? as u16 + 1;
        r.skip(16)?; // name
        for ch in 0..stored {
            let track = r.read_u16_le()? as usize;
            if ch < channels {
                pat.tracks[ch] = track;
            }
        }
    }
    Ok(())
}

/// Version 0.0 patterns: 64 rows, 32 track slots.
fn get_p0(ctx: &mut MdlLoader<'_>, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    let song = &mut *ctx.song;
    let patterns = r.read_u8()? as usize;
    debug!(patterns, "stored patterns");
    song.alloc_patterns(patterns)?;

    let channels = song.num_channels();
    for pat in song.patterns.iter_mut() {
        pat.rows = 64;
        for ch in 0..32 {
            let track = r.read_u16_le()? as usize;
            if ch < channels {
                pat.tracks[ch] = track;
            }
        }
    }
    Ok(())
}

fn cell<'e>(events: &'e mut [RawEvent], row: usize) -> Result<&'e mut RawEvent, FormatError> {
    events
        .get_mut(row)
        .ok_or(FormatError::MalformedHeader("MDL track row out of range"))
}

/// Unpack one track of `len` bytes into `events`. Returns the number of
/// rows touched.
fn read_track(r: &mut ByteReader<'_>, len: usize, events: &mut [RawEvent]) -> Result<usize, FormatError> {
    events.fill(RawEvent::default());
    let mut row = 0usize;
    let mut left = len as i64;

    while left > 0 {
        let j = r.read_u8()?;
        left -= 1;
        let arg = (j >> 2) as usize;
        match j & 0x03 {
            // Skip rows
            0 => row += arg,
            // Repeat the previous event
            1 => {
                let prev = *cell(events, row.wrapping_sub(1))?;
                for k in 0..=arg {
                    *cell(events, row + k)? = prev;
                }
                row += arg;
            }
            // Copy an earlier row
            2 => {
                let src = *cell(events, arg)?;
                *cell(events, row)? = src;
            }
            _ => {
                let ev = cell(events, row)?;
                if j & NOTE_FOLLOWS != 0 {
                    ev.note = r.read_u8()?;
                    left -= 1;
                }
                if j & INSTRUMENT_FOLLOWS != 0 {
                    ev.instrument = r.read_u8()?;
                    left -= 1;
                }
                if j & VOLUME_FOLLOWS != 0 {
                    ev.volume = r.read_u8()?;
                    left -= 1;
                }
                if j & EFFECT_FOLLOWS != 0 {
                    let fx = r.read_u8()?;
                    ev.fx1 = fx & 0x0f;
                    ev.fx2 = fx >> 4;
                    left -= 1;
                }
                if j & PARAMETER1_FOLLOWS != 0 {
                    ev.param1 = r.read_u8()?;
                    left -= 1;
                }
                if j & PARAMETER2_FOLLOWS != 0 {
                    ev.param2 = r.read_u8()?;
                    left -= 1;
                }
            }
        }
        row += 1;
    }
    Ok(row)
}

/// `rows` empty raw events, reserved fallibly.
fn raw_track(rows: usize) -> Result<Vec<RawEvent>, FormatError> {
    let mut events = Vec::new();
    events.try_reserve_exact(rows).map_err(|_| AllocError(rows))?;
    events.resize(rows, RawEvent::default());
    Ok(events)
}

/// Read the track table of a TR chunk. Each track keeps only the rows
/// it needs: 64, 128 or 256.
fn read_tracks(r: &mut ByteReader<'_>) -> Result<Vec<Vec<RawEvent>>, FormatError> {
    let stored = r.read_u16_le()? as usize;
    debug!(tracks = stored + 1, "stored tracks");

    let mut tracks = Vec::new();
    tracks.try_reserve_exact(stored + 1).map_err(|_| AllocError(stored + 1))?;
    // Track 0 is the empty track and not stored
    tracks.push(raw_track(MAX_ROWS)?);

    let mut scratch = [RawEvent::default(); MAX_ROWS];
    for _ in 0..stored {
        let len = r.read_u16_le()? as usize;
        let used = read_track(r, len, &mut scratch)?;
        let rows = match used {
            0..=64 => 64,
            65..=128 => 128,
            _ => MAX_ROWS,
        };
        let mut events = raw_track(0)?;
        events.try_reserve_exact(rows).map_err(|_| AllocError(rows))?;
        events.extend_from_slice(&scratch[..rows]);
        tracks.push(events);
    }
    Ok(tracks)
}

fn get_tr(ctx: &mut MdlLoader<'_>, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    ctx.tracks = read_tracks(r)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Instruments and samples
// ---------------------------------------------------------------------------

fn envelope_index(x: u8) -> Option<u8> {
    (x & 0x80 != 0).then_some(x & 0x3f)
}

fn get_ii(ctx: &mut MdlLoader<'_>, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    let count = r.read_u8()? as usize;
    debug!(instruments = count, "instruments");

    let song = &mut *ctx.song;
    song.instruments.clear();
    song.alloc_instruments(count)?;
    ctx.instrument_numbers = vec![0; count];
    ctx.volume_index = vec![None; count];
    ctx.pan_index = vec![None; count];
    ctx.pitch_index = vec![None; count];

    for i in 0..count {
        ctx.instrument_numbers[i] = r.read_u8()?;
        let nsm = r.read_u8()? as usize;
        let inst = &mut song.instruments[i];
        inst.set_name(&parse_string(r.read_bytes(32)?));
        inst.note_map = [None; NOTE_RANGE];
        debug!("[{:2X}] {:<32} {:2}", ctx.instrument_numbers[i], inst.name, nsm);

        let mut last_map = 0usize;
        for j in 0..nsm {
            let mut sub = SubInstrument::new(r.read_u8()? as u16);
            let map = r.read_u8()? as usize + 12;
            sub.volume = r.read_u8()?;
            for slot in inst.note_map.iter_mut().take(map + 1).skip(last_map) {
                *slot = Some(j as u8);
            }
            last_map = map + 1;

            let x = r.read_u8()?;
            if j == 0 {
                ctx.volume_index[i] = envelope_index(x);
            }
            if x & 0x40 == 0 {
                sub.volume = 0xff;
            }

            sub.pan = r.read_u8()? << 1;
            let x = r.read_u8()?;
            if j == 0 {
                ctx.pan_index[i] = envelope_index(x);
            }
            if x & 0x40 == 0 {
                sub.pan = 0x80;
            }

            let fadeout = r.read_u16_le()?;
            if j == 0 {
                inst.fadeout = fadeout;
            }

            sub.vibrato.rate = r.read_u8()?;
            sub.vibrato.depth = r.read_u8()?;
            sub.vibrato.sweep = r.read_u8()?;
            sub.vibrato.waveform = r.read_u8()?;
            r.read_u8()?;

            let x = r.read_u8()?;
            if j == 0 {
                ctx.pitch_index[i] = envelope_index(x);
            }
            inst.subs.push(sub);
        }
    }
    Ok(())
}

/// Apply the shared sample flags byte. Loop points arrive in bytes and
/// are converted to frames for 16-bit samples.
fn apply_sample_flags(
    sample: &mut Sample,
    info: &mut SampleInfo,
    length: u32,
    loop_start: u32,
    loop_end: u32,
    looped: bool,
    flags: u8,
) {
    let shift = flags & 0x01;
    info.is_16bit = shift != 0;
    info.frames = (length >> shift) as usize;
    info.pack = (flags & 0x0c) >> 2;
    sample.length = length >> shift;
    sample.bits16 = info.is_16bit;
    sample.loop_start = loop_start >> shift;
    sample.loop_end = loop_end >> shift;
    sample.loop_type = match (looped, flags & 0x02 != 0) {
        (true, true) => LoopType::PingPong,
        (true, false) => LoopType::Forward,
        (false, _) => LoopType::None,
    };
}

fn get_is(ctx: &mut MdlLoader<'_>, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    let count = r.read_u8()? as usize;
    debug!(samples = count, "sample infos");

    let song = &mut *ctx.song;
    song.samples.clear();
    song.alloc_samples(count)?;
    ctx.samples = vec![SampleInfo::default(); count];

    for (sample, info) in song.samples.iter_mut().zip(ctx.samples.iter_mut()) {
        info.number = r.read_u8()?;
        let name = parse_string(r.read_bytes(32)?);
        r.skip(8)?; // file name
        info.c2spd = r.read_u32_le()?;
        let length = r.read_u32_le()?;
        let loop_start = r.read_u32_le()?;
        let loop_len = r.read_u32_le()?;
        r.read_u8()?; // volume, unused since v1.0
        let flags = r.read_u8()?;

        *sample = Sample::new(&name);
        let loop_end = loop_start.saturating_add(loop_len).saturating_sub(1);
        apply_sample_flags(sample, info, length, loop_start, loop_end, loop_len > 0, flags);

        debug!(
            "[{:2X}] {:<32} {:05x}{} {:05x} {:05x} {} {:6} {}",
            info.number,
            name,
            info.frames,
            if info.is_16bit { '+' } else { ' ' },
            sample.loop_start,
            sample.loop_end,
            if sample.loop_type != LoopType::None { 'L' } else { ' ' },
            info.c2spd,
            info.pack
        );
    }
    Ok(())
}

/// Version 0.0 sample headers, one instrument per sample.
fn get_i0(ctx: &mut MdlLoader<'_>, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    let count = r.read_u8()? as usize;
    debug!(instruments = count, "instruments");

    let song = &mut *ctx.song;
    song.instruments.clear();
    song.samples.clear();
    song.alloc_instruments(count)?;
    song.alloc_samples(count)?;
    ctx.samples = vec![SampleInfo::default(); count];
    ctx.instrument_numbers = vec![0; count];
    ctx.volume_index = vec![None; count];
    ctx.pan_index = vec![None; count];
    ctx.pitch_index = vec![None; count];

    for i in 0..count {
        let number = r.read_u8()?;
        let name = parse_string(r.read_bytes(32)?);
        r.skip(8)?; // file name
        let c2spd = r.read_u16_le()? as u32;
        let length = r.read_u32_le()?;
        let loop_start = r.read_u32_le()?;
        let loop_len = r.read_u32_le()?;
        let volume = r.read_u8()?;
        let flags = r.read_u8()?;

        ctx.instrument_numbers[i] = number;
        let info = &mut ctx.samples[i];
        info.number = number;
        info.c2spd = c2spd;

        let sample = &mut song.samples[i];
        *sample = Sample::new(&name);
        let loop_end = loop_start.saturating_add(loop_len);
        apply_sample_flags(sample, info, length, loop_start, loop_end, loop_len > 0, flags);

        let inst = &mut song.instruments[i];
        inst.set_name(&name);
        inst.set_single_sample(number as u16).volume = volume;

        debug!(
            "[{:2X}] {:<32} {:5} V{:02x} {:05x}{} {:05x} {:05x} {}",
            number,
            name,
            c2spd,
            volume,
            info.frames,
            if info.is_16bit { '+' } else { ' ' },
            sample.loop_start,
            sample.loop_end,
            info.pack
        );
    }
    Ok(())
}

fn get_sa(ctx: &mut MdlLoader<'_>, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    if ctx.skip_samples {
        return Ok(());
    }
    debug!(samples = ctx.samples.len(), "stored samples");

    for (sample, info) in ctx.song.samples.iter_mut().zip(&ctx.samples) {
        sample.data = match info.pack {
            0 if info.is_16bit => SampleData::Mono16(r.read_pcm16_le(info.frames)?),
            0 => SampleData::Mono8(r.read_pcm8(info.frames)?),
            1 => {
                let len = r.read_u32_le()? as usize;
                SampleData::Mono8(unpack_sample8(r.read_bytes(len)?, info.frames)?)
            }
            2 => {
                let len = r.read_u32_le()? as usize;
                SampleData::Mono16(unpack_sample16(r.read_bytes(len)?, info.frames)?)
            }
            _ => return Err(FormatError::UnsupportedVariant("MDL sample pack method 3")),
        };
    }
    Ok(())
}

fn read_envelopes(r: &mut ByteReader<'_>) -> Result<Vec<RawEnvelope>, FormatError> {
    let count = r.read_u8()? as usize;
    let mut envelopes = Vec::with_capacity(count);
    for _ in 0..count {
        let num = r.read_u8()?;
        let mut data = [0; 30];
        r.read_into(&mut data)?;
        envelopes.push(RawEnvelope {
            num,
            data,
            sus: r.read_u8()?,
            lp: r.read_u8()?,
        });
    }
    Ok(envelopes)
}

fn get_ve(ctx: &mut MdlLoader<'_>, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    ctx.volume_envelopes = read_envelopes(r)?;
    debug!(count = ctx.volume_envelopes.len(), "volume envelopes");
    Ok(())
}

fn get_pe(ctx: &mut MdlLoader<'_>, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    ctx.pan_envelopes = read_envelopes(r)?;
    debug!(count = ctx.pan_envelopes.len(), "pan envelopes");
    Ok(())
}

fn get_fe(ctx: &mut MdlLoader<'_>, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    ctx.pitch_envelopes = read_envelopes(r)?;
    debug!(count = ctx.pitch_envelopes.len(), "pitch envelopes");
    Ok(())
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Envelope numbered `index` in `envelopes`. An instrument that selects a
/// missing envelope gets an enabled envelope without points.
fn select_envelope(index: Option<u8>, envelopes: &[RawEnvelope]) -> Option<Envelope> {
    let index = index?;
    match envelopes.iter().find(|e| e.num == index) {
        Some(raw) => Some(raw.to_envelope()),
        None => {
            let mut env = Envelope::new();
            env.enabled = true;
            env.sanitize();
            Some(env)
        }
    }
}

impl MdlLoader<'_> {
    /// Renumber instruments and samples, attach envelopes and store the
    /// translated tracks in the song.
    fn finish(self) -> Result<(), FormatError> {
        let MdlLoader {
            song,
            instrument_numbers,
            samples,
            volume_index,
            pan_index,
            pitch_index,
            volume_envelopes,
            pan_envelopes,
            pitch_envelopes,
            mut tracks,
            ..
        } = self;

        for event in tracks.iter_mut().flatten() {
            if event.instrument == 0 {
                continue;
            }
            if let Some(l) = instrument_numbers.iter().position(|&n| n == event.instrument) {
                event.instrument = l as u8 + 1;
            }
        }

        for (i, inst) in song.instruments.iter_mut().enumerate() {
            inst.volume_envelope = select_envelope(volume_index.get(i).copied().flatten(), &volume_envelopes);
            inst.panning_envelope = select_envelope(pan_index.get(i).copied().flatten(), &pan_envelopes);
            inst.pitch_envelope = select_envelope(pitch_index.get(i).copied().flatten(), &pitch_envelopes);

            for sub in inst.subs.iter_mut() {
                if let Some(k) = samples.iter().position(|s| s.number as u16 == sub.sample) {
                    sub.sample = k as u16;
                    let (transpose, finetune) = c2spd_to_note(samples[k].c2spd);
                    sub.transpose = transpose;
                    sub.finetune = finetune;
                } else {
                    warn!(sample = sub.sample, instrument = i, "MDL instrument names missing sample");
                }
            }
        }

        if tracks.is_empty() {
            tracks.push(raw_track(MAX_ROWS)?);
        }
        song.tracks.clear();
        song.tracks.try_reserve(tracks.len()).map_err(|_| AllocError(tracks.len()))?;
        for raw in &tracks {
            let mut track = Track::new(raw.len() as u16)?;
            for (dst, src) in track.events_mut().iter_mut().zip(raw) {
                *dst = src.to_event();
            }
            song.tracks.push(track);
        }
        Ok(())
    }
}

pub(crate) fn load_mdl(
    song: &mut Song,
    r: &mut ByteReader,
    opts: &LoadOptions,
) -> Result<(), FormatError> {
    r.skip(4)?; // DMDL
    let version = r.read_u8()?;

    song.format = format!("Digitrakker MDL {}.{}", version >> 4, version & 0x0f);
    song.volume_base = 0xff;
    song.c4_rate = C4_NTSC_RATE;
    song.quirks.fine_effects = true;
    song.quirks.ft2 = true;

    let mut parser: ChunkParser<MdlLoader<'_>> = ChunkParser::new(CHUNKS);
    parser.register("IN", get_in);
    parser.register("TR", get_tr);
    parser.register("SA", get_sa);
    parser.register("VE", get_ve);
    parser.register("PE", get_pe);
    parser.register("FE", get_fe);
    if version >> 4 != 0 {
        parser.register("II", get_ii);
        parser.register("PA", get_pa);
        parser.register("IS", get_is);
    } else {
        parser.register("PA", get_p0);
        parser.register("IS", get_i0);
    }

    let mut ctx = MdlLoader {
        song,
        instrument_numbers: Vec::new(),
        samples: Vec::new(),
        volume_index: Vec::new(),
        pan_index: Vec::new(),
        pitch_index: Vec::new(),
        volume_envelopes: Vec::new(),
        pan_envelopes: Vec::new(),
        pitch_envelopes: Vec::new(),
        tracks: Vec::new(),
        skip_samples: opts.skip_samples,
    };
    parser.parse(r, &mut ctx)?;
    ctx.finish()
}
