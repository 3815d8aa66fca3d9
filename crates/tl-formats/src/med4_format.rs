//! MED 2.10 (MED4) format parser.
//!
//! MED4 has no fixed header layout: a bit mask says which of the 32
//! instrument slots are present, and per-instrument flag bits say which
//! fields follow. Pattern blocks are nibble-packed with per-row masks,
//! and instrument data may be plain samples or synthetic/hybrid
//! instruments carrying volume and waveform sequencing tables. An
//! IFF-style trailer (`MEDV`, `ANNO`, `HLDC`) may follow.
//!
//! The version that wrote the file is only known from a `MEDV` chunk, so
//! the end of the file is scanned for one before anything else.

use tl_ir::{
    Event, LoopType, Note, OrderEntry, Sample, SampleData, Song, SubInstrument, SynthTables,
};
use tracing::{debug, warn};

use crate::chunk::{ChunkConfig, ChunkParser};
use crate::effect_parser::med4_effect;
use crate::reader::{parse_string, ByteReader};
use crate::{FormatError, LoadOptions};

const SLOTS: usize = 32;
const BLOCK_END: u8 = 0xff;
const MEDV_TAG: &[u8; 8] = b"MEDV\x00\x00\x00\x04";

/// Fields from the song header instrument list, used when the
/// instrument data itself is read.
#[derive(Clone, Debug, Default)]
struct InstrumentHeader {
    name: String,
    loop_start: u32,
    loop_end: u32,
    volume: u8,
    transpose: i8,
}

/// Reads 4-bit values high nibble first. The low half of a partly used
/// byte is dropped when the reader is.
#[derive(Default)]
struct NibbleReader {
    held: Option<u8>,
}

impl NibbleReader {
    fn read4(&mut self, r: &mut ByteReader<'_>) -> Result<u8, FormatError> {
        match self.held.take() {
            Some(b) => Ok(b & 0x0f),
            None => {
                let b = r.read_u8()?;
                self.held = Some(b);
                Ok(b >> 4)
            }
        }
    }

    fn read12(&mut self, r: &mut ByteReader<'_>) -> Result<u16, FormatError> {
        let a = self.read4(r)? as u16;
        let b = self.read4(r)? as u16;
        let c = self.read4(r)? as u16;
        Ok((a << 8) | (b << 4) | c)
    }
}

pub(crate) fn test_med4(r: &mut ByteReader) -> Result<String, FormatError> {
    if &r.read_magic::<4>()? != b"MED\x04" {
        return Err(FormatError::MalformedHeader("no MED4 tag"));
    }
    Ok(String::new())
}

/// Look for a `MEDV` chunk in the last KiB and return (major, minor).
fn scan_version(r: &mut ByteReader<'_>) -> Result<Option<(u8, u8)>, FormatError> {
    let len = r.len();
    if len <= 2000 {
        return Ok(None);
    }
    let pos = r.position();
    r.seek_to(len - 1023)?;
    let tail = r.read_bytes(1023)?;
    r.seek_to(pos)?;

    Ok(tail
        .windows(12)
        .take(1012)
        .find(|w| &w[..8] == MEDV_TAG)
        .map(|w| (w[10], w[11])))
}

/// Expand the variable-length mask that follows a presence byte into a
/// left-aligned 32-bit mask.
fn read_slot_mask(r: &mut ByteReader<'_>) -> Result<u32, FormatError> {
    let m0 = r.read_u8()?;
    let mut mask = 0u32;
    let mut bytes = 0u32;
    for bit in (0..8).rev() {
        if m0 & (1 << bit) != 0 {
            mask = (mask << 8) | r.read_u8()? as u32;
            bytes += 1;
        }
    }
    Ok(mask.checked_shl(32 - bytes.min(4) * 8).unwrap_or(0))
}

fn slot_present(mask: u32, slot: usize) -> bool {
    mask & (0x8000_0000 >> slot) != 0
}

fn read_instrument_header(r: &mut ByteReader<'_>) -> Result<InstrumentHeader, FormatError> {
    let flags = r.read_u8()?;
    let size = r.read_u8()? as usize;
    let mut hdr = InstrumentHeader {
        name: parse_string(r.read_bytes(size)?),
        volume: 0x40,
        ..InstrumentHeader::default()
    };

    let mut loop_len = 0;
    if flags & 0x01 == 0 {
        hdr.loop_start = (r.read_u16_be()? as u32) << 1;
    }
    if flags & 0x02 == 0 {
        loop_len = (r.read_u16_be()? as u32) << 1;
    }
    if flags & 0x04 == 0 {
        r.read_u8()?;
    }
    if flags & 0x08 == 0 {
        r.read_u8()?;
    }
    if flags & 0x20 == 0 {
        hdr.volume = r.read_u8()?;
    }
    if flags & 0x40 == 0 {
        hdr.transpose = r.read_i8()?;
    }
    hdr.loop_end = hdr.loop_start + loop_len;
    Ok(hdr)
}

/// Note and instrument nibbles of a 12-bit pattern value.
fn note_event(event: &mut Event, x: u16) {
    event.note = match x >> 4 {
        0 => Note::None,
        n => Note::from_semitone(n as i32 + 47),
    };
    event.instrument = (x & 0x0f) as u8;
}

/// Effect nibble and parameter byte of a 12-bit pattern value.
fn effect_event(event: &mut Event, x: u16) {
    event.effect = med4_effect((x >> 8) as u8, (x & 0xff) as u8);
}

/// Decode one half (32 rows) of a pattern block.
fn read_rows(
    song: &mut Song,
    pat: usize,
    first_row: u16,
    mut line_mask: u32,
    mut fx_mask: u32,
    nibbles: &mut NibbleReader,
    r: &mut ByteReader<'_>,
) -> Result<usize, FormatError> {
    let mut dropped = 0;
    for row in first_row..first_row + 32 {
        for (present, apply) in [
            (line_mask & 0x8000_0000 != 0, note_event as fn(&mut Event, u16)),
            (fx_mask & 0x8000_0000 != 0, effect_event as fn(&mut Event, u16)),
        ] {
            if !present {
                continue;
            }
            let channels = nibbles.read4(r)?;
            for ch in 0..4 {
                if channels & (0x08 >> ch) == 0 {
                    continue;
                }
                let x = nibbles.read12(r)?;
                match song.event_mut(pat, ch, row) {
                    Some(event) => apply(event, x),
                    None => dropped += 1,
                }
            }
        }
        line_mask <<= 1;
        fx_mask <<= 1;
    }
    Ok(dropped)
}

fn read_mask(r: &mut ByteReader<'_>, ctl: u8, all: u8, none: u8) -> Result<u32, FormatError> {
    if ctl & all != 0 {
        Ok(!0)
    } else if ctl & none != 0 {
        Ok(0)
    } else {
        r.read_u32_be()
    }
}

fn read_pattern(song: &mut Song, pat: usize, r: &mut ByteReader<'_>) -> Result<(), FormatError> {
    r.read_u8()?; // control block size
    r.read_u8()?; // channels
    let rows = r.read_u8()? as u16 + 1;
    r.read_u16_be()?; // packed length
    let ctl = r.read_u8()?;
    song.alloc_pattern_tracks(pat, rows)?;

    let line_mask0 = read_mask(r, ctl, 0x80, 0x40)?;
    let fx_mask0 = read_mask(r, ctl, 0x20, 0x10)?;
    let (line_mask1, fx_mask1) = if rows > 32 {
        (read_mask(r, ctl, 0x08, 0x04)?, read_mask(r, ctl, 0x02, 0x01)?)
    } else {
        (0, 0)
    };

    if r.read_u8()? != BLOCK_END {
        return Err(FormatError::MalformedHeader("MED4 pattern block not terminated"));
    }

    let mut nibbles = NibbleReader::default();
    let dropped = read_rows(song, pat, 0, line_mask0, fx_mask0, &mut nibbles, r)?
        + read_rows(song, pat, 32, line_mask1, fx_mask1, &mut nibbles, r)?;
    if dropped > 0 {
        warn!(pattern = pat, dropped, "MED4 events outside the pattern");
    }
    Ok(())
}

/// Synth/hybrid instrument header shared by both kinds.
struct SynthHeader {
    tables: SynthTables,
    waveforms: u16,
}

fn read_synth_header(r: &mut ByteReader<'_>) -> Result<SynthHeader, FormatError> {
    r.skip(4 + 2 + 2 + 2)?;
    r.read_u16_be()?; // repeat
    r.read_u16_be()?; // repeat length
    let volume_len = r.read_u16_be()? as usize;
    let wave_len = r.read_u16_be()? as usize;
    let volume_speed = r.read_u8()?;
    let wave_speed = r.read_u8()?;
    let waveforms = r.read_u16_be()?;
    let volume_table = r.read_bytes(volume_len)?.to_vec();
    let wave_table = r.read_bytes(wave_len)?.to_vec();
    Ok(SynthHeader {
        tables: SynthTables {
            volume_speed,
            wave_speed,
            volume_table,
            wave_table,
        },
        waveforms,
    })
}

fn push_sample(song: &mut Song, sample: Sample) -> Result<u16, FormatError> {
    song.alloc_samples(1)?;
    let idx = song.samples.len() - 1;
    song.samples[idx] = sample;
    Ok(idx as u16)
}

/// Record `len` 8-bit frames on `sample` and read them unless skipped.
fn read_pcm(
    sample: &mut Sample,
    r: &mut ByteReader<'_>,
    len: usize,
    opts: &LoadOptions,
) -> Result<(), FormatError> {
    sample.length = len as u32;
    if !opts.skip_samples {
        sample.data = SampleData::Mono8(r.read_pcm8(len)?);
    }
    Ok(())
}

fn looped_sample(hdr: &InstrumentHeader) -> Sample {
    let mut sample = Sample::new(&hdr.name);
    sample.loop_start = hdr.loop_start;
    sample.loop_end = hdr.loop_end;
    if hdr.loop_end > 1 {
        sample.loop_type = LoopType::Forward;
    }
    sample
}

fn read_instrument(
    song: &mut Song,
    slot: usize,
    hdr: &InstrumentHeader,
    r: &mut ByteReader<'_>,
    opts: &LoadOptions,
) -> Result<(), FormatError> {
    let length = r.read_u32_be()? as usize;
    let kind = r.read_u16_be()? as i16;
    let pos = r.position();
    song.instruments[slot].set_name(&hdr.name);

    match kind {
        // Hybrid: synth tables driving a single sample
        -2 => {
            let synth = read_synth_header(r)?;
            let offset = r.read_u32_be()? as usize;
            r.seek_to(pos + offset)?;
            let len = r.read_u32_be()? as usize;
            r.read_u16_be()?;

            let mut sample = looped_sample(hdr);
            read_pcm(&mut sample, r, len, opts)?;
            let idx = push_sample(song, sample)?;

            let inst = &mut song.instruments[slot];
            let sub = inst.set_single_sample(idx);
            sub.volume = hdr.volume;
            sub.transpose = hdr.transpose;
            inst.synth = Some(synth.tables);
            debug!("[{:2X}] {:<32} HYB {:05x} V{:02x} {:+03}", slot, hdr.name, len, hdr.volume, hdr.transpose);
        }
        // Synthetic: synth tables over a set of looped waveforms
        -1 => {
            let synth = read_synth_header(r)?;
            debug!(
                "[{:2X}] {:<32} SYN VS:{:02x} WS:{:02x} WF:{:02x} V{:02x} {:+03}",
                slot,
                hdr.name,
                synth.tables.volume_speed,
                synth.tables.wave_speed,
                synth.waveforms & 0xff,
                hdr.volume,
                hdr.transpose
            );
            if synth.waveforms != 0xffff {
                let mut pointers = Vec::with_capacity(synth.waveforms as usize);
                for _ in 0..synth.waveforms {
                    pointers.push(r.read_u32_be()? as usize);
                }

                let mut subs = Vec::with_capacity(pointers.len());
                for ptr in pointers {
                    r.seek_to(pos + ptr)?;
                    let len = 2 * r.read_u16_be()? as usize;
                    let mut sample = Sample::new(&hdr.name);
                    sample.loop_end = len as u32;
                    sample.loop_type = LoopType::Forward;
                    read_pcm(&mut sample, r, len, opts)?;

                    let mut sub = SubInstrument::new(push_sample(song, sample)?);
                    sub.volume = hdr.volume;
                    sub.transpose = hdr.transpose.wrapping_sub(24);
                    subs.push(sub);
                }

                let inst = &mut song.instruments[slot];
                inst.subs = subs;
                inst.synth = Some(synth.tables);
            }
        }
        0 => {
            let mut sample = looped_sample(hdr);
            debug!(
                "[{:2X}] {:<32} {:04x} {:04x} {:04x} {} V{:02x} {:+03}",
                slot,
                hdr.name,
                length,
                sample.loop_start,
                sample.loop_end,
                if sample.loop_type != LoopType::None { 'L' } else { ' ' },
                hdr.volume,
                hdr.transpose
            );
            read_pcm(&mut sample, r, length, opts)?;
            let idx = push_sample(song, sample)?;
            let sub = song.instruments[slot].set_single_sample(idx);
            sub.volume = hdr.volume;
            sub.transpose = hdr.transpose;
        }
        // Multi-octave IFF instruments
        other => debug!("[{:2X}] {:<32} type {} skipped", slot, hdr.name, other),
    }

    r.seek_to(pos + length)
}

#[derive(Default)]
struct Trailer {
    version: Option<u32>,
    annotation: Option<String>,
}

fn get_medv(ctx: &mut Trailer, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
    ctx.version = Some(r.read_u32_be()?);
    Ok(())
}

fn get_anno(ctx: &mut Trailer, r: &mut ByteReader<'_>, size: u32) -> Result<(), FormatError> {
    let len = (size as usize).min(1023).min(r.remaining());
    ctx.annotation = Some(parse_string(r.read_bytes(len)?));
    Ok(())
}

fn read_trailer(r: &mut ByteReader<'_>) {
    let mut parser: ChunkParser<Trailer> = ChunkParser::new(ChunkConfig::default());
    parser.register("MEDV", get_medv);
    parser.register("ANNO", get_anno);

    let mut trailer = Trailer::default();
    if let Err(err) = parser.parse(r, &mut trailer) {
        warn!(%err, "MED4 trailer unreadable");
    }
    if let Some(ver) = trailer.version {
        debug!("MED version: {}.{}", (ver & 0xff00) >> 8, ver & 0xff);
    }
    if let Some(text) = trailer.annotation {
        debug!(annotation = %text, "MED4 annotation");
    }
}

pub(crate) fn load_med4(
    song: &mut Song,
    r: &mut ByteReader,
    opts: &LoadOptions,
) -> Result<(), FormatError> {
    r.skip(4)?; // MED\x04

    let (major, minor) = scan_version(r)?.unwrap_or((2, 10));
    song.format = format!("MED {}.{:02} MED4", major, minor);

    let header_mask = read_slot_mask(r)?;
    let mut headers = vec![InstrumentHeader::default(); SLOTS];
    for (slot, hdr) in headers.iter_mut().enumerate() {
        if slot_present(header_mask, slot) {
            *hdr = read_instrument_header(r)?;
        }
    }

    let patterns = r.read_u16_be()? as usize;
    let len = r.read_u16_be()? as usize;
    song.order = r
        .read_bytes(len)?
        .iter()
        .map(|&p| OrderEntry::Pattern(p))
        .collect();

    let tempo = r.read_u16_be()?;
    song.initial_tempo = if tempo <= 10 {
        125
    } else {
        (125 * tempo as u32 / 33) as u16
    };
    let transpose = r.read_i8()?;
    r.read_u8()?;
    let flags = r.read_u8()?;
    song.initial_speed = r.read_u8()?;
    if flags & 0x20 == 0 {
        song.quirks.slide_every_tick = true;
    }
    // MED 2 ignores the stored speed
    if major == 2 {
        song.initial_speed = if flags & 0x20 != 0 { 5 } else { 6 };
    }

    r.skip(20)?;
    r.skip(16)?; // track volumes
    r.read_u8()?; // master volume
    for hdr in headers.iter_mut() {
        hdr.transpose = hdr.transpose.wrapping_add(transpose);
    }

    // Channel count sits in the first pattern block
    let channels = r.peek_bytes(2)?[1] as usize;
    song.set_channels(channels);

    debug!(
        format = %song.format,
        channels,
        patterns,
        length = len,
        transpose,
        "MED4 module"
    );

    song.alloc_patterns(patterns)?;
    for pat in 0..patterns {
        read_pattern(song, pat, r)?;
    }

    let mut sample_mask = r.read_u32_be()?;
    r.read_u16_be()?;
    r.read_u16_be()?;
    // No instrument 0
    sample_mask <<= 1;

    let highest = (0..SLOTS)
        .filter(|&slot| slot_present(header_mask, slot) || slot_present(sample_mask, slot))
        .max();
    song.alloc_instruments(highest.map_or(0, |s| s + 1))?;
    debug!(instruments = song.instruments.len(), "MED4 instruments");

    for (slot, hdr) in headers.iter().enumerate().take(song.instruments.len()) {
        if slot_present(sample_mask, slot) {
            read_instrument(song, slot, hdr, r, opts)?;
        }
    }

    if r.skip(2).is_ok() {
        read_trailer(r);
    }
    Ok(())
}
