//! ProWizard-packed ProTracker modules.
//!
//! Packed modules are first depacked into a plain `M.K.` image, which is
//! then decoded as a 4-channel ProTracker module. The only packer handled
//! here is Module Protector (`TRK1`):
//!
//! ```text
//! 0x000  "TRK1"
//! 0x004  31 x 8-byte sample headers (no names)
//! 0x0fc  song length, restart byte
//! 0x0fe  128-byte order table
//! 0x17e  64-row 4-channel ProTracker patterns, then sample data
//! ```

use alloc::vec::Vec;
use binrw::BinRead;
use tl_ir::{LoopType, OrderEntry, Sample, SampleData, Song};
use tracing::debug;

use crate::mod_format::{read_pt_patterns, ModHeader};
use crate::reader::{parse_string, ByteReader};
use crate::{FormatError, LoadOptions};

const MP_MAGIC: &[u8; 4] = b"TRK1";
const MP_HEADER_SIZE: usize = 4 + 31 * 8 + 2 + 128;
const PATTERN_SIZE: usize = 64 * 4 * 4;

/// Module Protector header fields needed to rebuild a ProTracker header.
struct MpHeader<'a> {
    samples: &'a [u8],
    len: u8,
    restart: u8,
    order: &'a [u8],
    patterns: usize,
}

fn parse_mp_header<'a>(r: &mut ByteReader<'a>) -> Result<MpHeader<'a>, FormatError> {
    if r.remaining() < MP_HEADER_SIZE {
        return Err(FormatError::Truncated);
    }
    let magic: [u8; 4] = r.read_magic()?;
    if &magic != MP_MAGIC {
        return Err(FormatError::MalformedHeader("no TRK1 tag"));
    }

    let samples = r.read_bytes(31 * 8)?;
    for hdr in samples.chunks_exact(8) {
        let size = u16::from_be_bytes([hdr[0], hdr[1]]) as u32;
        let finetune = hdr[2];
        let volume = hdr[3];
        let loop_start = u16::from_be_bytes([hdr[4], hdr[5]]) as u32;
        let loop_size = u16::from_be_bytes([hdr[6], hdr[7]]) as u32;
        if size > 0x8000 || finetune > 0x0f || volume > 0x40 {
            return Err(FormatError::MalformedHeader("bad Module Protector sample"));
        }
        if size > 0 && loop_start + loop_size > size + 1 {
            return Err(FormatError::MalformedHeader("Module Protector loop past sample end"));
        }
    }

    let len = r.read_u8()?;
    let restart = r.read_u8()?;
    if len == 0 || len > 0x7f {
        return Err(FormatError::MalformedHeader("bad Module Protector song length"));
    }
    let order = r.read_bytes(128)?;
    if order.iter().any(|&p| p > 0x3f) {
        return Err(FormatError::MalformedHeader("bad Module Protector order"));
    }
    let patterns = order.iter().copied().max().map_or(1, |p| p as usize + 1);

    if r.remaining() < patterns * PATTERN_SIZE {
        return Err(FormatError::Truncated);
    }

    Ok(MpHeader {
        samples,
        len,
        restart,
        order,
        patterns,
    })
}

pub(crate) fn test_mp(r: &mut ByteReader) -> Result<String, FormatError> {
    parse_mp_header(r)?;
    Ok(String::new())
}

/// Rebuild a Module Protector file as a ProTracker `M.K.` module.
fn depack_mp(r: &mut ByteReader) -> Result<Vec<u8>, FormatError> {
    let mp = parse_mp_header(r)?;
    let rest = r.remaining();
    let tail = r.read_bytes(rest)?;

    let mut out = Vec::new();
    out.try_reserve_exact(1084 + tail.len())
        .map_err(|_| tl_ir::AllocError(1084 + tail.len()))?;

    out.extend_from_slice(&[0; 20]);
    for hdr in mp.samples.chunks_exact(8) {
        out.extend_from_slice(&[0; 22]);
        out.extend_from_slice(hdr);
    }
    out.push(mp.len);
    out.push(mp.restart);
    out.extend_from_slice(mp.order);
    out.extend_from_slice(b"M.K.");
    out.extend_from_slice(tail);

    debug!(patterns = mp.patterns, size = out.len(), "depacked Module Protector");
    Ok(out)
}

pub(crate) fn load_mp(
    song: &mut Song,
    r: &mut ByteReader,
    opts: &LoadOptions,
) -> Result<(), FormatError> {
    let image = depack_mp(r)?;
    let mut r = ByteReader::new(&image, 0);
    let header = ModHeader::read(&mut r)?;

    let patterns = header
        .order
        .iter()
        .copied()
        .max()
        .map_or(1, |p| p as usize + 1);

    song.set_title(&parse_string(&header.name));
    song.format = "MP (Module Protector)".into();
    song.set_channels(4);
    song.order = header
        .order
        .iter()
        .take(header.len as usize)
        .map(|&p| OrderEntry::Pattern(p))
        .collect();
    // Packers leave 0x7f or other junk where no restart was set
    song.restart = if header.restart < header.len { header.restart } else { 0 };
    debug!(patterns, length = header.len, "Module Protector module");

    song.alloc_instruments(31)?;
    song.alloc_samples(31)?;
    for (i, sh) in header.samples.iter().enumerate() {
        let name = parse_string(&sh.name);
        let len = 2 * sh.size as u32;
        let loop_start = 2 * sh.loop_start as u32;
        let loop_end = loop_start + 2 * sh.loop_size as u32;
        let looped = sh.loop_size > 1;

        let sample = &mut song.samples[i];
        *sample = Sample::new(&name);
        sample.loop_start = loop_start;
        sample.loop_end = loop_end;
        sample.loop_type = if !looped {
            LoopType::None
        } else if loop_start == 0 && len > loop_end {
            LoopType::Full
        } else {
            LoopType::Forward
        };
        sample.length = len;

        let inst = &mut song.instruments[i];
        inst.set_name(&name);
        inst.fadeout = 0xfff;
        if len > 0 {
            let sub = inst.set_single_sample(i as u16);
            sub.volume = sh.volume;
            sub.finetune = (sh.finetune << 4) as i8;
        }
    }

    read_pt_patterns(song, &mut r, patterns)?;
    song.quirks.amiga_range = true;

    if !opts.skip_samples {
        for sample in song.samples.iter_mut().filter(|s| !s.is_empty()) {
            sample.data = SampleData::Mono8(r.read_pcm8(sample.len())?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tl_ir::{Effect, Note};

    /// One pattern, one 8-byte sample looping over its first half.
    fn mp_file() -> Vec<u8> {
        let mut buf = MP_MAGIC.to_vec();
        buf.extend_from_slice(&[0x00, 0x04, 0x00, 0x40, 0x00, 0x00, 0x00, 0x02]);
        buf.extend_from_slice(&[0; 30 * 8]);
        buf.push(2);
        buf.push(0x7f);
        buf.extend_from_slice(&[0; 128]);
        let mut pattern = vec![0u8; PATTERN_SIZE];
        pattern[..4].copy_from_slice(&[0x01, 0xAC, 0x1C, 0x30]);
        buf.extend_from_slice(&pattern);
        buf.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        buf
    }

    #[test]
    fn detects_trk1() {
        let data = mp_file();
        assert!(test_mp(&mut ByteReader::new(&data, 0)).is_ok());

        let mut bad = data.clone();
        bad[6] = 0x10;
        assert!(test_mp(&mut ByteReader::new(&bad, 0)).is_err());

        let short = &data[..MP_HEADER_SIZE + 10];
        assert!(test_mp(&mut ByteReader::new(short, 0)).is_err());
    }

    #[test]
    fn depacked_image_is_protracker() {
        let data = mp_file();
        let image = depack_mp(&mut ByteReader::new(&data, 0)).unwrap();
        assert_eq!(&image[1080..1084], b"M.K.");
        assert_eq!(image.len(), 1084 + PATTERN_SIZE + 8);
        assert_eq!(image[951], 0x7f);
    }

    #[test]
    fn stored_restart_is_kept() {
        let mut data = mp_file();
        data[4 + 31 * 8 + 1] = 1;
        let mut song = Song::default();
        load_mp(&mut song, &mut ByteReader::new(&data, 0), &LoadOptions::default()).unwrap();
        assert_eq!(song.restart, 1);
    }

    #[test]
    fn loads_as_four_channel_mod() {
        let data = mp_file();
        let mut song = Song::default();
        load_mp(&mut song, &mut ByteReader::new(&data, 0), &LoadOptions::default()).unwrap();

        assert_eq!(song.num_channels(), 4);
        assert_eq!(song.patterns.len(), 1);
        assert_eq!(song.order, [OrderEntry::Pattern(0), OrderEntry::Pattern(0)]);
        assert_eq!(song.restart, 0);
        assert_eq!(song.instruments[0].fadeout, 0xfff);
        assert_eq!(song.samples[0].loop_type, LoopType::Full);
        assert_eq!(song.samples[0].data, SampleData::Mono8(vec![1, 2, 3, 4, 5, 6, 7, 8]));

        let ev = song.event(0, 0, 0).unwrap();
        assert_eq!(ev.note, Note::On(60));
        assert_eq!(ev.instrument, 1);
        assert_eq!(ev.effect, Effect::SetVolume(0x30));
    }
}
