//! Bounds-checked cursor over module bytes.
//!
//! Positions are relative to a base offset so a module embedded in a
//! larger buffer decodes exactly like a standalone file. The reader also
//! implements `Read + Seek` (base-relative) so fixed headers can be
//! decoded with `binrw` derives.

use std::io::{self, Read, Seek, SeekFrom};

use tl_ir::AllocError;
use tracing::warn;

use crate::FormatError;

/// Cursor over `data[start..]`.
#[derive(Clone, Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    start: usize,
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8], start: usize) -> Self {
        let start = start.min(data.len());
        Self {
            data,
            start,
            pos: start,
        }
    }

    /// Size of the source from the base offset.
    pub fn len(&self) -> usize {
        self.data.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current position, relative to the base offset.
    pub fn position(&self) -> usize {
        self.pos - self.start
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Seek to `pos` relative to the base offset. Seeking to the very end
    /// is allowed.
    pub fn seek_to(&mut self, pos: usize) -> Result<(), FormatError> {
        if pos > self.len() {
            return Err(FormatError::Truncated);
        }
        self.pos = self.start + pos;
        Ok(())
    }

    /// Seek to an absolute offset in the underlying buffer.
    pub fn seek_absolute(&mut self, offset: usize) -> Result<(), FormatError> {
        if offset < self.start || offset > self.data.len() {
            return Err(FormatError::Truncated);
        }
        self.pos = offset;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<(), FormatError> {
        if n > self.remaining() {
            return Err(FormatError::Truncated);
        }
        self.pos += n;
        Ok(())
    }

    /// Move back `n` bytes.
    pub fn rewind(&mut self, n: usize) -> Result<(), FormatError> {
        let pos = self.position().checked_sub(n).ok_or(FormatError::Truncated)?;
        self.seek_to(pos)
    }

    /// Look at the next `n` bytes without consuming them.
    pub fn peek_bytes(&self, n: usize) -> Result<&'a [u8], FormatError> {
        if n > self.remaining() {
            return Err(FormatError::Truncated);
        }
        Ok(&self.data[self.pos..self.pos + n])
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        let bytes = self.peek_bytes(n)?;
        self.pos += n;
        Ok(bytes)
    }

    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<(), FormatError> {
        buf.copy_from_slice(self.read_bytes(buf.len())?);
        Ok(())
    }

    /// Read a fixed-size tag such as a magic number.
    pub fn read_magic<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let mut tag = [0u8; N];
        self.read_into(&mut tag)?;
        Ok(tag)
    }

    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, FormatError> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16_be(&mut self) -> Result<u16, FormatError> {
        Ok(u16::from_be_bytes(self.read_magic()?))
    }

    pub fn read_u16_le(&mut self) -> Result<u16, FormatError> {
        Ok(u16::from_le_bytes(self.read_magic()?))
    }

    pub fn read_i16_be(&mut self) -> Result<i16, FormatError> {
        Ok(self.read_u16_be()? as i16)
    }

    pub fn read_u32_be(&mut self) -> Result<u32, FormatError> {
        Ok(u32::from_be_bytes(self.read_magic()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, FormatError> {
        Ok(u32::from_le_bytes(self.read_magic()?))
    }

    /// Read an `n`-byte text field.
    pub fn read_string(&mut self, n: usize) -> Result<String, FormatError> {
        Ok(parse_string(self.read_bytes(n)?))
    }

    /// Read NUL-terminated text, consuming the terminator.
    pub fn read_cstring(&mut self) -> Result<String, FormatError> {
        let rest = &self.data[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(FormatError::Truncated)?;
        let text = parse_string(&rest[..end]);
        self.pos += end + 1;
        Ok(text)
    }

    /// Read `frames` of signed 8-bit PCM.
    ///
    /// Data cut short by the end of the file is zero-filled.
    pub fn read_pcm8(&mut self, frames: usize) -> Result<Vec<i8>, FormatError> {
        let avail = frames.min(self.remaining());
        let mut out = alloc_frames::<i8>(frames)?;
        out.extend(self.data[self.pos..self.pos + avail].iter().map(|&b| b as i8));
        self.pos += avail;
        if avail < frames {
            warn!(frames, avail, "sample data truncated, zero-filling");
            out.resize(frames, 0);
        }
        Ok(out)
    }

    /// Read `frames` of signed 16-bit little-endian PCM.
    pub fn read_pcm16_le(&mut self, frames: usize) -> Result<Vec<i16>, FormatError> {
        let avail = frames.min(self.remaining() / 2);
        let mut out = alloc_frames::<i16>(frames)?;
        out.extend(
            self.data[self.pos..self.pos + avail * 2]
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]])),
        );
        self.pos += avail * 2;
        if avail < frames {
            warn!(frames, avail, "sample data truncated, zero-filling");
            self.pos = self.data.len();
            out.resize(frames, 0);
        }
        Ok(out)
    }
}

fn alloc_frames<T>(frames: usize) -> Result<Vec<T>, FormatError> {
    let mut out = Vec::new();
    out.try_reserve_exact(frames).map_err(|_| AllocError(frames))?;
    Ok(out)
}

/// Decode a fixed-width text field: stop at NUL, replace unprintable
/// bytes with '.', trim trailing blanks.
pub(crate) fn parse_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    data[..end]
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect::<String>()
        .trim_end()
        .to_string()
}

impl Read for ByteReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Seek for ByteReader<'_> {
    fn seek(&mut self, from: SeekFrom) -> io::Result<u64> {
        let target = match from {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::End(d) => self.len() as i128 + d as i128,
            SeekFrom::Current(d) => self.position() as i128 + d as i128,
        };
        if target < 0 || target > self.len() as i128 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "seek outside module data",
            ));
        }
        self.pos = self.start + target as usize;
        Ok(target as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::BinRead;

    #[derive(BinRead, Debug)]
    #[br(big)]
    struct Header {
        magic: [u8; 4],
        size: u32,
        version: u16,
    }

    #[test]
    fn reads_both_endians() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc];
        let mut r = ByteReader::new(&data, 0);
        assert_eq!(r.read_u16_be().unwrap(), 0x1234);
        assert_eq!(r.read_u16_le().unwrap(), 0x7856);
        assert_eq!(r.position(), 4);
        r.seek_to(0).unwrap();
        assert_eq!(r.read_u32_le().unwrap(), 0x7856_3412);
        assert_eq!(r.read_i16_be().unwrap(), -25924);
        assert!(r.is_eof());
    }

    #[test]
    fn positions_are_relative_to_base() {
        let data = b"junkMAGIC";
        let mut r = ByteReader::new(data, 4);
        assert_eq!(r.len(), 5);
        assert_eq!(&r.read_magic::<5>().unwrap(), b"MAGIC");
        r.seek_to(1).unwrap();
        assert_eq!(r.read_u8().unwrap(), b'A');
        assert!(r.seek_absolute(2).is_err());
        r.seek_absolute(4).unwrap();
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn reads_past_end_are_truncated() {
        let mut r = ByteReader::new(&[1, 2, 3], 0);
        assert!(matches!(r.read_u32_be(), Err(FormatError::Truncated)));
        // Failed read leaves the cursor alone
        assert_eq!(r.position(), 0);
        assert!(matches!(r.skip(4), Err(FormatError::Truncated)));
        assert!(matches!(r.seek_to(4), Err(FormatError::Truncated)));
        r.seek_to(3).unwrap();
        assert!(r.is_eof());
        assert!(matches!(r.rewind(4), Err(FormatError::Truncated)));
    }

    #[test]
    fn text_fields_are_cleaned() {
        let mut r = ByteReader::new(b"Hi\x01there  \0xxNUL\0", 0);
        assert_eq!(r.read_string(14).unwrap(), "Hi.there");
        assert_eq!(r.read_cstring().unwrap(), "NUL");
        assert!(r.is_eof());
    }

    #[test]
    fn short_pcm_is_zero_filled() {
        let mut r = ByteReader::new(&[0x7f, 0x80], 0);
        assert_eq!(r.read_pcm8(4).unwrap(), [127, -128, 0, 0]);

        let mut r = ByteReader::new(&[0x01, 0x80, 0xff], 0);
        assert_eq!(r.read_pcm16_le(2).unwrap(), [-32767, 0]);
        assert!(r.is_eof());
    }

    #[test]
    fn binrw_headers_read_through_reader() {
        let mut data = b"xxFORM".to_vec();
        data.extend_from_slice(&16u32.to_be_bytes());
        data.extend_from_slice(&2u16.to_be_bytes());
        let mut r = ByteReader::new(&data, 2);
        let header = Header::read(&mut r).unwrap();
        assert_eq!(&header.magic, b"FORM");
        assert_eq!(header.size, 16);
        assert_eq!(header.version, 2);
        assert_eq!(r.position(), 10);
    }

    #[test]
    fn binrw_eof_maps_to_truncated() {
        let mut r = ByteReader::new(b"FORM\0\0", 0);
        let err: FormatError = Header::read(&mut r).unwrap_err().into();
        assert!(matches!(err, FormatError::Truncated));
    }
}
