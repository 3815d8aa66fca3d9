//! Generic IFF-style chunk walker.
//!
//! A decoder registers one handler per chunk ID, then runs the parser over
//! the chunk sequence. Handlers get the decoder's context object, a reader
//! positioned at the chunk body and the declared body size. Whatever a
//! handler consumes, the parser resumes at the next chunk boundary.

use tracing::trace;

use crate::reader::ByteReader;
use crate::FormatError;

/// Byte order of chunk size fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

/// Chunk framing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Width of chunk IDs (2 or 4)
    pub id_size: usize,
    /// Byte order of the 32-bit size field
    pub endian: Endian,
    /// Compare only the first 4 characters of IDs
    pub truncate_ids: bool,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            id_size: 4,
            endian: Endian::Big,
            truncate_ids: false,
        }
    }
}

/// Chunk body decoder: context, reader at body start, declared size.
pub type ChunkHandler<C> = fn(&mut C, &mut ByteReader<'_>, u32) -> Result<(), FormatError>;

pub struct ChunkParser<C> {
    config: ChunkConfig,
    handlers: Vec<(Vec<u8>, ChunkHandler<C>)>,
}

impl<C> ChunkParser<C> {
    pub fn new(config: ChunkConfig) -> Self {
        Self {
            config,
            handlers: Vec::new(),
        }
    }

    /// Register `handler` for chunk `id`, replacing any earlier one.
    pub fn register(&mut self, id: &str, handler: ChunkHandler<C>) {
        let id = id.as_bytes().to_vec();
        match self.handlers.iter_mut().find(|(known, _)| *known == id) {
            Some(entry) => entry.1 = handler,
            None => self.handlers.push((id, handler)),
        }
    }

    fn compare_len(&self) -> usize {
        if self.config.truncate_ids {
            self.config.id_size.min(4)
        } else {
            self.config.id_size
        }
    }

    fn handler_for(&self, id: &[u8]) -> Option<ChunkHandler<C>> {
        let n = self.compare_len();
        self.handlers
            .iter()
            .find(|(known, _)| known.len() >= n && id.len() >= n && known[..n] == id[..n])
            .map(|(_, h)| *h)
    }

    /// Walk chunks until the data runs out.
    ///
    /// A chunk ID or size cut short by the end of the data, or a chunk
    /// body running past it, ends the walk. Handler errors propagate.
    pub fn parse(&self, r: &mut ByteReader<'_>, ctx: &mut C) -> Result<(), FormatError> {
        loop {
            if r.remaining() < self.config.id_size + 4 {
                return Ok(());
            }
            let id = r.read_bytes(self.config.id_size)?;
            let size = match self.config.endian {
                Endian::Big => r.read_u32_be()?,
                Endian::Little => r.read_u32_le()?,
            };
            let body = r.position();
            trace!(
                id = %String::from_utf8_lossy(id),
                size,
                offset = body,
                "chunk"
            );

            if let Some(handler) = self.handler_for(id) {
                handler(ctx, r, size)?;
            }

            let next = body.saturating_add(size as usize);
            if next >= r.len() {
                return Ok(());
            }
            r.seek_to(next)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Seen {
        ids: Vec<String>,
        bytes: Vec<u8>,
    }

    fn chunk_be(id: &[u8], body: &[u8]) -> Vec<u8> {
        let mut v = id.to_vec();
        v.extend_from_slice(&(body.len() as u32).to_be_bytes());
        v.extend_from_slice(body);
        v
    }

    fn on_aaaa(ctx: &mut Seen, r: &mut ByteReader<'_>, _size: u32) -> Result<(), FormatError> {
        ctx.ids.push("AAAA".into());
        // Read only part of the body
        ctx.bytes.push(r.read_u8()?);
        Ok(())
    }

    fn on_cccc(ctx: &mut Seen, r: &mut ByteReader<'_>, size: u32) -> Result<(), FormatError> {
        ctx.ids.push("CCCC".into());
        ctx.bytes.extend_from_slice(r.read_bytes(size as usize)?);
        Ok(())
    }

    fn failing(_: &mut Seen, _: &mut ByteReader<'_>, _: u32) -> Result<(), FormatError> {
        Err(FormatError::MalformedHeader("bad chunk"))
    }

    #[test]
    fn unknown_chunk_is_skipped() {
        let mut data = chunk_be(b"AAAA", &[1, 2, 3]);
        data.extend(chunk_be(b"BBBB", &[0xee; 7]));
        data.extend(chunk_be(b"CCCC", &[4, 5]));

        let mut parser = ChunkParser::new(ChunkConfig::default());
        parser.register("AAAA", on_aaaa);
        parser.register("CCCC", on_cccc);

        let mut seen = Seen::default();
        parser.parse(&mut ByteReader::new(&data, 0), &mut seen).unwrap();
        assert_eq!(seen.ids, ["AAAA", "CCCC"]);
        assert_eq!(seen.bytes, [1, 4, 5]);
    }

    #[test]
    fn little_endian_two_byte_ids() {
        let mut data = b"CC".to_vec();
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&[9, 8]);
        data.extend_from_slice(b"ZZ");
        data.extend_from_slice(&1u32.to_le_bytes());
        data.push(7);

        let mut parser = ChunkParser::new(ChunkConfig {
            id_size: 2,
            endian: Endian::Little,
            truncate_ids: false,
        });
        parser.register("CC", on_cccc);

        let mut seen = Seen::default();
        parser.parse(&mut ByteReader::new(&data, 0), &mut seen).unwrap();
        assert_eq!(seen.bytes, [9, 8]);
    }

    #[test]
    fn truncated_ids_match_on_prefix() {
        let data = chunk_be(b"CCCC", &[1]);
        let mut parser = ChunkParser::new(ChunkConfig {
            truncate_ids: true,
            ..ChunkConfig::default()
        });
        parser.register("CCCCXX", on_cccc);

        let mut seen = Seen::default();
        parser.parse(&mut ByteReader::new(&data, 0), &mut seen).unwrap();
        assert_eq!(seen.ids, ["CCCC"]);
    }

    #[test]
    fn oversized_chunk_ends_walk() {
        let mut data = b"CCCC".to_vec();
        data.extend_from_slice(&100u32.to_be_bytes());
        data.extend_from_slice(&[1, 2]);

        let mut parser = ChunkParser::new(ChunkConfig::default());
        parser.register("AAAA", on_aaaa);
        let mut seen = Seen::default();
        parser.parse(&mut ByteReader::new(&data, 0), &mut seen).unwrap();
        assert!(seen.ids.is_empty());
    }

    #[test]
    fn handler_error_propagates() {
        let data = chunk_be(b"AAAA", &[1]);
        let mut parser = ChunkParser::new(ChunkConfig::default());
        parser.register("AAAA", failing);
        let mut seen = Seen::default();
        assert!(parser.parse(&mut ByteReader::new(&data, 0), &mut seen).is_err());
    }
}
