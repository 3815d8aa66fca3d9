//! Bitstream sample decompression (Digitrakker pack methods 1 and 2).
//!
//! Each output byte is a delta coded as a sign bit followed by either a
//! short 3-bit magnitude or a unary-prefixed long magnitude:
//!
//! ```text
//! xxx1s        byte = xxx
//! xxxx10..0s   byte = xxxx + 8 + 16 * (number of 0 bits)
//! ```
//!
//! A set sign bit inverts the byte, and long runs wrap around 256.
//! Deltas accumulate into the output. Bits are taken LSB first from a
//! 32-bit little-endian register; input that runs out reads as zero bits
//! and ends any zero run.

use alloc::vec::Vec;
use tl_ir::AllocError;
use tracing::warn;

use crate::FormatError;

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    buf: u32,
    bits: u32,
    /// Set once a read ran past the input
    starved: bool,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        let mut br = Self {
            data,
            pos: 0,
            buf: 0,
            bits: 0,
            starved: false,
        };
        br.refill();
        br
    }

    fn refill(&mut self) {
        while self.bits <= 24 && self.pos < self.data.len() {
            self.buf |= (self.data[self.pos] as u32) << self.bits;
            self.pos += 1;
            self.bits += 8;
        }
    }

    /// Read `amount` bits (1..=8), LSB first. Exhausted input reads as zeros.
    fn read_bits(&mut self, amount: u32) -> u32 {
        if self.bits < amount {
            self.starved = true;
        }
        let val = self.buf & ((1 << amount) - 1);
        self.buf >>= amount;
        self.bits = self.bits.saturating_sub(amount);
        self.refill();
        val
    }

    /// Decode one delta byte.
    fn read_delta(&mut self) -> u8 {
        let sign = self.read_bits(1);
        let mut b = if self.read_bits(1) != 0 {
            self.read_bits(3) as u8
        } else {
            let mut b: u8 = 8;
            while self.read_bits(1) == 0 && !self.starved {
                b = b.wrapping_add(16);
            }
            b.wrapping_add(self.read_bits(4) as u8)
        };
        if sign != 0 {
            b ^= 0xff;
        }
        b
    }
}

fn reserve<T>(frames: usize) -> Result<Vec<T>, FormatError> {
    let mut out = Vec::new();
    out.try_reserve_exact(frames).map_err(|_| AllocError(frames))?;
    Ok(out)
}

/// Unpack `frames` 8-bit samples.
pub fn unpack_sample8(packed: &[u8], frames: usize) -> Result<Vec<i8>, FormatError> {
    let mut br = BitReader::new(packed);
    let mut out = reserve(frames)?;
    let mut d: u8 = 0;
    for _ in 0..frames {
        d = d.wrapping_add(br.read_delta());
        out.push(d as i8);
    }
    if br.starved {
        warn!(frames, packed = packed.len(), "packed sample data ends early");
    }
    Ok(out)
}

/// Unpack `frames` 16-bit samples: a literal low byte, then a delta-coded
/// high byte.
pub fn unpack_sample16(packed: &[u8], frames: usize) -> Result<Vec<i16>, FormatError> {
    let mut br = BitReader::new(packed);
    let mut out = reserve(frames)?;
    let mut d: u8 = 0;
    for _ in 0..frames {
        let lo = br.read_bits(8) as u8;
        d = d.wrapping_add(br.read_delta());
        out.push(i16::from_le_bytes([lo, d]));
    }
    if br.starved {
        warn!(frames, packed = packed.len(), "packed sample data ends early");
    }
    Ok(out)
}
