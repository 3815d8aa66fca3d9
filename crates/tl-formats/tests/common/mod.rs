//! Byte-level builders for synthetic modules.
//!
//! Each builder writes the smallest file its decoder accepts that still
//! carries a pattern event, an instrument and (where the format has one)
//! sample data, so tests can check every layer of the decoded song.

#![allow(dead_code)]

/// Little helper for assembling binary files.
#[derive(Default)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.0.push(v);
        self
    }

    pub fn u16_be(&mut self, v: u16) -> &mut Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u16_le(&mut self, v: u16) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32_be(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u32_le(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.0.extend_from_slice(v);
        self
    }

    pub fn zeros(&mut self, n: usize) -> &mut Self {
        self.0.resize(self.0.len() + n, 0);
        self
    }

    /// `text` NUL-padded (or cut) to `n` bytes.
    pub fn text(&mut self, text: &str, n: usize) -> &mut Self {
        let mut field = text.as_bytes().to_vec();
        field.resize(n, 0);
        self.bytes(&field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.0)
    }
}

pub fn chunk_be(id: &[u8], body: &[u8]) -> Vec<u8> {
    let mut out = id.to_vec();
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
    out
}

pub fn chunk_le(id: &[u8], body: &[u8]) -> Vec<u8> {
    let mut out = id.to_vec();
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    out
}

/// Eight bytes of PCM shared by the sampled formats.
pub const PCM: [u8; 8] = [0x00, 0x10, 0x20, 0x30, 0x40, 0x30, 0x20, 0x10];

/// ProTracker cell: period 428 (`On(60)`), instrument 1, set volume 0x30.
pub const PT_CELL: [u8; 4] = [0x01, 0xAC, 0x1C, 0x30];

/// 4-channel `M.K.` module, one pattern, one 8-byte sample.
pub fn mod_file() -> Vec<u8> {
    let mut b = Bytes::new();
    b.text("synthetic", 20);
    // Sample 1: 4 words, volume 64, no loop
    b.text("kick", 22).u16_be(4).u8(0).u8(64).u16_be(0).u16_be(1);
    for _ in 1..31 {
        b.zeros(30);
    }
    b.u8(1).u8(0x7f);
    b.zeros(128);
    b.bytes(b"M.K.");
    let mut pattern = vec![0u8; 1024];
    pattern[..4].copy_from_slice(&PT_CELL);
    b.bytes(&pattern);
    b.bytes(&PCM);
    b.finish()
}

/// Module Protector (`TRK1`) version of [`mod_file`].
pub fn mp_file() -> Vec<u8> {
    let mut b = Bytes::new();
    b.bytes(b"TRK1");
    b.u16_be(4).u8(0).u8(64).u16_be(0).u16_be(1);
    b.zeros(30 * 8);
    b.u8(1).u8(0x7f);
    b.zeros(128);
    let mut pattern = vec![0u8; 1024];
    pattern[..4].copy_from_slice(&PT_CELL);
    b.bytes(&pattern);
    b.bytes(&PCM);
    b.finish()
}

/// Amusic module: `len` orders over `last_pattern + 1` patterns that all
/// play track 0. Track 0 has one event on row 0.
pub fn amd_file(len: u8, last_pattern: u8) -> Vec<u8> {
    let mut b = Bytes::new();
    b.text("amd song", 24).text("someone", 24);
    for i in 0..26u8 {
        b.text(&format!("ins{i}"), 23);
        b.bytes(&[i, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    }
    b.u8(len).u8(last_pattern);
    let mut order = [0u8; 128];
    for (i, o) in order.iter_mut().take(len as usize).enumerate() {
        *o = (i as u8).min(last_pattern);
    }
    b.bytes(&order);
    assert_eq!(b.len(), 1062);
    b.bytes(b"<o\xefQU\xeeRoR");
    b.u8(0x10);

    for _ in 0..=last_pattern {
        for _ in 0..9 {
            b.u16_le(0);
        }
    }
    // One stored track
    b.u16_le(1);
    b.u16_le(0);
    // Param 5, instrument 0x11, tempo command, note 2 octave 1
    b.u8(0x05).u8(0x17).u8(0x23);
    b.u8(0x80 | 63);
    b.finish()
}

/// Quadra Composer module: one instrument, one pattern stored with ID 5.
pub fn emod_file() -> Vec<u8> {
    let mut emic = Bytes::new();
    emic.u16_be(1).text("emod song", 20).text("composer", 20).u8(125).u8(1);
    emic.u8(1).u8(0x40).u16_be(4).text("bass", 20).u8(0).u8(0).u16_be(0).u16_be(0).u32_be(0);
    emic.u8(0).u8(1);
    emic.u8(5).u8(63).zeros(20).u32_be(0);
    emic.u8(1).u8(5);

    // Empty cells carry note byte 0xff
    let mut patt = [0u8, 0xff, 0, 0].repeat(64 * 4);
    // Instrument 1, note 24, sample offset
    patt[..4].copy_from_slice(&[0x01, 24, 0x09, 0x10]);

    let mut body = b"EMOD".to_vec();
    body.extend(chunk_be(b"EMIC", &emic.finish()));
    body.extend(chunk_be(b"PATT", &patt));
    body.extend(chunk_be(b"8SMP", &PCM));
    chunk_be(b"FORM", &body)
}

/// Galaxy Music System module: 4 channels, one pattern, one instrument
/// with one 8-byte sample.
pub fn gal4_file() -> Vec<u8> {
    let mut main = Bytes::new();
    main.text("gal4 song", 64).u8(0).u8(4).u8(6).u8(125);

    let mut ordr = Bytes::new();
    ordr.u8(1).u8(0);

    let mut patt = Bytes::new();
    patt.u8(0).u32_le(0).u8(63);
    // Row 0, channel 1: instrument 1, note 61
    patt.u8(0x40 | 0x01).u8(1).u8(61).u8(0);
    patt.zeros(63);

    let mut inst = Bytes::new();
    inst.u8(0).u8(0).text("piano", 28).u8(1);
    inst.zeros(12).zeros(96).zeros(11);
    inst.zeros(7); // auto-vibrato
    inst.zeros(5).zeros(60).zeros(2); // envelopes
    inst.bytes(b"SAMP").u32_le(0);
    inst.text("piano-c", 28).u8(0).u8(0x30).u8(0).u8(0);
    inst.u32_le(8).u32_le(0).u32_le(0).u32_le(8363).zeros(8);
    inst.bytes(&PCM);

    let mut body = b"AMFF".to_vec();
    body.extend(chunk_le(b"MAIN", &main.finish()));
    body.extend(chunk_le(b"ORDR", &ordr.finish()));
    body.extend(chunk_le(b"PATT", &patt.finish()));
    body.extend(chunk_le(b"INST", &inst.finish()));
    chunk_le(b"RIFF", &body)
}

/// Digitrakker 1.1 module: 4 channels, one pattern playing track 1 on
/// channel 0, one instrument numbered 1 using sample number 1.
pub fn mdl_file() -> Vec<u8> {
    let mut info = Bytes::new();
    info.text("mdl song", 32).text("tracker", 20);
    info.u16_le(1).u16_le(0).u8(0xff).u8(6).u8(125);
    let mut pans = [0u8; 32];
    pans[..4].fill(0x20);
    pans[4] = 0x80;
    info.bytes(&pans);
    info.u8(0);

    let mut pa = Bytes::new();
    pa.u8(1).u8(4).u8(63).zeros(16);
    pa.u16_le(1).u16_le(0).u16_le(0).u16_le(0);

    let mut tr = Bytes::new();
    tr.u16_le(1);
    // Note 49, instrument 1 on row 0
    tr.u16_le(3).u8(0x03 | 0x04 | 0x08).u8(49).u8(1);

    let mut ii = Bytes::new();
    ii.u8(1).u8(1).u8(1).text("strings", 32);
    ii.u8(1).u8(107).u8(0x40).u8(0x40).u8(0x40).u8(0x40);
    ii.u16_le(0x100).zeros(4).u8(0).u8(0);

    let mut is = Bytes::new();
    is.u8(1).u8(1).text("strings-c", 32).zeros(8);
    is.u32_le(8363).u32_le(8).u32_le(0).u32_le(0).u8(0x40).u8(0);

    let mut b = Bytes::new();
    b.bytes(b"DMDL").u8(0x11);
    b.bytes(&chunk_le(b"IN", &info.finish()));
    b.bytes(&chunk_le(b"PA", &pa.finish()));
    b.bytes(&chunk_le(b"TR", &tr.finish()));
    b.bytes(&chunk_le(b"II", &ii.finish()));
    b.bytes(&chunk_le(b"IS", &is.finish()));
    b.bytes(&chunk_le(b"SA", &PCM));
    b.finish()
}

/// MED4 module: instrument slot 0 with volume 0x30, one 64-row pattern
/// with a note on channel 0, row 0.
pub fn med4_file() -> Vec<u8> {
    med4_named("lead")
}

/// [`med4_file`] with another instrument name.
pub fn med4_named(name: &str) -> Vec<u8> {
    let mut b = Bytes::new();
    b.bytes(b"MED\x04");
    b.u8(0x80).u8(0x80);
    b.u8(0x4f).u8(name.len() as u8).bytes(name.as_bytes()).u8(0x30);

    b.u16_be(1).u16_be(1).u8(0);
    b.u16_be(6).u8(0).u8(0).u8(0).u8(6);
    b.zeros(20).zeros(16).u8(64);

    // Pattern block: 4 channels, 64 rows, only the first line mask stored
    b.u8(0).u8(4).u8(63).u16_be(0).u8(0x15);
    b.u32_be(0x8000_0000).u8(0xff);
    b.u8(0x80).u8(0xd1);

    b.u32_be(0x4000_0000).u16_be(0).u16_be(0);
    b.u32_be(8).u16_be(0).bytes(&PCM);

    b.u16_be(0);
    b.bytes(&chunk_be(b"MEDV", &0x0210u32.to_be_bytes()));
    b.finish()
}

/// Reality Adlib Tracker module: one instrument, two pattern slots
/// pointing at the same data.
pub fn rad_file() -> Vec<u8> {
    let mut b = Bytes::new();
    b.bytes(b"RAD by REALiTY!!").u8(0x10).u8(0x06);
    b.u8(1).bytes(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10]).u8(0);
    b.u8(2).u8(0).u8(1);

    let offset = (b.len() + 64) as u16;
    b.u16_le(offset).u16_le(offset);
    b.zeros(30 * 2);
    assert_eq!(b.len(), offset as usize);

    // Last row 0, last channel 0: octave 3 note 10, instrument 1
    b.u8(0x80).u8(0x80).u8(0x3a).u8(0x10);
    b.finish()
}
