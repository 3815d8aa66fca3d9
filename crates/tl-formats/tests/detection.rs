//! Format detection over synthetic modules and junk input.

mod common;

use tl_formats::{detect_format, load_module, Format, FormatError};

fn detected(data: &[u8]) -> Option<Format> {
    detect_format(data, 0).map(|d| d.format)
}

#[test]
fn each_builder_is_detected_as_its_format() {
    let cases = [
        (common::mod_file(), Format::Mod),
        (common::mp_file(), Format::Mp),
        (common::amd_file(1, 0), Format::Amd),
        (common::emod_file(), Format::Emod),
        (common::gal4_file(), Format::Gal4),
        (common::mdl_file(), Format::Mdl),
        (common::med4_file(), Format::Med4),
        (common::rad_file(), Format::Rad),
    ];
    for (data, format) in &cases {
        assert_eq!(detected(data), Some(*format), "{}", format.id());
    }
}

#[test]
fn titles_come_from_the_header() {
    let titles = [
        (common::mod_file(), "synthetic"),
        (common::amd_file(1, 0), "amd song"),
        (common::emod_file(), "emod song"),
        (common::gal4_file(), "gal4 song"),
        (common::mdl_file(), "mdl song"),
        (common::rad_file(), ""),
        (common::med4_file(), ""),
    ];
    for (data, title) in &titles {
        assert_eq!(detect_format(data, 0).unwrap().title, *title);
    }
}

#[test]
fn detection_honors_start_offset() {
    let mut data = vec![0xee; 37];
    data.extend(common::mdl_file());
    assert_eq!(detected(&data), None);
    let found = detect_format(&data, 37).unwrap();
    assert_eq!(found.format, Format::Mdl);
    assert_eq!(found.title, "mdl song");
}

/// Deterministic noise, so failures reproduce.
fn noise(len: usize, mut seed: u32) -> Vec<u8> {
    (0..len)
        .map(|_| {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (seed >> 16) as u8
        })
        .collect()
}

#[test]
fn junk_is_rejected_by_every_detector() {
    let inputs = [
        Vec::new(),
        vec![0u8; 3],
        vec![0u8; 4096],
        vec![0xffu8; 4096],
        noise(4096, 1),
        noise(1500, 0xdead_beef),
    ];
    for data in &inputs {
        for format in Format::ALL {
            assert!(
                format.detect(data, 0).is_none(),
                "{} accepted {} junk bytes",
                format.id(),
                data.len()
            );
        }
        assert!(matches!(load_module(data, 0), Err(FormatError::UnrecognizedFormat)));
    }
}

#[test]
fn truncated_modules_fail_without_panicking() {
    let files = [
        common::mod_file(),
        common::mp_file(),
        common::amd_file(2, 1),
        common::emod_file(),
        common::gal4_file(),
        common::mdl_file(),
        common::med4_file(),
        common::rad_file(),
    ];
    for data in &files {
        for cut in [8, 64, data.len() / 2, data.len() - 1] {
            // Any outcome but a panic is fine
            let _ = load_module(&data[..cut], 0);
        }
    }
}

#[test]
fn bad_magic_is_not_detected() {
    let mut data = common::rad_file();
    data[0] = b'r';
    assert_eq!(detected(&data), None);

    let mut data = common::emod_file();
    data[8..12].copy_from_slice(b"8SVX");
    assert_eq!(detected(&data), None);

    // MOD sample header with volume over 64
    let mut data = common::mod_file();
    data[20 + 25] = 0x41;
    assert_eq!(detected(&data), None);
}
