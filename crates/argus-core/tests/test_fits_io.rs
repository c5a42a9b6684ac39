mod common;

use byteorder::{BigEndian, ByteOrder};
use ndarray::Array2;
use tempfile::tempdir;

use argus_core::error::ArgusError;
use argus_core::frame::{CardValue, FitsHeader, FitsImage};
use argus_core::io::{load_fits, read_header, save_fits};

use common::{build_raw_fits, card};

fn ramp(h: usize, w: usize) -> Array2<f32> {
    Array2::from_shape_fn((h, w), |(r, c)| (r * w + c) as f32 * 0.5 - 10.0)
}

#[test]
fn test_round_trip_preserves_pixels_exactly() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("roundtrip.fits");

    let mut header = FitsHeader::new();
    header.set("EXPTIME", CardValue::Real(60.0));
    header.set("TELESCOP", CardValue::Text("GY5".into()));
    header.set("CRVAL1", CardValue::Real(183.25));
    let image = FitsImage::new(ramp(16, 24), header);

    save_fits(&image, &path).unwrap();
    let loaded = load_fits(&path).unwrap();

    assert_eq!(loaded.data.dim(), (16, 24));
    for (a, b) in loaded.data.iter().zip(image.data.iter()) {
        assert_eq!(a, b, "pixel data must round-trip bit-exactly");
    }
    assert_eq!(loaded.header.get_f64("EXPTIME"), Some(60.0));
    assert_eq!(loaded.header.get_str("TELESCOP"), Some("GY5"));
    assert_eq!(loaded.header.get_f64("CRVAL1"), Some(183.25));
}

#[test]
fn test_history_accumulates_across_saves() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("history.fits");

    let mut image = FitsImage::from_data(ramp(4, 4));
    image.header.push_history("Noise cleaned (outlier)");
    save_fits(&image, &path).unwrap();

    let mut reloaded = load_fits(&path).unwrap();
    assert_eq!(reloaded.header.history().len(), 1);
    reloaded.header.push_history("Aligned to template using wcs method");
    save_fits(&reloaded, &path).unwrap();

    let twice = load_fits(&path).unwrap();
    assert_eq!(twice.header.history().len(), 2);
    for (a, b) in twice.data.iter().zip(image.data.iter()) {
        assert_eq!(a, b);
    }
}

#[test]
fn test_cube_reduces_to_first_plane() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cube.fits");

    // 3x2x2 cube of f32; the first plane is [1, 2, 3, 4].
    let values: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0, 9.0, 9.0, 9.0, 9.0, 7.0, 7.0, 7.0, 7.0];
    let mut data = vec![0u8; values.len() * 4];
    for (i, v) in values.iter().enumerate() {
        BigEndian::write_f32(&mut data[i * 4..], *v);
    }
    let cards = vec![
        card("SIMPLE", "T"),
        card("BITPIX", "-32"),
        card("NAXIS", "3"),
        card("NAXIS1", "2"),
        card("NAXIS2", "2"),
        card("NAXIS3", "3"),
    ];
    std::fs::write(&path, build_raw_fits(&cards, &data)).unwrap();

    let image = load_fits(&path).unwrap();
    assert_eq!(image.data.dim(), (2, 2));
    assert_eq!(image.data[[0, 0]], 1.0);
    assert_eq!(image.data[[0, 1]], 2.0);
    assert_eq!(image.data[[1, 0]], 3.0);
    assert_eq!(image.data[[1, 1]], 4.0);
}

#[test]
fn test_int16_with_scaling() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("int16.fits");

    // Raw i16 values 0..6 with BZERO 100, BSCALE 2.
    let raw: Vec<i16> = (0..6).collect();
    let mut data = vec![0u8; raw.len() * 2];
    for (i, v) in raw.iter().enumerate() {
        BigEndian::write_i16(&mut data[i * 2..], *v);
    }
    let cards = vec![
        card("SIMPLE", "T"),
        card("BITPIX", "16"),
        card("NAXIS", "2"),
        card("NAXIS1", "3"),
        card("NAXIS2", "2"),
        card("BSCALE", "2.0"),
        card("BZERO", "100.0"),
    ];
    std::fs::write(&path, build_raw_fits(&cards, &data)).unwrap();

    let image = load_fits(&path).unwrap();
    assert_eq!(image.data[[0, 0]], 100.0);
    assert_eq!(image.data[[1, 2]], 110.0);
    // Scaling keys are consumed, not re-exported.
    assert!(!image.header.contains("BSCALE"));
}

#[test]
fn test_missing_file_is_input_missing() {
    let dir = tempdir().unwrap();
    let err = load_fits(&dir.path().join("nope.fits")).unwrap_err();
    assert!(matches!(err, ArgusError::InputMissing(_)));
}

#[test]
fn test_garbage_file_is_invalid() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("garbage.fits");
    std::fs::write(&path, vec![0x42u8; 5000]).unwrap();
    let err = load_fits(&path).unwrap_err();
    assert!(matches!(err, ArgusError::InvalidFits(_)));
}

#[test]
fn test_truncated_data_is_invalid() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("truncated.fits");
    let cards = vec![
        card("SIMPLE", "T"),
        card("BITPIX", "-32"),
        card("NAXIS", "2"),
        card("NAXIS1", "100"),
        card("NAXIS2", "100"),
    ];
    // Header only; the promised 40000 data bytes are absent.
    let mut bytes = build_raw_fits(&cards, &[]);
    bytes.truncate(2880);
    std::fs::write(&path, bytes).unwrap();

    let err = load_fits(&path).unwrap_err();
    assert!(matches!(err, ArgusError::InvalidFits(_)));
}

#[test]
fn test_read_header_only() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("header.fits");

    let mut image = FitsImage::from_data(ramp(8, 8));
    image.header.set("CRVAL1", CardValue::Real(10.0));
    image.header.set("CRVAL2", CardValue::Real(20.0));
    save_fits(&image, &path).unwrap();

    let header = read_header(&path).unwrap();
    assert!(header.has_celestial_wcs());
    assert_eq!(header.get_f64("CRVAL2"), Some(20.0));
}
