#![allow(dead_code)]

use std::path::Path;

use ndarray::Array2;

use argus_core::frame::{CardValue, FitsHeader, FitsImage};
use argus_core::io::save_fits;

/// Add a Gaussian spot to an image (in-place).
pub fn add_spot(data: &mut Array2<f32>, cx: f64, cy: f64, sigma: f64, amplitude: f32) {
    let (h, w) = data.dim();
    let radius = (sigma * 4.0).ceil() as i64;
    let (icx, icy) = (cx.round() as i64, cy.round() as i64);
    for dr in -radius..=radius {
        for dc in -radius..=radius {
            let r = icy + dr;
            let c = icx + dc;
            if r < 0 || r >= h as i64 || c < 0 || c >= w as i64 {
                continue;
            }
            let dy = r as f64 - cy;
            let dx = c as f64 - cx;
            let value = amplitude as f64 * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
            data[[r as usize, c as usize]] += value as f32;
        }
    }
}

/// Uniform background plus Gaussian stars at the given (x, y, amplitude)
/// positions.
pub fn star_field(h: usize, w: usize, stars: &[(f64, f64, f32)], background: f32) -> Array2<f32> {
    let mut data = Array2::from_elem((h, w), background);
    for &(x, y, amplitude) in stars {
        add_spot(&mut data, x, y, 1.2, amplitude);
    }
    data
}

/// A deterministic spread of star positions with a margin from the edges.
pub fn scattered_stars(h: usize, w: usize, count: usize, margin: f64) -> Vec<(f64, f64, f32)> {
    let mut stars = Vec::with_capacity(count);
    let mut state = 0x12345678u64;
    for i in 0..count {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let fx = ((state >> 16) % 10_000) as f64 / 10_000.0;
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let fy = ((state >> 16) % 10_000) as f64 / 10_000.0;
        let x = margin + fx * (w as f64 - 2.0 * margin);
        let y = margin + fy * (h as f64 - 2.0 * margin);
        stars.push((x, y, 8.0 + (i % 7) as f32));
    }
    stars
}

/// TAN WCS header: reference coordinate, reference pixel (1-based), square
/// pixel scale in degrees, optional rotation.
pub fn tan_wcs_header(
    crval1: f64,
    crval2: f64,
    crpix1: f64,
    crpix2: f64,
    scale_deg: f64,
    rotation_deg: f64,
) -> FitsHeader {
    let mut header = FitsHeader::new();
    let rot = rotation_deg.to_radians();
    let (s, c) = rot.sin_cos();
    header.set("CRVAL1", CardValue::Real(crval1));
    header.set("CRVAL2", CardValue::Real(crval2));
    header.set("CRPIX1", CardValue::Real(crpix1));
    header.set("CRPIX2", CardValue::Real(crpix2));
    header.set("CD1_1", CardValue::Real(scale_deg * c));
    header.set("CD1_2", CardValue::Real(-scale_deg * s));
    header.set("CD2_1", CardValue::Real(scale_deg * s));
    header.set("CD2_2", CardValue::Real(scale_deg * c));
    header.set("CTYPE1", CardValue::Text("RA---TAN".into()));
    header.set("CTYPE2", CardValue::Text("DEC--TAN".into()));
    header
}

/// Save an image to a file, panicking on failure.
pub fn write_image(path: &Path, image: &FitsImage) {
    save_fits(image, path).expect("write test FITS");
}

/// Build raw FITS bytes by hand: header cards then big-endian data. Used to
/// exercise reader paths the writer never produces (3D cubes, integer
/// BITPIX, scaling).
pub fn build_raw_fits(cards: &[String], data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    for card in cards {
        let mut bytes = card.clone().into_bytes();
        assert!(bytes.len() <= 80, "card too long: {card}");
        bytes.resize(80, b' ');
        buf.extend_from_slice(&bytes);
    }
    let mut end = b"END".to_vec();
    end.resize(80, b' ');
    buf.extend_from_slice(&end);
    while buf.len() % 2880 != 0 {
        buf.push(b' ');
    }
    buf.extend_from_slice(data);
    while buf.len() % 2880 != 0 {
        buf.push(0);
    }
    buf
}

/// Fixed-format card helper for `build_raw_fits`.
pub fn card(keyword: &str, value: &str) -> String {
    format!("{keyword:<8}= {value:>20}")
}
