//! Per-candidate cutout products: reference / aligned / detection crops,
//! optional blink animation, optional shape-visualization frames.

use std::fs::File;
use std::path::{Path, PathBuf};

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, GrayImage, Rgb, RgbImage, RgbaImage};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::consts::{ANIMATION_FRAME_MS, DEFAULT_CUTOUT_SIZE};
use crate::detect::DetectionCandidate;
use crate::error::Result;
use crate::stretch::local_stretch;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CutoutConfig {
    /// Side length of every cutout in pixels.
    pub size: usize,
    /// Local stretch percentiles for the crops.
    pub stretch_low: f64,
    pub stretch_high: f64,
    /// Two-frame reference/aligned blink GIF per candidate.
    pub animation: bool,
    /// Contour / hull / polygon audit frames per candidate.
    pub shape_viz: bool,
}

impl Default for CutoutConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CUTOUT_SIZE,
            stretch_low: 1.0,
            stretch_high: 99.0,
            animation: false,
            shape_viz: false,
        }
    }
}

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);
const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const GRAY: Rgb<u8> = Rgb([128, 128, 128]);

/// Write cutout products for every candidate into `cutouts_dir`.
///
/// `label` carries filename tokens (telescope, region) for the crop names.
/// Writes are all-or-nothing per candidate: on failure the candidate's
/// already-written files are removed and the error propagates.
pub fn write_cutouts(
    cutouts_dir: &Path,
    candidates: &[DetectionCandidate],
    reference: &Array2<f32>,
    aligned: &Array2<f32>,
    overlay: &RgbImage,
    label: &str,
    config: &CutoutConfig,
) -> Result<usize> {
    if candidates.is_empty() {
        return Ok(0);
    }
    std::fs::create_dir_all(cutouts_dir)?;

    for (i, cand) in candidates.iter().enumerate() {
        let prefix = format!(
            "{:03}_X{:04}_Y{:04}{}",
            i + 1,
            cand.x.round() as i64,
            cand.y.round() as i64,
            if label.is_empty() {
                String::new()
            } else {
                format!("_{label}")
            }
        );
        write_candidate(cutouts_dir, &prefix, cand, reference, aligned, overlay, config)
            .inspect_err(|err| {
                warn!(candidate = i + 1, error = %err, "cutout generation failed");
            })?;
    }

    debug!(count = candidates.len(), "cutouts written");
    Ok(candidates.len())
}

fn write_candidate(
    dir: &Path,
    prefix: &str,
    cand: &DetectionCandidate,
    reference: &Array2<f32>,
    aligned: &Array2<f32>,
    overlay: &RgbImage,
    config: &CutoutConfig,
) -> Result<()> {
    let mut written: Vec<PathBuf> = Vec::new();
    let result = write_candidate_inner(dir, prefix, cand, reference, aligned, overlay, config, &mut written);
    if result.is_err() {
        for path in written {
            let _ = std::fs::remove_file(path);
        }
    }
    result
}

#[allow(clippy::too_many_arguments)]
fn write_candidate_inner(
    dir: &Path,
    prefix: &str,
    cand: &DetectionCandidate,
    reference: &Array2<f32>,
    aligned: &Array2<f32>,
    overlay: &RgbImage,
    config: &CutoutConfig,
    written: &mut Vec<PathBuf>,
) -> Result<()> {
    let size = config.size;
    let cx = cand.x.round() as i64;
    let cy = cand.y.round() as i64;

    let ref_crop = crop_padded(reference, cx, cy, size);
    let ref_img = to_gray(&local_stretch(
        &ref_crop,
        config.stretch_low,
        config.stretch_high,
        true,
    ));
    let ref_path = dir.join(format!("{prefix}_1_reference.png"));
    ref_img.save(&ref_path)?;
    written.push(ref_path.clone());

    let aligned_crop = crop_padded(aligned, cx, cy, size);
    let aligned_img = to_gray(&local_stretch(
        &aligned_crop,
        config.stretch_low,
        config.stretch_high,
        true,
    ));
    let aligned_path = dir.join(format!("{prefix}_2_aligned.png"));
    aligned_img.save(&aligned_path)?;
    written.push(aligned_path.clone());

    let detection_img = crop_rgb_padded(overlay, cx, cy, size);
    let detection_path = dir.join(format!("{prefix}_3_detection.png"));
    detection_img.save(&detection_path)?;
    written.push(detection_path);

    if config.shape_viz {
        for (suffix, img) in shape_frames(cand, cx, cy, size) {
            let path = dir.join(format!("{prefix}_{suffix}.png"));
            img.save(&path)?;
            written.push(path);
        }
    }

    if config.animation {
        let path = dir.join(format!("{prefix}_animation.gif"));
        write_animation(&path, &ref_img, &aligned_img, size)?;
        written.push(path);
    }

    Ok(())
}

/// Two-frame reference/aligned loop with a thin center ring to guide the
/// eye, 800 ms per frame, repeating forever.
fn write_animation(path: &Path, reference: &GrayImage, aligned: &GrayImage, size: usize) -> Result<()> {
    let file = File::create(path)?;
    let mut encoder = GifEncoder::new(file);
    encoder.set_repeat(Repeat::Infinite)?;

    let center = (size / 2) as i64;
    let radius = ((size / 4).min(20)) as i64;

    for gray in [reference, aligned] {
        let mut rgb = RgbImage::new(size as u32, size as u32);
        for (x, y, pixel) in gray.enumerate_pixels() {
            let v = pixel.0[0];
            rgb.put_pixel(x, y, Rgb([v, v, v]));
        }
        draw_circle(&mut rgb, center, center, radius, GREEN);

        let rgba = RgbaImage::from_fn(size as u32, size as u32, |x, y| {
            let p = rgb.get_pixel(x, y).0;
            image::Rgba([p[0], p[1], p[2], 255])
        });
        let frame = Frame::from_parts(rgba, 0, 0, Delay::from_numer_denom_ms(ANIMATION_FRAME_MS, 1));
        encoder.encode_frame(frame)?;
    }
    Ok(())
}

/// Contour / hull / polygon audit frames, contour coordinates shifted into
/// the cutout frame.
fn shape_frames(
    cand: &DetectionCandidate,
    cx: i64,
    cy: i64,
    size: usize,
) -> Vec<(&'static str, RgbImage)> {
    let half = (size / 2) as i64;
    let shift = |&(x, y): &(f64, f64)| -> (i64, i64) {
        ((x.round() as i64) - cx + half, (y.round() as i64) - cy + half)
    };

    let contour: Vec<(i64, i64)> = cand.contour.iter().map(shift).collect();
    let hull_src = crate::detect::contour::convex_hull(&cand.contour);
    let hull: Vec<(i64, i64)> = hull_src.iter().map(shift).collect();
    let poly_src = crate::detect::contour::approx_poly(
        &cand.contour,
        0.01 * crate::detect::contour::closed_length(&cand.contour),
    );
    let poly: Vec<(i64, i64)> = poly_src.iter().map(shift).collect();

    let blank = || RgbImage::new(size as u32, size as u32);

    let mut contour_viz = blank();
    draw_polygon(&mut contour_viz, &contour, WHITE);
    for &(x, y) in &contour {
        draw_point(&mut contour_viz, x, y, YELLOW);
    }

    let mut hull_viz = blank();
    draw_polygon(&mut hull_viz, &contour, GRAY);
    draw_polygon(&mut hull_viz, &hull, GREEN);
    for &(x, y) in &hull {
        draw_point(&mut hull_viz, x, y, GREEN);
    }

    let mut poly_viz = blank();
    draw_polygon(&mut poly_viz, &contour, GRAY);
    draw_polygon(&mut poly_viz, &poly, RED);
    for &(x, y) in &poly {
        draw_point(&mut poly_viz, x, y, RED);
    }

    let mut combined = blank();
    draw_polygon(&mut combined, &contour, WHITE);
    draw_polygon(&mut combined, &hull, GREEN);
    draw_polygon(&mut combined, &poly, RED);

    vec![
        ("4_contour", contour_viz),
        ("5_hull", hull_viz),
        ("6_poly", poly_viz),
        ("7_combined", combined),
    ]
}

/// Render the full-frame detection overlay: stretched image in grayscale
/// with a ring around each candidate.
pub fn render_overlay(stretched: &Array2<f32>, candidates: &[DetectionCandidate]) -> RgbImage {
    let (h, w) = stretched.dim();
    let mut img = RgbImage::new(w as u32, h as u32);
    for ((row, col), &v) in stretched.indexed_iter() {
        let g = (v.clamp(0.0, 1.0) * 255.0) as u8;
        img.put_pixel(col as u32, row as u32, Rgb([g, g, g]));
    }
    for cand in candidates {
        draw_circle(&mut img, cand.x.round() as i64, cand.y.round() as i64, 20, GREEN);
    }
    img
}

/// N x N crop centered at (cx, cy), zero-padded at the frame edges so the
/// declared size is kept.
pub fn crop_padded(data: &Array2<f32>, cx: i64, cy: i64, size: usize) -> Array2<f32> {
    let (h, w) = data.dim();
    let half = (size / 2) as i64;
    let mut crop = Array2::<f32>::zeros((size, size));
    for row in 0..size {
        for col in 0..size {
            let src_r = cy - half + row as i64;
            let src_c = cx - half + col as i64;
            if src_r >= 0 && src_r < h as i64 && src_c >= 0 && src_c < w as i64 {
                let v = data[[src_r as usize, src_c as usize]];
                crop[[row, col]] = if v.is_finite() { v } else { 0.0 };
            }
        }
    }
    crop
}

fn crop_rgb_padded(img: &RgbImage, cx: i64, cy: i64, size: usize) -> RgbImage {
    let (w, h) = img.dimensions();
    let half = (size / 2) as i64;
    RgbImage::from_fn(size as u32, size as u32, |x, y| {
        let src_x = cx - half + x as i64;
        let src_y = cy - half + y as i64;
        if src_x >= 0 && src_x < w as i64 && src_y >= 0 && src_y < h as i64 {
            *img.get_pixel(src_x as u32, src_y as u32)
        } else {
            Rgb([0, 0, 0])
        }
    })
}

fn to_gray(data: &Array2<f32>) -> GrayImage {
    let (h, w) = data.dim();
    let mut img = GrayImage::new(w as u32, h as u32);
    for ((row, col), &v) in data.indexed_iter() {
        img.put_pixel(col as u32, row as u32, image::Luma([(v.clamp(0.0, 1.0) * 255.0) as u8]));
    }
    img
}

fn draw_point(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    let (w, h) = img.dimensions();
    if x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_polygon(img: &mut RgbImage, points: &[(i64, i64)], color: Rgb<u8>) {
    if points.len() < 2 {
        if let Some(&(x, y)) = points.first() {
            draw_point(img, x, y, color);
        }
        return;
    }
    for i in 0..points.len() {
        let (x0, y0) = points[i];
        let (x1, y1) = points[(i + 1) % points.len()];
        draw_line(img, x0, y0, x1, y1, color);
    }
}

/// Bresenham line.
fn draw_line(img: &mut RgbImage, mut x0: i64, mut y0: i64, x1: i64, y1: i64, color: Rgb<u8>) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        draw_point(img, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Midpoint circle outline.
fn draw_circle(img: &mut RgbImage, cx: i64, cy: i64, radius: i64, color: Rgb<u8>) {
    let mut x = radius;
    let mut y = 0i64;
    let mut err = 1 - radius;
    while x >= y {
        for &(px, py) in &[
            (cx + x, cy + y),
            (cx + y, cy + x),
            (cx - y, cy + x),
            (cx - x, cy + y),
            (cx - x, cy - y),
            (cx - y, cy - x),
            (cx + y, cy - x),
            (cx + x, cy - y),
        ] {
            draw_point(img, px, py, color);
        }
        y += 1;
        if err < 0 {
            err += 2 * y + 1;
        } else {
            x -= 1;
            err += 2 * (y - x) + 1;
        }
    }
}
