//! Difference-image construction.
//!
//! Robust percentile scaling plus a light Gaussian blur suppress shot noise
//! and the dim global gradients alignment cannot remove, leaving localized
//! intensity changes. The non-overlap region is zeroed, not NaN, so that
//! downstream thresholding stays defined everywhere.

use ndarray::Array2;
use rayon::prelude::*;
use tracing::info;

use crate::consts::{OVERLAP_EPSILON, PARALLEL_PIXEL_THRESHOLD};
use crate::stretch::{percentile, stretch_linear};

/// Bounding box of the overlap mask, inclusive pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverlapBBox {
    pub x_min: usize,
    pub y_min: usize,
    pub x_max: usize,
    pub y_max: usize,
}

#[derive(Clone, Debug)]
pub struct DifferenceImage {
    /// |blurred_aligned - blurred_reference| restricted to the overlap.
    pub data: Array2<f32>,
    /// 1 where both inputs contributed valid data, 0 elsewhere.
    pub overlap_mask: Array2<u8>,
    /// None when the overlap is empty.
    pub bbox: Option<OverlapBBox>,
}

/// Build the difference between a reference and an aligned observation.
/// Both inputs must share a shape; the output shares it too.
pub fn build_difference(
    reference: &Array2<f32>,
    aligned: &Array2<f32>,
    blur_sigma: f32,
) -> DifferenceImage {
    assert_eq!(
        reference.dim(),
        aligned.dim(),
        "difference inputs must share a shape"
    );

    let overlap_mask = overlap_mask(reference, aligned);

    let norm_ref = normalize_robust(reference);
    let norm_aligned = normalize_robust(aligned);

    let blur_ref = gaussian_blur(&norm_ref, blur_sigma);
    let blur_aligned = gaussian_blur(&norm_aligned, blur_sigma);

    let mut data = &blur_aligned - &blur_ref;
    data.zip_mut_with(&overlap_mask, |d, &m| {
        *d = if m == 1 { d.abs() } else { 0.0 };
    });

    let bbox = mask_bbox(&overlap_mask);
    let overlap_pixels: usize = overlap_mask.iter().filter(|&&m| m == 1).count();
    info!(
        overlap_pixels,
        total_pixels = overlap_mask.len(),
        overlap_fraction = overlap_pixels as f64 / overlap_mask.len() as f64,
        "difference image built"
    );

    DifferenceImage {
        data,
        overlap_mask,
        bbox,
    }
}

/// Overlap = both pixels carry data (|v| above epsilon, finite).
pub fn overlap_mask(reference: &Array2<f32>, aligned: &Array2<f32>) -> Array2<u8> {
    let mut mask = Array2::<u8>::zeros(reference.dim());
    for ((m, &r), &a) in mask.iter_mut().zip(reference.iter()).zip(aligned.iter()) {
        let r_valid = r.is_finite() && r.abs() > OVERLAP_EPSILON;
        let a_valid = a.is_finite() && a.abs() > OVERLAP_EPSILON;
        *m = (r_valid && a_valid) as u8;
    }
    mask
}

/// Bounding box over nonzero mask pixels.
pub fn mask_bbox(mask: &Array2<u8>) -> Option<OverlapBBox> {
    let mut bbox: Option<OverlapBBox> = None;
    for ((row, col), &m) in mask.indexed_iter() {
        if m == 0 {
            continue;
        }
        bbox = Some(match bbox {
            None => OverlapBBox {
                x_min: col,
                y_min: row,
                x_max: col,
                y_max: row,
            },
            Some(b) => OverlapBBox {
                x_min: b.x_min.min(col),
                y_min: b.y_min.min(row),
                x_max: b.x_max.max(col),
                y_max: b.y_max.max(row),
            },
        });
    }
    bbox
}

/// Robust normalization to [0, 1] between the 1st and 99th percentiles.
fn normalize_robust(data: &Array2<f32>) -> Array2<f32> {
    let p1 = percentile(data, 1.0);
    let p99 = percentile(data, 99.0);
    stretch_linear(data, p1, p99)
}

/// Separable Gaussian blur; sigma <= 0 is the identity.
pub fn gaussian_blur(data: &Array2<f32>, sigma: f32) -> Array2<f32> {
    if sigma <= 0.0 {
        return data.clone();
    }
    let kernel = gaussian_kernel(sigma);
    let rows_done = convolve_axis(data, &kernel, Axis1d::Cols);
    convolve_axis(&rows_done, &kernel, Axis1d::Rows)
}

fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    let size = 2 * radius + 1;
    let mut kernel = vec![0.0f32; size];
    let s2 = 2.0 * sigma * sigma;
    let mut sum = 0.0f32;
    for (i, k) in kernel.iter_mut().enumerate() {
        let x = i as f32 - radius as f32;
        *k = (-x * x / s2).exp();
        sum += *k;
    }
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

enum Axis1d {
    /// Convolve along each row (horizontal pass).
    Cols,
    /// Convolve along each column (vertical pass).
    Rows,
}

fn convolve_axis(data: &Array2<f32>, kernel: &[f32], axis: Axis1d) -> Array2<f32> {
    let (h, w) = data.dim();
    let radius = kernel.len() / 2;

    let one_row = |row: usize| -> Vec<f32> {
        (0..w)
            .map(|col| {
                let mut sum = 0.0f32;
                for (ki, &kv) in kernel.iter().enumerate() {
                    let offset = ki as isize - radius as isize;
                    let (r, c) = match axis {
                        Axis1d::Cols => (
                            row as isize,
                            (col as isize + offset).clamp(0, w as isize - 1),
                        ),
                        Axis1d::Rows => (
                            (row as isize + offset).clamp(0, h as isize - 1),
                            col as isize,
                        ),
                    };
                    sum += data[[r as usize, c as usize]] * kv;
                }
                sum
            })
            .collect()
    };

    let rows: Vec<Vec<f32>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(one_row).collect()
    } else {
        (0..h).map(one_row).collect()
    };

    let mut result = Array2::<f32>::zeros((h, w));
    for (row, row_data) in rows.into_iter().enumerate() {
        for (col, val) in row_data.into_iter().enumerate() {
            result[[row, col]] = val;
        }
    }
    result
}
