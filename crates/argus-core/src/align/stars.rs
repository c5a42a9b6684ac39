//! Bright point-source detection for feature-based alignment.

use ndarray::Array2;

use crate::consts::MAD_SIGMA_FACTOR;

/// A detected point source with a sub-pixel centroid.
#[derive(Clone, Copy, Debug)]
pub struct Star {
    pub x: f64,
    pub y: f64,
    pub flux: f64,
}

/// Detect up to `max_stars` bright sources, brightest first.
///
/// A pixel qualifies when it exceeds median + 5 sigma (MAD-estimated) and is
/// the maximum of its 5x5 neighborhood; the centroid is then refined over a
/// 7x7 background-subtracted window.
pub fn detect_stars(data: &Array2<f32>, max_stars: usize) -> Vec<Star> {
    let (h, w) = data.dim();
    if h < 8 || w < 8 {
        return Vec::new();
    }

    let (median, sigma) = background_stats(data);
    let threshold = median + 5.0 * sigma;

    let mut stars = Vec::new();
    for row in 3..h - 3 {
        for col in 3..w - 3 {
            let v = data[[row, col]];
            if !v.is_finite() || v <= threshold {
                continue;
            }
            if !is_local_maximum(data, row, col, v) {
                continue;
            }
            stars.push(refine_centroid(data, row, col, median));
        }
    }

    stars.sort_by(|a, b| b.flux.partial_cmp(&a.flux).unwrap_or(std::cmp::Ordering::Equal));
    stars.truncate(max_stars);
    stars
}

/// Median and MAD-based sigma of the pixel distribution.
pub fn background_stats(data: &Array2<f32>) -> (f32, f32) {
    let mut values: Vec<f32> = data.iter().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return (0.0, 0.0);
    }
    values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = values[values.len() / 2];

    let mut deviations: Vec<f32> = values.iter().map(|v| (v - median).abs()).collect();
    deviations.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mad = deviations[deviations.len() / 2];

    (median, MAD_SIGMA_FACTOR * mad)
}

/// 5x5 maximum test, plateau-safe: an equal-valued neighbor earlier in scan
/// order claims the peak.
fn is_local_maximum(data: &Array2<f32>, row: usize, col: usize, v: f32) -> bool {
    for dr in -2i64..=2 {
        for dc in -2i64..=2 {
            if dr == 0 && dc == 0 {
                continue;
            }
            let n = data[[(row as i64 + dr) as usize, (col as i64 + dc) as usize]];
            if n > v {
                return false;
            }
            if n == v && (dr, dc) < (0, 0) {
                return false;
            }
        }
    }
    true
}

/// Intensity-weighted centroid over a 7x7 window with background subtraction.
fn refine_centroid(data: &Array2<f32>, row: usize, col: usize, background: f32) -> Star {
    let mut sum_x = 0.0f64;
    let mut sum_y = 0.0f64;
    let mut sum_w = 0.0f64;
    for dr in -3i64..=3 {
        for dc in -3i64..=3 {
            let r = (row as i64 + dr) as usize;
            let c = (col as i64 + dc) as usize;
            let v = data[[r, c]];
            if !v.is_finite() {
                continue;
            }
            let weight = (v - background).max(0.0) as f64;
            sum_x += c as f64 * weight;
            sum_y += r as f64 * weight;
            sum_w += weight;
        }
    }

    if sum_w > 0.0 {
        Star {
            x: sum_x / sum_w,
            y: sum_y / sum_w,
            flux: sum_w,
        }
    } else {
        Star {
            x: col as f64,
            y: row as f64,
            flux: 0.0,
        }
    }
}
