//! Per-pixel defect cleaning applied to both inputs before alignment.
//!
//! Three methods, each a pure 2D -> 2D transform returning the cleaned image
//! and a boolean mask of the pixels it touched. Methods compose in a caller
//! chosen sequence; each pass reads the previous pass's output and the masks
//! accumulate with OR.

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::consts::{MAD_SIGMA_FACTOR, PARALLEL_PIXEL_THRESHOLD};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseMethod {
    /// Bright pixels above a local MAD threshold become the local median.
    Outlier,
    /// Symmetric variant catching both hot and cold defects.
    HotCold,
    /// Growing-window median (3 -> 5 -> 7) for extremum pixels.
    AdaptiveMedian,
}

impl std::fmt::Display for NoiseMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoiseMethod::Outlier => write!(f, "outlier"),
            NoiseMethod::HotCold => write!(f, "hot_cold"),
            NoiseMethod::AdaptiveMedian => write!(f, "adaptive_median"),
        }
    }
}

/// Apply one cleaning pass. Output shape equals input shape; NaN pixels are
/// always treated as defects. A malformed sigma logs a warning and returns
/// the input unchanged.
pub fn clean(data: &Array2<f32>, method: NoiseMethod, sigma: f32) -> (Array2<f32>, Array2<bool>) {
    let (h, w) = data.dim();
    if !sigma.is_finite() || sigma <= 0.0 {
        warn!(sigma, "invalid denoise sigma; pass skipped");
        return (data.clone(), Array2::from_elem((h, w), false));
    }

    match method {
        NoiseMethod::Outlier => threshold_clean(data, sigma, false),
        NoiseMethod::HotCold => threshold_clean(data, sigma, true),
        NoiseMethod::AdaptiveMedian => adaptive_median(data),
    }
}

/// Run a sequence of passes, feeding each pass the previous output.
pub fn clean_sequence(
    data: &Array2<f32>,
    methods: &[NoiseMethod],
    sigma: f32,
) -> (Array2<f32>, Array2<bool>) {
    let (h, w) = data.dim();
    let mut current = data.clone();
    let mut combined = Array2::from_elem((h, w), false);
    for &method in methods {
        let (cleaned, mask) = clean(&current, method, sigma);
        current = cleaned;
        combined.zip_mut_with(&mask, |acc, &m| *acc |= m);
    }
    (current, combined)
}

/// Local-median replacement for pixels beyond sigma MADs of their 5x5
/// neighborhood median. `symmetric` also catches dark defects.
fn threshold_clean(data: &Array2<f32>, sigma: f32, symmetric: bool) -> (Array2<f32>, Array2<bool>) {
    let (h, w) = data.dim();

    let process_row = |row: usize| -> (Vec<f32>, Vec<bool>) {
        let mut values = Vec::with_capacity(w);
        let mut flags = Vec::with_capacity(w);
        let mut buf = Vec::with_capacity(25);
        for col in 0..w {
            let center = data[[row, col]];
            gather_window(data, row, col, 2, &mut buf);
            let median = median_of(&mut buf);
            let mad = mad_of(&mut buf, median);
            let threshold = sigma * MAD_SIGMA_FACTOR * mad;

            let deviation = center - median;
            let is_noise = center.is_nan()
                || deviation > threshold
                || (symmetric && -deviation > threshold);
            if is_noise {
                values.push(median);
                flags.push(true);
            } else {
                values.push(center);
                flags.push(false);
            }
        }
        (values, flags)
    };

    collect_rows(h, w, process_row)
}

/// Adaptive median: grow the window 3 -> 5 -> 7 while the center stays the
/// window extremum; once it stops being one it is genuine signal. A pixel
/// still extremal at the largest window is replaced with that window median.
fn adaptive_median(data: &Array2<f32>) -> (Array2<f32>, Array2<bool>) {
    let (h, w) = data.dim();

    let process_row = |row: usize| -> (Vec<f32>, Vec<bool>) {
        let mut values = Vec::with_capacity(w);
        let mut flags = Vec::with_capacity(w);
        let mut buf = Vec::with_capacity(49);
        for col in 0..w {
            let center = data[[row, col]];
            let mut replaced = None;
            for radius in 1..=3usize {
                gather_window(data, row, col, radius, &mut buf);
                let (min, max) = min_max(&buf);
                // A flat window has nothing to repair against.
                if center.is_nan() || (max > min && (center <= min || center >= max)) {
                    if radius == 3 {
                        replaced = Some(median_of(&mut buf));
                    }
                } else {
                    break;
                }
            }
            match replaced {
                Some(m) => {
                    values.push(m);
                    flags.push(true);
                }
                None => {
                    values.push(center);
                    flags.push(false);
                }
            }
        }
        (values, flags)
    };

    collect_rows(h, w, process_row)
}

fn collect_rows<F>(h: usize, w: usize, process_row: F) -> (Array2<f32>, Array2<bool>)
where
    F: Fn(usize) -> (Vec<f32>, Vec<bool>) + Sync + Send,
{
    let rows: Vec<(Vec<f32>, Vec<bool>)> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(process_row).collect()
    } else {
        (0..h).map(process_row).collect()
    };

    let mut cleaned = Array2::<f32>::zeros((h, w));
    let mut mask = Array2::from_elem((h, w), false);
    for (row, (values, flags)) in rows.into_iter().enumerate() {
        for (col, v) in values.into_iter().enumerate() {
            cleaned[[row, col]] = v;
        }
        for (col, m) in flags.into_iter().enumerate() {
            mask[[row, col]] = m;
        }
    }
    (cleaned, mask)
}

/// Collect finite values of the square window (excluding the center pixel)
/// into `buf`, clamping at image edges.
fn gather_window(data: &Array2<f32>, row: usize, col: usize, radius: usize, buf: &mut Vec<f32>) {
    let (h, w) = data.dim();
    buf.clear();
    let r0 = row.saturating_sub(radius);
    let r1 = (row + radius).min(h - 1);
    let c0 = col.saturating_sub(radius);
    let c1 = (col + radius).min(w - 1);
    for r in r0..=r1 {
        for c in c0..=c1 {
            if r == row && c == col {
                continue;
            }
            let v = data[[r, c]];
            if v.is_finite() {
                buf.push(v);
            }
        }
    }
}

fn median_of(buf: &mut [f32]) -> f32 {
    if buf.is_empty() {
        return 0.0;
    }
    buf.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    buf[buf.len() / 2]
}

fn mad_of(buf: &mut [f32], median: f32) -> f32 {
    if buf.is_empty() {
        return 0.0;
    }
    for v in buf.iter_mut() {
        *v = (*v - median).abs();
    }
    median_of(buf)
}

fn min_max(buf: &[f32]) -> (f32, f32) {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in buf {
        min = min.min(v);
        max = max.max(v);
    }
    (min, max)
}
