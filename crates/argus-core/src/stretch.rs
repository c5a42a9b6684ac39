//! Pixel scaling to [0, 1] ahead of thresholded detection.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{
    DEFAULT_PERCENTILE_LOW, EPSILON, STRETCH_HISTOGRAM_BINS, STRETCH_PEAK_MIN_COUNT,
    STRETCH_PEAK_RATIO,
};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StretchMethod {
    /// Histogram-peak anchored stretch: the modal value maps to 0 and
    /// peak + (max - peak) * 2/3 maps to 1.
    Peak,
    /// Percentile anchored stretch: the p-th percentile maps to 0 and the
    /// maximum maps to 1.
    Percentile { low: f64 },
}

impl Default for StretchMethod {
    fn default() -> Self {
        StretchMethod::Percentile {
            low: DEFAULT_PERCENTILE_LOW,
        }
    }
}

impl std::fmt::Display for StretchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StretchMethod::Peak => write!(f, "histogram_peak"),
            StretchMethod::Percentile { low } => write!(f, "percentile_{low}_max"),
        }
    }
}

/// A stretched image together with the black/white anchors used.
#[derive(Clone, Debug)]
pub struct StretchResult {
    pub data: Array2<f32>,
    pub v_lo: f32,
    pub v_hi: f32,
}

/// Stretch with the configured method. Monotone non-decreasing; pixels below
/// `v_lo` clamp to 0, pixels at or above `v_hi` clamp to 1.
pub fn stretch(data: &Array2<f32>, method: StretchMethod) -> StretchResult {
    match method {
        StretchMethod::Peak => peak_stretch(data),
        StretchMethod::Percentile { low } => percentile_stretch(data, low),
    }
}

/// Find the modal histogram bin (2000 bins) and stretch from it toward the
/// maximum. Bins only qualify as peaks above a minimum count so that sparse
/// high-value bins do not outvote the sky background.
pub fn peak_stretch(data: &Array2<f32>) -> StretchResult {
    let (min, max) = finite_min_max(data);
    if !(max > min) {
        return StretchResult {
            data: data.clone(),
            v_lo: min,
            v_hi: max,
        };
    }

    let bins = STRETCH_HISTOGRAM_BINS;
    let mut histogram = vec![0u64; bins];
    let scale = bins as f32 / (max - min);
    for &v in data.iter() {
        if v.is_finite() {
            let bin = (((v - min) * scale) as usize).min(bins - 1);
            histogram[bin] += 1;
        }
    }

    let mut peak_bin = None;
    let mut peak_count = 0u64;
    for i in 1..bins - 1 {
        let c = histogram[i];
        if c > histogram[i - 1] && c > histogram[i + 1] && c > STRETCH_PEAK_MIN_COUNT && c > peak_count
        {
            peak_bin = Some(i);
            peak_count = c;
        }
    }
    let bin = peak_bin.unwrap_or_else(|| {
        histogram
            .iter()
            .enumerate()
            .max_by_key(|(_, &c)| c)
            .map(|(i, _)| i)
            .unwrap_or(0)
    });

    let bin_width = (max - min) / bins as f32;
    let peak_value = min + (bin as f32 + 0.5) * bin_width;
    let end_value = peak_value + (max - peak_value) * STRETCH_PEAK_RATIO;
    debug!(peak_value, end_value, "peak stretch anchors");

    StretchResult {
        data: stretch_linear(data, peak_value, end_value),
        v_lo: peak_value,
        v_hi: end_value,
    }
}

/// Stretch from the `low` percentile to the maximum value.
pub fn percentile_stretch(data: &Array2<f32>, low: f64) -> StretchResult {
    let v_lo = percentile(data, low);
    let (_, v_hi) = finite_min_max(data);
    debug!(v_lo, v_hi, low, "percentile stretch anchors");

    StretchResult {
        data: stretch_linear(data, v_lo, v_hi),
        v_lo,
        v_hi,
    }
}

/// Local stretch for cutout crops: percentile black point, percentile or max
/// white point. Degenerate ranges fall back to the full min/max span.
pub fn local_stretch(data: &Array2<f32>, low: f64, high: f64, use_max: bool) -> Array2<f32> {
    if data.is_empty() {
        return data.clone();
    }
    let mut v_lo = percentile(data, low);
    let mut v_hi = if use_max {
        finite_min_max(data).1
    } else {
        percentile(data, high)
    };
    if v_hi - v_lo < EPSILON {
        let (min, max) = finite_min_max(data);
        v_lo = min;
        v_hi = max;
    }
    stretch_linear(data, v_lo, v_hi)
}

/// Linear map [lo, hi] -> [0, 1] with clipping; identity-safe on a
/// degenerate range.
pub fn stretch_linear(data: &Array2<f32>, lo: f32, hi: f32) -> Array2<f32> {
    let range = hi - lo;
    if !(range > EPSILON) {
        return data.clone();
    }
    data.mapv(|v| {
        if v.is_nan() {
            0.0
        } else {
            ((v - lo) / range).clamp(0.0, 1.0)
        }
    })
}

/// p-th percentile (0..100) over finite values, nearest-rank.
pub fn percentile(data: &Array2<f32>, p: f64) -> f32 {
    let mut sorted: Vec<f32> = data.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((sorted.len() as f64 * p / 100.0) as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// Minimum and maximum over finite values.
pub fn finite_min_max(data: &Array2<f32>) -> (f32, f32) {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in data.iter() {
        if v.is_finite() {
            min = min.min(v);
            max = max.max(v);
        }
    }
    if min > max {
        (0.0, 0.0)
    } else {
        (min, max)
    }
}
