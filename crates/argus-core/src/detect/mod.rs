//! Transient-source detection on a stretched difference image.
//!
//! Threshold -> morphological cleanup -> connected components -> shape
//! filters -> signal statistics. High circularity plus low jaggedness
//! rejects both streaks (elongated) and cosmic-ray pits (spiky); the area
//! window rejects single hot pixels and large artifacts.

pub mod catalog;
pub mod components;
pub mod contour;
pub mod morphology;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::consts::{
    ALIGNED_SNR_APERTURE, DEFAULT_DETECTION_THRESHOLD, DEFAULT_MAX_AREA,
    DEFAULT_MAX_JAGGEDNESS_RATIO, DEFAULT_MIN_AREA, DEFAULT_MIN_CIRCULARITY, MAD_SIGMA_FACTOR,
    QUALITY_SCORE_SCALE,
};

use self::components::connected_components;
use self::contour::{approx_poly, convex_hull, perimeter, trace_boundary};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DetectConfig {
    /// Threshold applied to the stretched [0, 1] image.
    pub detection_threshold: f32,
    /// Inclusive pixel-area window.
    pub min_area: usize,
    pub max_area: usize,
    /// Minimum circularity, 4*pi*area / perimeter^2 clamped to [0, 1].
    pub min_circularity: f64,
    /// Maximum polygon-vertices / hull-vertices ratio.
    pub max_jaggedness_ratio: f64,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
            min_area: DEFAULT_MIN_AREA,
            max_area: DEFAULT_MAX_AREA,
            min_circularity: DEFAULT_MIN_CIRCULARITY,
            max_jaggedness_ratio: DEFAULT_MAX_JAGGEDNESS_RATIO,
        }
    }
}

/// One transient candidate from the difference image.
#[derive(Clone, Debug)]
pub struct DetectionCandidate {
    /// Centroid, pixel coordinates (x = column, y = row).
    pub x: f64,
    pub y: f64,
    /// Pixel count of the component.
    pub area: usize,
    pub circularity: f64,
    pub jaggedness_ratio: f64,
    pub hull_vertices: usize,
    pub poly_vertices: usize,
    /// Mean and max stretched signal inside the component.
    pub mean_signal: f64,
    pub max_signal: f64,
    /// SNR of the mean (and max) signal against the background estimate.
    pub snr: f64,
    pub max_snr: f64,
    /// 7x7 aperture SNR on the aligned image; filled by
    /// [`attach_aligned_snr`].
    pub aligned_snr: Option<f64>,
    /// Composite score: circularity^2 * 2000 * normalized area.
    pub quality_score: f64,
    /// Outer boundary as (x, y) pixel coordinates.
    pub contour: Vec<(f64, f64)>,
}

/// Detect candidates in a stretched difference image.
///
/// When `overlap_mask` is given, candidates whose centroid falls outside it
/// are dropped (the difference was already mask-multiplied; this re-check is
/// defense in depth). An empty result is a valid outcome, not a failure.
pub fn detect(
    stretched: &Array2<f32>,
    config: &DetectConfig,
    overlap_mask: Option<&Array2<u8>>,
) -> Vec<DetectionCandidate> {
    let (h, w) = stretched.dim();
    if h == 0 || w == 0 {
        warn!("empty detection input");
        return Vec::new();
    }
    if config.min_area > config.max_area {
        warn!(
            min_area = config.min_area,
            max_area = config.max_area,
            "inverted area window; no detection performed"
        );
        return Vec::new();
    }

    let mask = stretched.mapv(|v| v.is_finite() && v > config.detection_threshold);
    let cleaned = morphology::close(&morphology::open(&mask));

    let comps = connected_components(&cleaned);
    debug!(candidates = comps.len(), "candidate regions");

    let (bg_median, bg_sigma) = background_stats(stretched, &cleaned);
    debug!(bg_median, bg_sigma, "background noise estimate");

    let mut candidates = Vec::new();
    for comp in &comps {
        if comp.area < config.min_area || comp.area > config.max_area {
            continue;
        }

        let boundary = trace_boundary(&comp.pixels);
        let perim = perimeter(&boundary);
        if perim == 0.0 {
            continue;
        }

        let circularity =
            (4.0 * std::f64::consts::PI * comp.area as f64 / (perim * perim)).min(1.0);
        if circularity < config.min_circularity {
            continue;
        }

        let contour_xy: Vec<(f64, f64)> =
            boundary.iter().map(|&(r, c)| (c as f64, r as f64)).collect();
        let hull = convex_hull(&contour_xy);
        if hull.is_empty() {
            continue;
        }
        let poly = approx_poly(&contour_xy, 0.01 * perim);
        let jaggedness_ratio = poly.len() as f64 / hull.len() as f64;
        if jaggedness_ratio > config.max_jaggedness_ratio {
            continue;
        }

        // First image moments over the member pixels.
        let n = comp.area as f64;
        let (mut cx, mut cy) = (0.0f64, 0.0f64);
        for &(r, c) in &comp.pixels {
            cx += c as f64;
            cy += r as f64;
        }
        cx /= n;
        cy /= n;

        if let Some(om) = overlap_mask {
            let row = (cy.round() as usize).min(h - 1);
            let col = (cx.round() as usize).min(w - 1);
            if om[[row, col]] == 0 {
                continue;
            }
        }

        let mut sum = 0.0f64;
        let mut max_signal = f64::NEG_INFINITY;
        for &(r, c) in &comp.pixels {
            let v = stretched[[r, c]] as f64;
            sum += v;
            max_signal = max_signal.max(v);
        }
        let mean_signal = sum / n;

        let snr = (mean_signal - bg_median) / (bg_sigma + 1e-10);
        let max_snr = (max_signal - bg_median) / (bg_sigma + 1e-10);

        let span = (config.max_area - config.min_area) as f64;
        let norm_area = if span > 0.0 {
            (((comp.area - config.min_area) as f64) / span).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let quality_score = circularity * circularity * QUALITY_SCORE_SCALE * norm_area;

        candidates.push(DetectionCandidate {
            x: cx,
            y: cy,
            area: comp.area,
            circularity,
            jaggedness_ratio,
            hull_vertices: hull.len(),
            poly_vertices: poly.len(),
            mean_signal,
            max_signal,
            snr,
            max_snr,
            aligned_snr: None,
            quality_score,
            contour: contour_xy,
        });
    }

    debug!(surviving = candidates.len(), "blobs after filtering");
    candidates
}

/// Fill the aligned-image SNR: mean over a 7x7 aperture at each centroid
/// against that image's MAD background.
pub fn attach_aligned_snr(candidates: &mut [DetectionCandidate], aligned: &Array2<f32>) {
    let (h, w) = aligned.dim();
    if h == 0 || w == 0 {
        return;
    }
    let (bg_median, bg_sigma) = global_stats(aligned);
    let half = (ALIGNED_SNR_APERTURE / 2) as i64;

    for cand in candidates.iter_mut() {
        let row = cand.y.round() as i64;
        let col = cand.x.round() as i64;
        let mut sum = 0.0f64;
        let mut count = 0usize;
        for dr in -half..=half {
            for dc in -half..=half {
                let r = row + dr;
                let c = col + dc;
                if r < 0 || r >= h as i64 || c < 0 || c >= w as i64 {
                    continue;
                }
                let v = aligned[[r as usize, c as usize]];
                if v.is_finite() {
                    sum += v as f64;
                    count += 1;
                }
            }
        }
        if count > 0 {
            let mean = sum / count as f64;
            cand.aligned_snr = Some((mean - bg_median) / (bg_sigma + 1e-10));
        }
    }
}

/// MAD statistics over the complement of the detection mask; falls back to
/// global statistics when the mask covers everything.
fn background_stats(data: &Array2<f32>, mask: &Array2<bool>) -> (f64, f64) {
    let values: Vec<f32> = data
        .iter()
        .zip(mask.iter())
        .filter(|(v, &m)| !m && v.is_finite())
        .map(|(&v, _)| v)
        .collect();
    if values.is_empty() {
        return global_stats(data);
    }
    mad_stats(values)
}

fn global_stats(data: &Array2<f32>) -> (f64, f64) {
    let values: Vec<f32> = data.iter().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return (0.0, 0.0);
    }
    mad_stats(values)
}

fn mad_stats(mut values: Vec<f32>) -> (f64, f64) {
    values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = values[values.len() / 2] as f64;
    let mut deviations: Vec<f64> = values.iter().map(|&v| (v as f64 - median).abs()).collect();
    deviations.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mad = deviations[deviations.len() / 2];
    (median, MAD_SIGMA_FACTOR as f64 * mad)
}
