//! Bright-streak suppression ahead of blob detection.
//!
//! Satellites and bleed columns survive differencing as long thin lines that
//! the shape filters would otherwise have to reject one fragment at a time.
//! A Hough vote finds the lines, their pixels are dilated, and the covered
//! region is inpainted from its surroundings. Disabled by default.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::consts::{
    LINE_BRIGHTNESS_THRESHOLD, LINE_DILATE_SIZE, LINE_MAX_GAP, LINE_MIN_LENGTH,
    LINE_VOTE_THRESHOLD,
};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LineSuppressConfig {
    /// Stretched-value threshold for the line candidate mask.
    pub brightness_threshold: f32,
    /// Minimum Hough votes for a line.
    pub vote_threshold: usize,
    /// Minimum segment length in pixels.
    pub min_length: usize,
    /// Maximum gap bridged within one segment.
    pub max_gap: usize,
    /// Square dilation size applied to line pixels before inpainting.
    pub dilate_size: usize,
}

impl Default for LineSuppressConfig {
    fn default() -> Self {
        Self {
            brightness_threshold: LINE_BRIGHTNESS_THRESHOLD,
            vote_threshold: LINE_VOTE_THRESHOLD,
            min_length: LINE_MIN_LENGTH,
            max_gap: LINE_MAX_GAP,
            dilate_size: LINE_DILATE_SIZE,
        }
    }
}

/// Remove long bright streaks. Returns the input unchanged when no line
/// passes the vote and length thresholds.
pub fn suppress_lines(data: &Array2<f32>, config: &LineSuppressConfig) -> Array2<f32> {
    let (h, w) = data.dim();
    if h == 0 || w == 0 {
        return data.clone();
    }

    let mask = data.mapv(|v| v > config.brightness_threshold);
    let lines = hough_lines(&mask, config.vote_threshold);
    if lines.is_empty() {
        return data.clone();
    }

    let mut line_mask = Array2::from_elem((h, w), false);
    let mut segments = 0usize;
    for line in &lines {
        segments += mark_segments(&mask, line, config, &mut line_mask);
    }
    if segments == 0 {
        return data.clone();
    }
    info!(lines = lines.len(), segments, "suppressing bright lines");

    let dilated = dilate(&line_mask, config.dilate_size);
    inpaint(data, &dilated)
}

/// A line in normal form: x*cos(theta) + y*sin(theta) = rho.
#[derive(Clone, Copy, Debug)]
struct HoughLine {
    theta: f64,
    rho: f64,
}

/// Standard Hough transform, 1 degree x 1 pixel resolution. Returns
/// accumulator-local maxima above the vote threshold.
fn hough_lines(mask: &Array2<bool>, vote_threshold: usize) -> Vec<HoughLine> {
    let (h, w) = mask.dim();
    let diag = ((h * h + w * w) as f64).sqrt().ceil() as i64;
    let n_theta = 180usize;
    let n_rho = (2 * diag + 1) as usize;

    let thetas: Vec<(f64, f64, f64)> = (0..n_theta)
        .map(|t| {
            let theta = (t as f64).to_radians();
            (theta, theta.cos(), theta.sin())
        })
        .collect();

    let mut acc = vec![0u32; n_theta * n_rho];
    for ((row, col), &m) in mask.indexed_iter() {
        if !m {
            continue;
        }
        for (t, &(_, cos, sin)) in thetas.iter().enumerate() {
            let rho = (col as f64 * cos + row as f64 * sin).round() as i64;
            let rho_idx = (rho + diag) as usize;
            acc[t * n_rho + rho_idx] += 1;
        }
    }

    let mut lines = Vec::new();
    for t in 0..n_theta {
        for r in 0..n_rho {
            let votes = acc[t * n_rho + r];
            if (votes as usize) < vote_threshold {
                continue;
            }
            // 3x3 accumulator-local maximum to merge near-duplicate peaks.
            let mut is_peak = true;
            'search: for dt in -1i64..=1 {
                for dr in -1i64..=1 {
                    if dt == 0 && dr == 0 {
                        continue;
                    }
                    let nt = t as i64 + dt;
                    let nr = r as i64 + dr;
                    if nt < 0 || nt >= n_theta as i64 || nr < 0 || nr >= n_rho as i64 {
                        continue;
                    }
                    let n = acc[nt as usize * n_rho + nr as usize];
                    if n > votes || (n == votes && (dt, dr) < (0, 0)) {
                        is_peak = false;
                        break 'search;
                    }
                }
            }
            if is_peak {
                lines.push(HoughLine {
                    theta: thetas[t].0,
                    rho: (r as i64 - diag) as f64,
                });
            }
        }
    }
    lines
}

/// Collect mask pixels near the line, split them into segments along the
/// line direction, and mark segments meeting the length requirement.
/// Returns the number of segments marked.
fn mark_segments(
    mask: &Array2<bool>,
    line: &HoughLine,
    config: &LineSuppressConfig,
    line_mask: &mut Array2<bool>,
) -> usize {
    let (cos, sin) = (line.theta.cos(), line.theta.sin());

    // (projection along the line, row, col) for pixels within 1 px of it.
    let mut on_line: Vec<(f64, usize, usize)> = Vec::new();
    for ((row, col), &m) in mask.indexed_iter() {
        if !m {
            continue;
        }
        let distance = (col as f64 * cos + row as f64 * sin - line.rho).abs();
        if distance <= 1.0 {
            let t = -(col as f64) * sin + row as f64 * cos;
            on_line.push((t, row, col));
        }
    }
    if on_line.is_empty() {
        return 0;
    }
    on_line.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut marked = 0usize;
    let mut start = 0usize;
    for i in 1..=on_line.len() {
        let gap_exceeded =
            i == on_line.len() || on_line[i].0 - on_line[i - 1].0 > config.max_gap as f64;
        if gap_exceeded {
            let extent = on_line[i - 1].0 - on_line[start].0;
            if extent >= config.min_length as f64 {
                for &(_, row, col) in &on_line[start..i] {
                    line_mask[[row, col]] = true;
                }
                marked += 1;
            }
            start = i;
        }
    }
    marked
}

/// Binary dilation with a square structuring element of side `size`.
fn dilate(mask: &Array2<bool>, size: usize) -> Array2<bool> {
    if size <= 1 {
        return mask.clone();
    }
    let (h, w) = mask.dim();
    let radius = (size / 2) as i64;
    let mut result = Array2::from_elem((h, w), false);
    for ((row, col), &m) in mask.indexed_iter() {
        if !m {
            continue;
        }
        let r0 = (row as i64 - radius).max(0) as usize;
        let r1 = ((row as i64 + radius) as usize).min(h - 1);
        let c0 = (col as i64 - radius).max(0) as usize;
        let c1 = ((col as i64 + radius) as usize).min(w - 1);
        for r in r0..=r1 {
            for c in c0..=c1 {
                result[[r, c]] = true;
            }
        }
    }
    result
}

/// Fill masked pixels from the mean of known 3x3 neighbors, sweeping inward
/// from the mask boundary until everything is filled.
fn inpaint(data: &Array2<f32>, mask: &Array2<bool>) -> Array2<f32> {
    let (h, w) = data.dim();
    let mut result = data.clone();
    let mut unknown = mask.clone();
    let mut remaining: usize = unknown.iter().filter(|&&m| m).count();

    while remaining > 0 {
        let mut filled_this_pass = 0usize;
        let snapshot = unknown.clone();
        for row in 0..h {
            for col in 0..w {
                if !snapshot[[row, col]] {
                    continue;
                }
                let mut sum = 0.0f32;
                let mut count = 0usize;
                for dr in -1i64..=1 {
                    for dc in -1i64..=1 {
                        let r = row as i64 + dr;
                        let c = col as i64 + dc;
                        if r < 0 || r >= h as i64 || c < 0 || c >= w as i64 {
                            continue;
                        }
                        if !snapshot[[r as usize, c as usize]] {
                            sum += result[[r as usize, c as usize]];
                            count += 1;
                        }
                    }
                }
                if count > 0 {
                    result[[row, col]] = sum / count as f32;
                    unknown[[row, col]] = false;
                    filled_this_pass += 1;
                }
            }
        }
        if filled_this_pass == 0 {
            // Fully masked image; nothing known to fill from.
            break;
        }
        remaining -= filled_this_pass;
    }
    result
}
