//! Observation-to-template registration.
//!
//! Two methods: feature-based rigid (rotation + translation, RANSAC over
//! detected stars) and WCS reprojection. Either can fall back to the other
//! once; when both fail the job fails with `alignment_failed`.

pub mod reproject;
pub mod rigid;
pub mod stars;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ArgusError, Result};
use crate::frame::FitsImage;

pub use rigid::RigidTransform;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlignMethod {
    /// Star matching + rigid transform estimation.
    Rigid,
    /// Reprojection through both images' celestial WCS.
    #[default]
    Wcs,
}

impl std::fmt::Display for AlignMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlignMethod::Rigid => write!(f, "rigid"),
            AlignMethod::Wcs => write!(f, "wcs"),
        }
    }
}

/// An observation resampled onto the template grid.
#[derive(Clone, Debug)]
pub struct AlignmentResult {
    /// Aligned observation, shaped like the template.
    pub data: Array2<f32>,
    /// 1 where the observation contributed valid data.
    pub mask: Array2<u8>,
    /// The method that actually produced the result (after any fallback).
    pub method_used: AlignMethod,
    /// Estimated transform for the rigid path; None for WCS reprojection.
    pub transform: Option<RigidTransform>,
}

/// Register `observation` to `reference` with the requested method, falling
/// through once to the other method when the first fails.
pub fn align(
    reference: &FitsImage,
    observation: &FitsImage,
    method: AlignMethod,
) -> Result<AlignmentResult> {
    let first = run_method(reference, observation, method);
    match first {
        Ok(result) => Ok(result),
        Err(err) => {
            let other = match method {
                AlignMethod::Rigid => AlignMethod::Wcs,
                AlignMethod::Wcs => AlignMethod::Rigid,
            };
            warn!(requested = %method, fallback = %other, error = %err, "alignment method failed; trying fallback");
            run_method(reference, observation, other).map_err(|second| {
                ArgusError::AlignmentFailed(format!(
                    "alignment_failed: {method}: {err}; {other}: {second}"
                ))
            })
        }
    }
}

fn run_method(
    reference: &FitsImage,
    observation: &FitsImage,
    method: AlignMethod,
) -> Result<AlignmentResult> {
    match method {
        AlignMethod::Rigid => rigid::align_rigid(&reference.data, &observation.data),
        AlignMethod::Wcs => reproject::align_wcs(reference, observation),
    }
}

/// Bilinear interpolation; coordinates outside the array sample as 0.
pub(crate) fn bilinear_sample(data: &Array2<f32>, y: f64, x: f64) -> f32 {
    let (h, w) = data.dim();

    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let x1 = x0 + 1;
    let y1 = y0 + 1;

    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    let sample = |r: i64, c: i64| -> f32 {
        if r >= 0 && r < h as i64 && c >= 0 && c < w as i64 {
            let v = data[[r as usize, c as usize]];
            if v.is_finite() {
                v
            } else {
                0.0
            }
        } else {
            0.0
        }
    };

    let v00 = sample(y0, x0);
    let v10 = sample(y0, x1);
    let v01 = sample(y1, x0);
    let v11 = sample(y1, x1);

    v00 * (1.0 - fx) * (1.0 - fy)
        + v10 * fx * (1.0 - fy)
        + v01 * (1.0 - fx) * fy
        + v11 * fx * fy
}
