//! WCS-based alignment: reproject the observation onto the template grid
//! through both images' celestial coordinate systems.

use ndarray::Array2;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::align::{bilinear_sample, AlignMethod, AlignmentResult};
use crate::consts::{
    PARALLEL_PIXEL_THRESHOLD, WCS_MAX_CENTER_SEPARATION_DEG, WCS_MIN_OVERLAP_FRACTION,
    WCS_SCALE_TOLERANCE,
};
use crate::error::{ArgusError, Result};
use crate::frame::FitsImage;
use crate::wcs::{sky_separation_deg, Wcs};

/// Align via WCS reprojection. Fails (for dispatcher fallback) when either
/// header lacks a usable WCS, validation rejects the pair, or the resulting
/// overlap is below 10%.
pub fn align_wcs(reference: &FitsImage, observation: &FitsImage) -> Result<AlignmentResult> {
    let ref_wcs = Wcs::from_header(&reference.header)
        .ok_or_else(|| ArgusError::AlignmentFailed("missing_wcs: reference".into()))?;
    let obs_wcs = Wcs::from_header(&observation.header)
        .ok_or_else(|| ArgusError::AlignmentFailed("missing_wcs: observation".into()))?;

    validate(&ref_wcs, &obs_wcs, reference, observation)?;

    let (h, w) = reference.data.dim();
    let (oh, ow) = observation.data.dim();
    let obs_data = &observation.data;

    let one_row = |row: usize| -> (Vec<f32>, Vec<u8>) {
        let mut values = Vec::with_capacity(w);
        let mut mask = Vec::with_capacity(w);
        for col in 0..w {
            let (ra, dec) = ref_wcs.pixel_to_world(col as f64, row as f64);
            let (x, y) = obs_wcs.world_to_pixel(ra, dec);
            // Tolerance absorbs round-trip jitter on the frame border.
            let inside = x.is_finite()
                && y.is_finite()
                && x >= -1e-6
                && y >= -1e-6
                && x <= (ow - 1) as f64 + 1e-6
                && y <= (oh - 1) as f64 + 1e-6;
            if inside {
                values.push(bilinear_sample(obs_data, y, x));
                mask.push(1);
            } else {
                values.push(0.0);
                mask.push(0);
            }
        }
        (values, mask)
    };

    let rows: Vec<(Vec<f32>, Vec<u8>)> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(one_row).collect()
    } else {
        (0..h).map(one_row).collect()
    };

    let mut data = Array2::<f32>::zeros((h, w));
    let mut mask = Array2::<u8>::zeros((h, w));
    let mut valid = 0usize;
    for (row, (values, flags)) in rows.into_iter().enumerate() {
        for (col, v) in values.into_iter().enumerate() {
            data[[row, col]] = v;
        }
        for (col, m) in flags.into_iter().enumerate() {
            mask[[row, col]] = m;
            valid += m as usize;
        }
    }

    let overlap_fraction = valid as f64 / (h * w) as f64;
    info!(overlap_fraction, "WCS reprojection complete");
    if overlap_fraction < WCS_MIN_OVERLAP_FRACTION {
        return Err(ArgusError::AlignmentFailed(format!(
            "low_overlap: {overlap_fraction:.3}"
        )));
    }

    Ok(AlignmentResult {
        data,
        mask,
        method_used: AlignMethod::Wcs,
        transform: None,
    })
}

/// Pixel-scale ratio within 20% on both axes and image centers within one
/// degree on the sky. Rotation is logged for transparency only; the WCS
/// encodes it, so it never blocks alignment.
fn validate(
    ref_wcs: &Wcs,
    obs_wcs: &Wcs,
    reference: &FitsImage,
    observation: &FitsImage,
) -> Result<()> {
    let (rsx, rsy) = ref_wcs.pixel_scales();
    let (osx, osy) = obs_wcs.pixel_scales();
    let ratio_x = rsx / osx;
    let ratio_y = rsy / osy;
    info!(ratio_x, ratio_y, "pixel scale ratio");

    if (ratio_x - 1.0).abs() > WCS_SCALE_TOLERANCE || (ratio_y - 1.0).abs() > WCS_SCALE_TOLERANCE {
        warn!(ratio_x, ratio_y, "pixel scales differ too much for WCS alignment");
        return Err(ArgusError::AlignmentFailed(format!(
            "scale_mismatch: x={ratio_x:.3} y={ratio_y:.3}"
        )));
    }

    let ref_center = center_world(ref_wcs, reference);
    let obs_center = center_world(obs_wcs, observation);
    let separation = sky_separation_deg(ref_center, obs_center);
    info!(
        separation_deg = separation,
        separation_arcsec = separation * 3600.0,
        "image center separation"
    );

    if separation > WCS_MAX_CENTER_SEPARATION_DEG {
        warn!(separation, "image centers too far apart; likely different fields");
        return Err(ArgusError::AlignmentFailed(format!(
            "center_separation: {separation:.3}deg"
        )));
    }

    info!(
        reference_rotation_deg = ref_wcs.rotation_deg(),
        observation_rotation_deg = obs_wcs.rotation_deg(),
        "field rotation"
    );

    Ok(())
}

fn center_world(wcs: &Wcs, image: &FitsImage) -> (f64, f64) {
    wcs.pixel_to_world(image.width() as f64 / 2.0, image.height() as f64 / 2.0)
}
