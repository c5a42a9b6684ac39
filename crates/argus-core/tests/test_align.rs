mod common;

use approx::assert_abs_diff_eq;
use ndarray::Array2;

use argus_core::align::{align, AlignMethod};
use argus_core::error::ArgusError;
use argus_core::frame::FitsImage;
use argus_core::wcs::{sky_separation_deg, Wcs};

use common::{scattered_stars, star_field, tan_wcs_header};

const SCALE: f64 = 0.000278; // ~1 arcsec per pixel

#[test]
fn test_wcs_pixel_world_round_trip() {
    let header = tan_wcs_header(183.4, 22.9, 65.0, 65.0, SCALE, 12.0);
    let wcs = Wcs::from_header(&header).unwrap();

    for &(x, y) in &[(0.0, 0.0), (64.0, 64.0), (17.25, 93.5), (127.0, 3.0)] {
        let (ra, dec) = wcs.pixel_to_world(x, y);
        let (bx, by) = wcs.world_to_pixel(ra, dec);
        assert_abs_diff_eq!(bx, x, epsilon = 1e-6);
        assert_abs_diff_eq!(by, y, epsilon = 1e-6);
    }

    let (sx, sy) = wcs.pixel_scales();
    assert_abs_diff_eq!(sx, SCALE, epsilon = 1e-9);
    assert_abs_diff_eq!(sy, SCALE, epsilon = 1e-9);
    assert_abs_diff_eq!(wcs.rotation_deg(), 12.0, epsilon = 1e-6);
}

#[test]
fn test_wcs_alignment_of_identical_frames_is_identity() {
    let stars = scattered_stars(96, 96, 12, 12.0);
    let data = star_field(96, 96, &stars, 0.2);
    let header = tan_wcs_header(180.0, 30.0, 48.0, 48.0, SCALE, 0.0);

    let reference = FitsImage::new(data.clone(), header.clone());
    let observation = FitsImage::new(data.clone(), header);

    let result = align(&reference, &observation, AlignMethod::Wcs).unwrap();
    assert_eq!(result.method_used, AlignMethod::Wcs);
    assert_eq!(result.data.dim(), (96, 96));
    assert!(result.mask.iter().all(|&m| m == 1));

    for ((r, c), &v) in result.data.indexed_iter() {
        assert_abs_diff_eq!(v, data[[r, c]], epsilon = 1e-3);
    }
}

#[test]
fn test_wcs_alignment_recovers_pixel_offset() {
    // The observation frame is shifted by (dx, dy) pixels; its CRPIX moves
    // with it, so the sky stays put and reprojection must undo the shift.
    let (dx, dy) = (7i64, -4i64);
    let stars = scattered_stars(96, 96, 12, 16.0);
    let template_data = star_field(96, 96, &stars, 0.2);
    let shifted: Vec<(f64, f64, f32)> = stars
        .iter()
        .map(|&(x, y, a)| (x + dx as f64, y + dy as f64, a))
        .collect();
    let obs_data = star_field(96, 96, &shifted, 0.2);

    let reference = FitsImage::new(
        template_data.clone(),
        tan_wcs_header(180.0, 30.0, 48.0, 48.0, SCALE, 0.0),
    );
    let observation = FitsImage::new(
        obs_data,
        tan_wcs_header(180.0, 30.0, 48.0 + dx as f64, 48.0 + dy as f64, SCALE, 0.0),
    );

    let result = align(&reference, &observation, AlignMethod::Wcs).unwrap();
    assert_eq!(result.method_used, AlignMethod::Wcs);

    // Interior pixels that map inside the observation match the template.
    for &(x, y, _) in &stars {
        let (r, c) = (y.round() as usize, x.round() as usize);
        if result.mask[[r, c]] == 1 {
            assert_abs_diff_eq!(result.data[[r, c]], template_data[[r, c]], epsilon = 1e-2);
        }
    }
}

#[test]
fn test_scale_mismatch_falls_back_to_rigid() {
    // Plate solve produced a 1.25x pixel scale: WCS validation must reject
    // and the rigid path take over (identical pixel data, so it succeeds).
    let stars = scattered_stars(96, 96, 14, 14.0);
    let data = star_field(96, 96, &stars, 0.2);

    let reference = FitsImage::new(data.clone(), tan_wcs_header(180.0, 30.0, 48.0, 48.0, SCALE, 0.0));
    let observation = FitsImage::new(
        data,
        tan_wcs_header(180.0, 30.0, 48.0, 48.0, SCALE * 1.25, 0.0),
    );

    let result = align(&reference, &observation, AlignMethod::Wcs).unwrap();
    assert_eq!(result.method_used, AlignMethod::Rigid);
}

#[test]
fn test_sky_offset_with_no_features_fails_entirely() {
    // Centers 2 degrees apart: WCS validation rejects; the observation is
    // starless, so the rigid fallback cannot match features either.
    let stars = scattered_stars(64, 64, 10, 10.0);
    let reference = FitsImage::new(
        star_field(64, 64, &stars, 0.2),
        tan_wcs_header(180.0, 30.0, 32.0, 32.0, SCALE, 0.0),
    );
    let observation = FitsImage::new(
        Array2::from_elem((64, 64), 0.2f32),
        tan_wcs_header(182.0, 30.0, 32.0, 32.0, SCALE, 0.0),
    );

    let err = align(&reference, &observation, AlignMethod::Wcs).unwrap_err();
    assert!(matches!(err, ArgusError::AlignmentFailed(_)));
}

#[test]
fn test_rigid_recovers_translation() {
    let (dx, dy) = (6.0f64, -3.0f64);
    let stars = scattered_stars(128, 128, 18, 20.0);
    let template_data = star_field(128, 128, &stars, 0.1);
    let moved: Vec<(f64, f64, f32)> = stars.iter().map(|&(x, y, a)| (x + dx, y + dy, a)).collect();
    let obs_data = star_field(128, 128, &moved, 0.1);

    let reference = FitsImage::new(template_data.clone(), Default::default());
    let observation = FitsImage::new(obs_data, Default::default());

    let result = align(&reference, &observation, AlignMethod::Rigid).unwrap();
    assert_eq!(result.method_used, AlignMethod::Rigid);

    let transform = result.transform.expect("rigid path reports its transform");
    assert_abs_diff_eq!(transform.tx, dx, epsilon = 0.5);
    assert_abs_diff_eq!(transform.ty, dy, epsilon = 0.5);
    assert_abs_diff_eq!(transform.rotation_deg(), 0.0, epsilon = 0.5);
    assert_abs_diff_eq!(transform.scale, 1.0, epsilon = 1e-6);

    // The aligned frame reproduces the template's stars.
    for &(x, y, _) in &stars {
        let (r, c) = (y.round() as usize, x.round() as usize);
        if result.mask[[r, c]] == 1 {
            let got = result.data[[r, c]];
            let want = template_data[[r, c]];
            assert!(
                (got - want).abs() < 0.6,
                "star at ({x:.1},{y:.1}): got {got}, want {want}"
            );
        }
    }
}

#[test]
fn test_rigid_with_too_few_features_fails() {
    let reference = FitsImage::new(Array2::from_elem((64, 64), 0.2f32), Default::default());
    let observation = FitsImage::new(Array2::from_elem((64, 64), 0.2f32), Default::default());

    // No WCS either, so both methods are exhausted.
    let err = align(&reference, &observation, AlignMethod::Rigid).unwrap_err();
    assert!(matches!(err, ArgusError::AlignmentFailed(_)));
}

#[test]
fn test_sky_separation() {
    assert_abs_diff_eq!(sky_separation_deg((180.0, 30.0), (180.0, 31.0)), 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(sky_separation_deg((10.0, 0.0), (11.0, 0.0)), 1.0, epsilon = 1e-9);
    assert!(sky_separation_deg((180.0, 30.0), (182.0, 30.0)) > 1.5);
}
