use ndarray::Array2;

use argus_core::stretch::{
    local_stretch, peak_stretch, percentile, percentile_stretch, stretch, StretchMethod,
};

fn ramp(h: usize, w: usize) -> Array2<f32> {
    Array2::from_shape_fn((h, w), |(r, c)| (r * w + c) as f32)
}

#[test]
fn test_percentile_stretch_bounds_and_clipping() {
    let data = ramp(32, 32);
    let result = percentile_stretch(&data, 50.0);

    assert_eq!(result.data.dim(), data.dim());
    for &v in result.data.iter() {
        assert!((0.0..=1.0).contains(&v));
    }
    // Everything below the 50th percentile clamps to 0; the max maps to 1.
    assert_eq!(result.data[[0, 0]], 0.0);
    assert_eq!(result.data[[31, 31]], 1.0);
}

#[test]
fn test_percentile_stretch_strictly_monotone_inside_anchors() {
    let data = ramp(32, 32);
    let result = percentile_stretch(&data, 50.0);

    // Pick two in-range values a < b: both between v_lo and v_hi.
    let probe = |value: f32| -> f32 {
        let (r, c) = ((value as usize) / 32, (value as usize) % 32);
        result.data[[r, c]]
    };
    let a = result.v_lo + (result.v_hi - result.v_lo) * 0.25;
    let b = result.v_lo + (result.v_hi - result.v_lo) * 0.75;
    assert!(
        probe(a) < probe(b),
        "stretch must be strictly increasing on [v_lo, v_hi]"
    );
}

#[test]
fn test_peak_stretch_anchors_on_background_mode() {
    // 64x64 background at 0.1 (well over the 1000-count bin minimum) plus a
    // handful of bright pixels.
    let mut data = Array2::from_elem((64, 64), 0.1f32);
    data[[10, 10]] = 1.0;
    data[[20, 20]] = 0.9;
    data[[30, 30]] = 0.8;

    let result = peak_stretch(&data);
    // Background sits at/below the peak anchor and clamps to 0.
    assert_eq!(result.data[[0, 0]], 0.0);
    // Maximum stays at 1 (it is beyond the 2/3 end point).
    assert_eq!(result.data[[10, 10]], 1.0);
    assert!(result.v_lo < result.v_hi);
    for &v in result.data.iter() {
        assert!((0.0..=1.0).contains(&v));
    }
}

#[test]
fn test_stretch_dispatch_matches_methods() {
    let data = ramp(16, 16);
    let a = stretch(&data, StretchMethod::Percentile { low: 90.0 });
    let b = percentile_stretch(&data, 90.0);
    assert_eq!(a.v_lo, b.v_lo);
    assert_eq!(a.v_hi, b.v_hi);
}

#[test]
fn test_constant_image_is_identity() {
    let data = Array2::from_elem((8, 8), 0.5f32);
    let result = percentile_stretch(&data, 99.95);
    for &v in result.data.iter() {
        assert!(v.is_finite());
        assert_eq!(v, 0.5);
    }
}

#[test]
fn test_nan_maps_to_zero() {
    let mut data = ramp(8, 8);
    data[[3, 3]] = f32::NAN;
    let result = percentile_stretch(&data, 10.0);
    assert_eq!(result.data[[3, 3]], 0.0);
}

#[test]
fn test_local_stretch_degenerate_range() {
    let data = Array2::from_elem((6, 6), 2.0f32);
    let out = local_stretch(&data, 1.0, 99.0, true);
    for &v in out.iter() {
        assert!(v.is_finite());
    }
}

#[test]
fn test_percentile_nearest_rank() {
    let data = ramp(10, 10); // values 0..99
    assert_eq!(percentile(&data, 0.0), 0.0);
    assert_eq!(percentile(&data, 100.0), 99.0);
    let p50 = percentile(&data, 50.0);
    assert!((49.0..=51.0).contains(&p50));
}
