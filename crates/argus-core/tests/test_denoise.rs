use ndarray::Array2;

use argus_core::denoise::{clean, clean_sequence, NoiseMethod};

fn flat(h: usize, w: usize, value: f32) -> Array2<f32> {
    Array2::from_elem((h, w), value)
}

#[test]
fn test_outlier_replaces_hot_pixel() {
    let mut data = flat(16, 16, 10.0);
    // Mild texture so the local MAD is nonzero.
    for ((r, c), v) in data.indexed_iter_mut() {
        *v += ((r * 7 + c * 3) % 5) as f32 * 0.01;
    }
    data[[8, 8]] = 500.0;

    let (cleaned, mask) = clean(&data, NoiseMethod::Outlier, 4.0);
    assert_eq!(cleaned.dim(), data.dim());
    assert!(mask[[8, 8]], "hot pixel must be flagged");
    assert!(
        (cleaned[[8, 8]] - 10.0).abs() < 0.1,
        "hot pixel replaced by local median, got {}",
        cleaned[[8, 8]]
    );
    // A quiet pixel far from the defect is untouched.
    assert!(!mask[[2, 2]]);
    assert_eq!(cleaned[[2, 2]], data[[2, 2]]);
}

#[test]
fn test_outlier_ignores_cold_pixel_hot_cold_catches_it() {
    let mut data = flat(16, 16, 10.0);
    for ((r, c), v) in data.indexed_iter_mut() {
        *v += ((r * 11 + c) % 5) as f32 * 0.01;
    }
    data[[5, 5]] = -200.0;

    let (_, outlier_mask) = clean(&data, NoiseMethod::Outlier, 4.0);
    assert!(!outlier_mask[[5, 5]], "bright-only pass must ignore a cold pixel");

    let (cleaned, hot_cold_mask) = clean(&data, NoiseMethod::HotCold, 4.0);
    assert!(hot_cold_mask[[5, 5]]);
    assert!((cleaned[[5, 5]] - 10.0).abs() < 0.1);
}

#[test]
fn test_nan_treated_as_defect() {
    let mut data = flat(8, 8, 3.0);
    data[[4, 4]] = f32::NAN;

    for method in [
        NoiseMethod::Outlier,
        NoiseMethod::HotCold,
        NoiseMethod::AdaptiveMedian,
    ] {
        let (cleaned, mask) = clean(&data, method, 4.0);
        assert!(mask[[4, 4]], "{method} must flag NaN");
        assert!(cleaned[[4, 4]].is_finite(), "{method} must repair NaN");
    }
}

#[test]
fn test_adaptive_median_replaces_isolated_spike() {
    let mut data = flat(12, 12, 5.0);
    for ((r, c), v) in data.indexed_iter_mut() {
        *v += ((r + 2 * c) % 3) as f32 * 0.05;
    }
    data[[6, 6]] = 99.0;

    let (cleaned, mask) = clean(&data, NoiseMethod::AdaptiveMedian, 4.0);
    assert!(mask[[6, 6]]);
    assert!(cleaned[[6, 6]] < 6.0);
    // The rest of the frame carries genuine variation and stays put.
    assert!(!mask[[3, 3]]);
}

#[test]
fn test_flat_image_untouched() {
    let data = flat(10, 10, 7.0);
    let (cleaned, mask) = clean(&data, NoiseMethod::AdaptiveMedian, 4.0);
    assert!(mask.iter().all(|&m| !m));
    assert!(cleaned.iter().all(|&v| v == 7.0));
}

#[test]
fn test_invalid_sigma_is_a_noop() {
    let mut data = flat(8, 8, 1.0);
    data[[0, 0]] = 1000.0;
    let (cleaned, mask) = clean(&data, NoiseMethod::Outlier, -1.0);
    assert_eq!(cleaned[[0, 0]], 1000.0);
    assert!(mask.iter().all(|&m| !m));
}

#[test]
fn test_sequence_accumulates_masks() {
    let mut data = flat(16, 16, 10.0);
    for ((r, c), v) in data.indexed_iter_mut() {
        *v += ((r * 5 + c * 2) % 4) as f32 * 0.02;
    }
    data[[3, 3]] = 400.0; // hot: first pass
    data[[10, 10]] = -300.0; // cold: second pass

    let (cleaned, mask) = clean_sequence(
        &data,
        &[NoiseMethod::Outlier, NoiseMethod::HotCold],
        4.0,
    );
    assert!(mask[[3, 3]] && mask[[10, 10]]);
    assert!(cleaned[[3, 3]] < 11.0 && cleaned[[10, 10]] > 9.0);
    assert_eq!(cleaned.dim(), (16, 16));
}
