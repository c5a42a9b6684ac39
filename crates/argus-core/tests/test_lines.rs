mod common;

use ndarray::Array2;

use argus_core::lines::{suppress_lines, LineSuppressConfig};

use common::add_spot;

#[test]
fn test_no_lines_returns_input_unchanged() {
    let mut data = Array2::<f32>::zeros((64, 64));
    add_spot(&mut data, 30.0, 30.0, 1.5, 1.0);

    let out = suppress_lines(&data, &LineSuppressConfig::default());
    for (a, b) in out.iter().zip(data.iter()) {
        assert_eq!(a, b);
    }
}

#[test]
fn test_long_streak_removed_blob_preserved() {
    let mut data = Array2::<f32>::zeros((96, 96));
    // A 60-pixel horizontal streak.
    for col in 15..75 {
        data[[20, col]] = 1.0;
    }
    // A compact source well away from the streak.
    add_spot(&mut data, 60.0, 70.0, 1.5, 1.0);

    let out = suppress_lines(&data, &LineSuppressConfig::default());

    let streak_max = (15..75).map(|c| out[[20, c]]).fold(0.0f32, f32::max);
    assert!(streak_max < 0.2, "streak must be inpainted away, max {streak_max}");
    assert!(
        out[[70, 60]] > 0.5,
        "blob must survive line suppression, got {}",
        out[[70, 60]]
    );
    assert_eq!(out.dim(), data.dim());
}

#[test]
fn test_short_segment_below_min_length_kept() {
    let mut data = Array2::<f32>::zeros((96, 96));
    // Enough Hough votes for a line, but the segment is shorter than the
    // configured minimum, so nothing is marked.
    let config = LineSuppressConfig {
        min_length: 80,
        ..LineSuppressConfig::default()
    };
    for col in 10..70 {
        data[[40, col]] = 1.0;
    }

    let out = suppress_lines(&data, &config);
    assert_eq!(out[[40, 30]], 1.0, "segments shorter than min_length stay");
}
