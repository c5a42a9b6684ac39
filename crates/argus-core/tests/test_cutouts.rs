mod common;

use ndarray::Array2;
use tempfile::tempdir;

use argus_core::cutouts::{crop_padded, render_overlay, write_cutouts, CutoutConfig};
use argus_core::detect::DetectionCandidate;

use common::add_spot;

fn candidate(x: f64, y: f64) -> DetectionCandidate {
    DetectionCandidate {
        x,
        y,
        area: 9,
        circularity: 0.95,
        jaggedness_ratio: 1.0,
        hull_vertices: 4,
        poly_vertices: 4,
        mean_signal: 0.8,
        max_signal: 1.0,
        snr: 12.0,
        max_snr: 15.0,
        aligned_snr: Some(10.0),
        quality_score: 900.0,
        contour: vec![
            (x - 1.0, y - 1.0),
            (x + 1.0, y - 1.0),
            (x + 1.0, y + 1.0),
            (x - 1.0, y + 1.0),
        ],
    }
}

#[test]
fn test_cutout_triplet_written() {
    let dir = tempdir().unwrap();
    let cutouts = dir.path().join("cutouts");

    let mut reference = Array2::from_elem((64, 64), 0.1f32);
    let mut aligned = reference.clone();
    add_spot(&mut reference, 32.0, 32.0, 1.5, 2.0);
    add_spot(&mut aligned, 32.0, 32.0, 1.5, 2.5);
    let candidates = vec![candidate(32.0, 32.0)];
    let overlay = render_overlay(&aligned, &candidates);

    let config = CutoutConfig {
        size: 32,
        ..CutoutConfig::default()
    };
    let written = write_cutouts(
        &cutouts,
        &candidates,
        &reference,
        &aligned,
        &overlay,
        "GY5_K096-1",
        &config,
    )
    .unwrap();
    assert_eq!(written, 1);

    for suffix in ["1_reference", "2_aligned", "3_detection"] {
        let path = cutouts.join(format!("001_X0032_Y0032_GY5_K096-1_{suffix}.png"));
        assert!(path.is_file(), "missing {}", path.display());
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (32, 32));
    }
    // Animation and shape frames are off by default.
    assert!(!cutouts.join("001_X0032_Y0032_GY5_K096-1_animation.gif").exists());
}

#[test]
fn test_animation_and_shape_frames() {
    let dir = tempdir().unwrap();
    let cutouts = dir.path().join("cutouts");

    let reference = Array2::from_elem((64, 64), 0.2f32);
    let aligned = reference.clone();
    let candidates = vec![candidate(20.0, 24.0)];
    let overlay = render_overlay(&aligned, &candidates);

    let config = CutoutConfig {
        size: 32,
        animation: true,
        shape_viz: true,
        ..CutoutConfig::default()
    };
    write_cutouts(&cutouts, &candidates, &reference, &aligned, &overlay, "", &config).unwrap();

    assert!(cutouts.join("001_X0020_Y0024_animation.gif").is_file());
    for suffix in ["4_contour", "5_hull", "6_poly", "7_combined"] {
        assert!(cutouts.join(format!("001_X0020_Y0024_{suffix}.png")).is_file());
    }
}

#[test]
fn test_edge_candidate_keeps_declared_size() {
    // A candidate hugging the corner: the crop is clipped against the frame
    // and padded back out with zeros.
    let mut data = Array2::from_elem((64, 64), 0.5f32);
    data[[0, 0]] = 1.0;

    let crop = crop_padded(&data, 2, 2, 32);
    assert_eq!(crop.dim(), (32, 32));
    // Region mapped from outside the frame is zero.
    assert_eq!(crop[[0, 0]], 0.0);
    // In-frame content is carried over.
    assert_eq!(crop[[14, 14]], 1.0);
    assert_eq!(crop[[20, 20]], 0.5);
}

#[test]
fn test_empty_candidate_list_is_noop() {
    let dir = tempdir().unwrap();
    let cutouts = dir.path().join("cutouts");
    let data = Array2::<f32>::zeros((16, 16));
    let overlay = render_overlay(&data, &[]);

    let written =
        write_cutouts(&cutouts, &[], &data, &data, &overlay, "", &CutoutConfig::default()).unwrap();
    assert_eq!(written, 0);
    assert!(!cutouts.exists());
}
