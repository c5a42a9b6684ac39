mod common;

use ndarray::Array2;
use tempfile::tempdir;

use argus_core::detect::catalog::{
    sort_candidates, write_catalog, CatalogProvenance, SortKey,
};
use argus_core::detect::{attach_aligned_snr, detect, DetectConfig, DetectionCandidate};

/// A disk of the given radius stamped as 1.0 pixels.
fn stamp_disk(data: &mut Array2<f32>, cx: i64, cy: i64, radius: f64) {
    let (h, w) = data.dim();
    let r = radius.ceil() as i64;
    for dr in -r..=r {
        for dc in -r..=r {
            let row = cy + dr;
            let col = cx + dc;
            if row < 0 || row >= h as i64 || col < 0 || col >= w as i64 {
                continue;
            }
            if ((dr * dr + dc * dc) as f64).sqrt() <= radius {
                data[[row as usize, col as usize]] = 1.0;
            }
        }
    }
}

fn loose_config() -> DetectConfig {
    DetectConfig {
        detection_threshold: 0.5,
        min_area: 2,
        max_area: 200,
        min_circularity: 0.5,
        max_jaggedness_ratio: 2.0,
    }
}

#[test]
fn test_detects_a_compact_blob() {
    let mut data = Array2::<f32>::zeros((64, 64));
    stamp_disk(&mut data, 40, 30, 3.0);

    let candidates = detect(&data, &loose_config(), None);
    assert_eq!(candidates.len(), 1);
    let cand = &candidates[0];
    assert!((cand.x - 40.0).abs() < 1.0, "x centroid {}", cand.x);
    assert!((cand.y - 30.0).abs() < 1.0, "y centroid {}", cand.y);
    assert!(cand.circularity >= 0.5);
    assert!(cand.snr > 1.0);
    assert!(cand.mean_signal > 0.9);
}

#[test]
fn test_streak_rejected_large_blob_rejected() {
    let mut data = Array2::<f32>::zeros((96, 96));
    // A 3-wide, 40-long streak: survives morphology, fails circularity.
    for row in 20..23 {
        for col in 10..50 {
            data[[row, col]] = 1.0;
        }
    }
    // A giant disk: fails the area window.
    stamp_disk(&mut data, 70, 70, 12.0);

    let config = DetectConfig {
        detection_threshold: 0.5,
        min_area: 2,
        max_area: 100,
        min_circularity: 0.79,
        max_jaggedness_ratio: 1.2,
    };
    let candidates = detect(&data, &config, None);
    assert!(candidates.is_empty(), "got {} candidates", candidates.len());
}

#[test]
fn test_area_window_boundary() {
    // A 3x3 stamp becomes a 5-pixel plus after open/close with the
    // elliptical kernel.
    let mut data = Array2::<f32>::zeros((32, 32));
    for row in 14..17 {
        for col in 14..17 {
            data[[row, col]] = 1.0;
        }
    }

    let mut config = loose_config();
    config.min_area = 5;
    assert_eq!(detect(&data, &config, None).len(), 1, "area == min_area is included");

    config.min_area = 6;
    assert!(detect(&data, &config, None).is_empty(), "area < min_area is excluded");
}

#[test]
fn test_quality_score_formula() {
    let mut data = Array2::<f32>::zeros((64, 64));
    stamp_disk(&mut data, 20, 20, 3.0);
    stamp_disk(&mut data, 45, 45, 2.0);

    let config = loose_config();
    let candidates = detect(&data, &config, None);
    assert!(!candidates.is_empty());
    for cand in &candidates {
        let norm_area = ((cand.area - config.min_area) as f64
            / (config.max_area - config.min_area) as f64)
            .clamp(0.0, 1.0);
        let expected = cand.circularity * cand.circularity * 2000.0 * norm_area;
        assert!(
            (cand.quality_score - expected).abs() < 1e-9,
            "score {} vs formula {}",
            cand.quality_score,
            expected
        );
        assert!((0.0..=2000.0).contains(&cand.quality_score));
    }
}

#[test]
fn test_centroid_outside_overlap_mask_dropped() {
    let mut data = Array2::<f32>::zeros((64, 64));
    stamp_disk(&mut data, 40, 30, 3.0);

    let inside = Array2::<u8>::ones((64, 64));
    assert_eq!(detect(&data, &loose_config(), Some(&inside)).len(), 1);

    let outside = Array2::<u8>::zeros((64, 64));
    assert!(detect(&data, &loose_config(), Some(&outside)).is_empty());
}

#[test]
fn test_empty_image_yields_empty_catalog() {
    let data = Array2::<f32>::zeros((32, 32));
    assert!(detect(&data, &loose_config(), None).is_empty());
}

fn candidate(x: f64, y: f64, quality: f64, snr: f64, aligned: Option<f64>) -> DetectionCandidate {
    DetectionCandidate {
        x,
        y,
        area: 9,
        circularity: 0.9,
        jaggedness_ratio: 1.0,
        hull_vertices: 4,
        poly_vertices: 4,
        mean_signal: 0.8,
        max_signal: 1.0,
        snr,
        max_snr: snr * 1.2,
        aligned_snr: aligned,
        quality_score: quality,
        contour: vec![(x, y)],
    }
}

#[test]
fn test_sort_monotone_with_xy_tie_breaks() {
    let mut catalog = vec![
        candidate(5.0, 5.0, 100.0, 3.0, Some(8.0)),
        candidate(1.0, 9.0, 300.0, 1.0, Some(2.0)),
        candidate(2.0, 2.0, 100.0, 5.0, Some(8.0)),
        candidate(9.0, 0.0, 250.0, 2.0, None),
    ];

    sort_candidates(&mut catalog, SortKey::QualityScore);
    for pair in catalog.windows(2) {
        assert!(pair[0].quality_score >= pair[1].quality_score);
    }
    // Equal scores (100.0): ties broken by ascending (x, y).
    let tied: Vec<f64> = catalog
        .iter()
        .filter(|c| c.quality_score == 100.0)
        .map(|c| c.x)
        .collect();
    assert_eq!(tied, vec![2.0, 5.0]);

    sort_candidates(&mut catalog, SortKey::Snr);
    for pair in catalog.windows(2) {
        assert!(pair[0].snr >= pair[1].snr);
    }

    sort_candidates(&mut catalog, SortKey::AlignedSnr);
    // Missing aligned SNR sorts last.
    assert!(catalog.last().unwrap().aligned_snr.is_none());
}

#[test]
fn test_aligned_snr_aperture() {
    let mut aligned = Array2::from_elem((64, 64), 0.1f32);
    common::add_spot(&mut aligned, 40.0, 30.0, 1.5, 5.0);

    let mut catalog = vec![candidate(40.0, 30.0, 10.0, 2.0, None)];
    attach_aligned_snr(&mut catalog, &aligned);
    let snr = catalog[0].aligned_snr.expect("aperture SNR filled");
    assert!(snr > 1.0, "bright source must have positive aligned SNR, got {snr}");
}

#[test]
fn test_catalog_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("obs_sources.txt");

    let catalog = vec![
        candidate(10.0, 20.0, 500.0, 7.0, Some(9.0)),
        candidate(30.0, 40.0, 400.0, 6.0, Some(8.0)),
    ];
    let provenance = CatalogProvenance {
        input_file: "obs_difference.fits".into(),
        stretch_method: "percentile_99.95_max".into(),
        sort_key: "quality_score".into(),
        detection_threshold: 0.0,
        min_area: 2,
        max_area: 36,
        min_circularity: 0.79,
        max_jaggedness_ratio: 1.2,
    };
    write_catalog(&path, &catalog, &provenance).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let comments = contents.lines().filter(|l| l.starts_with('#')).count();
    let rows: Vec<&str> = contents.lines().filter(|l| !l.starts_with('#')).collect();
    assert!(comments >= 5, "provenance comments present");
    assert_eq!(rows.len(), 2);

    // Fixed-width rows: 13 whitespace-separated columns.
    for row in rows {
        assert_eq!(row.split_whitespace().count(), 13, "bad row: {row}");
    }
    assert!(contents.contains("percentile_99.95_max"));
}
