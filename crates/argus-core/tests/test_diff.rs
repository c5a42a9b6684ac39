mod common;

use ndarray::Array2;

use argus_core::diff::{build_difference, mask_bbox, overlap_mask};

use common::add_spot;

#[test]
fn test_shapes_and_mask_semantics() {
    let reference = Array2::from_elem((32, 32), 0.2f32);
    let mut aligned = Array2::from_elem((32, 32), 0.2f32);
    // Simulate a non-overlap band on the left, as alignment leaves it.
    for r in 0..32 {
        for c in 0..6 {
            aligned[[r, c]] = 0.0;
        }
    }

    let diff = build_difference(&reference, &aligned, 1.0);
    assert_eq!(diff.data.dim(), (32, 32));
    assert_eq!(diff.overlap_mask.dim(), (32, 32));

    for r in 0..32 {
        for c in 0..6 {
            assert_eq!(diff.overlap_mask[[r, c]], 0);
            assert_eq!(diff.data[[r, c]], 0.0, "non-overlap must be zeroed, not NaN");
        }
        assert_eq!(diff.overlap_mask[[r, 20]], 1);
    }

    let bbox = diff.bbox.expect("overlap exists");
    assert_eq!(bbox.x_min, 6);
    assert_eq!(bbox.x_max, 31);
    assert_eq!(bbox.y_min, 0);
    assert_eq!(bbox.y_max, 31);
}

#[test]
fn test_all_zero_template_gives_empty_overlap() {
    let reference = Array2::<f32>::zeros((24, 24));
    let mut aligned = Array2::from_elem((24, 24), 0.3f32);
    add_spot(&mut aligned, 12.0, 12.0, 2.0, 1.0);

    let diff = build_difference(&reference, &aligned, 1.0);
    assert!(diff.overlap_mask.iter().all(|&m| m == 0));
    assert!(diff.data.iter().all(|&v| v == 0.0));
    assert!(diff.bbox.is_none());
}

#[test]
fn test_identical_inputs_difference_near_zero() {
    let mut reference = Array2::from_elem((48, 48), 0.15f32);
    add_spot(&mut reference, 20.0, 24.0, 1.5, 2.0);
    let aligned = reference.clone();

    let diff = build_difference(&reference, &aligned, 1.0);
    let max = diff.data.iter().cloned().fold(0.0f32, f32::max);
    assert!(max < 1e-6, "identical inputs must difference to ~0, got {max}");
}

#[test]
fn test_transient_survives_differencing() {
    let mut reference = Array2::from_elem((64, 64), 0.15f32);
    add_spot(&mut reference, 16.0, 16.0, 1.5, 2.0); // a star in both
    let mut aligned = reference.clone();
    add_spot(&mut aligned, 40.0, 30.0, 1.5, 3.0); // the transient

    let diff = build_difference(&reference, &aligned, 1.0);

    // The difference peaks at the transient and stays quiet at the star.
    let at_transient = diff.data[[30, 40]];
    let at_star = diff.data[[16, 16]];
    assert!(at_transient > 0.05, "transient must remain, got {at_transient}");
    assert!(at_star < at_transient / 5.0);
}

#[test]
fn test_mask_bbox_empty_and_point() {
    let empty = Array2::<u8>::zeros((8, 8));
    assert!(mask_bbox(&empty).is_none());

    let mut single = Array2::<u8>::zeros((8, 8));
    single[[3, 5]] = 1;
    let bbox = mask_bbox(&single).unwrap();
    assert_eq!((bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max), (5, 3, 5, 3));
}

#[test]
fn test_overlap_requires_both_inputs() {
    let mut a = Array2::from_elem((4, 4), 1.0f32);
    let mut b = Array2::from_elem((4, 4), 1.0f32);
    a[[0, 0]] = 0.0;
    b[[1, 1]] = f32::NAN;
    let mask = overlap_mask(&a, &b);
    assert_eq!(mask[[0, 0]], 0);
    assert_eq!(mask[[1, 1]], 0);
    assert_eq!(mask[[2, 2]], 1);
}
