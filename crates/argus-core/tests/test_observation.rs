use std::path::Path;

use tempfile::tempdir;

use argus_core::observation::ObservationDescriptor;
use argus_core::paths::{
    cutouts_dir, detection_dir, diff_output_dir, download_path, probe_output, OutputProbe,
};

const OBS: &str = "GY3_K073-2_No Filter_60S_Bin2_UTC20250719_171814_-12.8C_.fit";

#[test]
fn test_parse_full_filename() {
    let d = ObservationDescriptor::parse(OBS).unwrap();
    assert_eq!(d.telescope, "GY3");
    assert_eq!(d.region, "K073");
    assert_eq!(d.region_index, Some(2));
    assert_eq!(d.region_full(), "K073-2");
    assert_eq!(d.exposure_secs, Some(60));
    assert_eq!(d.binning, Some(2));
    assert_eq!(d.date().as_deref(), Some("20250719"));

    let ts = d.timestamp.unwrap();
    assert_eq!(ts.format("%Y%m%d %H%M%S").to_string(), "20250719 171814");
}

#[test]
fn test_parse_from_path_and_unindexed_region() {
    let d = ObservationDescriptor::parse("/data/gy5/GY5_K096_clip.fits").unwrap();
    assert_eq!(d.telescope, "GY5");
    assert_eq!(d.region, "K096");
    assert_eq!(d.region_index, None);
    assert_eq!(d.region_full(), "K096");
    assert!(d.timestamp.is_none());
}

#[test]
fn test_parse_rejects_foreign_names() {
    assert!(ObservationDescriptor::parse("flat_frame_001.fits").is_none());
    assert!(ObservationDescriptor::parse("GY5_calibration.fits").is_none());
}

#[test]
fn test_canonical_paths() {
    let download = download_path(Path::new("/dl"), "GY5", "20250718", "K096", "a.fit");
    assert_eq!(download, Path::new("/dl/GY5/20250718/K096/a.fit"));

    let output = diff_output_dir(Path::new("/diff"), "GY5", "20250718", "K096", "a.fit");
    assert_eq!(output, Path::new("/diff/GY5/20250718/K096/a"));

    let ts = chrono::NaiveDate::from_ymd_opt(2025, 7, 18)
        .unwrap()
        .and_hms_opt(17, 18, 14)
        .unwrap();
    let detection = detection_dir(&output, ts);
    assert_eq!(
        detection,
        Path::new("/diff/GY5/20250718/K096/a/detection_20250718_171814")
    );
    assert_eq!(
        cutouts_dir(&detection),
        Path::new("/diff/GY5/20250718/K096/a/detection_20250718_171814/cutouts")
    );
}

#[test]
fn test_output_probe_states() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("job");

    assert_eq!(probe_output(&output), OutputProbe::Absent);

    std::fs::create_dir_all(&output).unwrap();
    std::fs::write(output.join("obs_difference.fits"), b"x").unwrap();
    assert_eq!(probe_output(&output), OutputProbe::Partial);

    std::fs::create_dir_all(output.join("detection_20250718_171814")).unwrap();
    assert_eq!(probe_output(&output), OutputProbe::Complete);
}

#[test]
fn test_detection_prefix_file_does_not_count() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("job");
    std::fs::create_dir_all(&output).unwrap();
    // A stray *file* with the prefix is not a completed run.
    std::fs::write(output.join("detection_notes.txt"), b"x").unwrap();
    assert_eq!(probe_output(&output), OutputProbe::Partial);
}
