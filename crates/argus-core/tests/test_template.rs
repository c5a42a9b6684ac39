use std::fs::File;

use tempfile::tempdir;

use argus_core::template::find_template;

const OBS: &str = "GY5_K096-1_No Filter_60S_Bin2_UTC20250718_171814_-12.8C_.fit";

fn touch(dir: &std::path::Path, name: &str) {
    File::create(dir.join(name)).unwrap();
}

#[test]
fn test_exact_region_index_match() {
    let dir = tempdir().unwrap();
    touch(dir.path(), "GY5_K096-1_stack.fits");
    touch(dir.path(), "GY5_K096-2_stack.fits");
    touch(dir.path(), "GY1_K096-1_stack.fits");

    let found = find_template(OBS, dir.path()).unwrap();
    assert_eq!(found.file_name().unwrap(), "GY5_K096-1_stack.fits");
}

#[test]
fn test_falls_back_to_bare_region() {
    let dir = tempdir().unwrap();
    touch(dir.path(), "GY5_K096_master.fits");

    let found = find_template(OBS, dir.path()).unwrap();
    assert_eq!(found.file_name().unwrap(), "GY5_K096_master.fits");
}

#[test]
fn test_lexicographic_first_on_multiple_matches() {
    let dir = tempdir().unwrap();
    touch(dir.path(), "GY5_K096-1_b.fits");
    touch(dir.path(), "GY5_K096-1_a.fits");

    let found = find_template(OBS, dir.path()).unwrap();
    assert_eq!(found.file_name().unwrap(), "GY5_K096-1_a.fits");
}

#[test]
fn test_wrong_telescope_or_region_is_none() {
    let dir = tempdir().unwrap();
    touch(dir.path(), "GY1_K096-1_stack.fits");
    touch(dir.path(), "GY5_K999-1_stack.fits");

    assert!(find_template(OBS, dir.path()).is_none());
}

#[test]
fn test_non_fits_files_ignored() {
    let dir = tempdir().unwrap();
    touch(dir.path(), "GY5_K096-1_readme.txt");

    assert!(find_template(OBS, dir.path()).is_none());
}

#[test]
fn test_missing_directory_is_none() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope");
    assert!(find_template(OBS, &missing).is_none());
}

#[test]
fn test_case_insensitive_matching() {
    let dir = tempdir().unwrap();
    touch(dir.path(), "gy5_k096-1_stack.fits");

    let found = find_template(OBS, dir.path()).unwrap();
    assert_eq!(found.file_name().unwrap(), "gy5_k096-1_stack.fits");
}
