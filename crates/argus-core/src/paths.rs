//! Canonical on-disk layout.
//!
//! Download: `<download_root>/<telescope>/<YYYYMMDD>/<region>/<filename>`.
//! Diff output: `<diff_root>/<telescope>/<YYYYMMDD>/<region>/<stem>/`, with
//! one timestamped `detection_YYYYMMDD_HHMMSS/` directory per completed run
//! and cutouts inside it.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

/// Local path for a downloaded observation.
pub fn download_path(
    download_root: &Path,
    telescope: &str,
    date: &str,
    region: &str,
    filename: &str,
) -> PathBuf {
    download_root
        .join(telescope)
        .join(date)
        .join(region)
        .join(filename)
}

/// Root output directory for one observation's diff products.
pub fn diff_output_dir(
    diff_root: &Path,
    telescope: &str,
    date: &str,
    region: &str,
    filename: &str,
) -> PathBuf {
    let stem = file_stem(filename);
    diff_root
        .join(telescope)
        .join(date)
        .join(region)
        .join(stem)
}

/// Timestamped detection directory inside a job's output directory.
pub fn detection_dir(output_dir: &Path, timestamp: NaiveDateTime) -> PathBuf {
    output_dir.join(format!("detection_{}", timestamp.format("%Y%m%d_%H%M%S")))
}

/// Cutout directory inside a detection directory.
pub fn cutouts_dir(detection_dir: &Path) -> PathBuf {
    detection_dir.join("cutouts")
}

fn file_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string())
}

/// What a job's output directory already holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputProbe {
    /// Directory does not exist.
    Absent,
    /// Directory exists but holds no completed detection run.
    Partial,
    /// At least one `detection_*` subdirectory exists; skip-eligible.
    Complete,
}

/// Probe a job's output directory for prior results.
pub fn probe_output(output_dir: &Path) -> OutputProbe {
    if !output_dir.exists() {
        return OutputProbe::Absent;
    }
    let Ok(entries) = std::fs::read_dir(output_dir) else {
        return OutputProbe::Absent;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("detection_") && entry.path().is_dir() {
            return OutputProbe::Complete;
        }
    }
    OutputProbe::Partial
}
