//! Append-only per-directory error log.
//!
//! Each job's output directory accumulates a `diff_error_log.txt` with one
//! tab-separated row per event: timestamp, file, kind, detail.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use tracing::warn;

pub const ERROR_LOG_NAME: &str = "diff_error_log.txt";

/// Append one row. Best-effort: a log write failure is itself only logged.
pub fn append(dir: &Path, file: &str, kind: &str, detail: &str) {
    if std::fs::create_dir_all(dir).is_err() {
        warn!(dir = %dir.display(), "error log directory not creatable");
        return;
    }
    let path = dir.join(ERROR_LOG_NAME);
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let row = format!("{timestamp}\t{file}\t{kind}\t{detail}\n");

    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut f| f.write_all(row.as_bytes()));
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "error log row not written");
    }
}
