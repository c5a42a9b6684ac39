//! Download stage internals: one HTTP fetch with retry and progress.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{ArgusError, Result};
use crate::pipeline::ProgressSink;

const CHUNK_SIZE: usize = 8192;

pub fn build_client(timeout: Duration) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(true)
        .no_proxy()
        .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64)")
        .build()
        .map_err(|e| ArgusError::Network {
            attempts: 0,
            detail: e.to_string(),
        })
}

/// True when the file already exists on disk with a nonzero size.
pub fn already_downloaded(dest: &Path) -> bool {
    dest.metadata().map(|m| m.len() > 0).unwrap_or(false)
}

/// Fetch `url` to `dest`, retrying with exponential backoff (2^attempt
/// seconds). A zero-byte body counts as a failure. On persistent failure the
/// partial file is removed and a `Network` error returned.
pub fn download_file(
    client: &reqwest::blocking::Client,
    url: &str,
    dest: &Path,
    retry_times: usize,
    progress: &dyn ProgressSink,
    filename: &str,
) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let attempts = retry_times.max(1);
    let mut last_error = String::new();
    for attempt in 0..attempts {
        match fetch_once(client, url, dest, progress, filename) {
            Ok(bytes) => {
                info!(filename, bytes, "download complete");
                return Ok(bytes);
            }
            Err(e) => {
                last_error = e.to_string();
                if attempt + 1 < attempts {
                    let backoff = Duration::from_secs(1 << attempt);
                    warn!(
                        filename,
                        attempt = attempt + 1,
                        attempts,
                        error = %last_error,
                        backoff_secs = backoff.as_secs(),
                        "download failed; retrying"
                    );
                    std::thread::sleep(backoff);
                }
            }
        }
    }

    let _ = std::fs::remove_file(dest);
    Err(ArgusError::Network {
        attempts,
        detail: format!("{url}: {last_error}"),
    })
}

fn fetch_once(
    client: &reqwest::blocking::Client,
    url: &str,
    dest: &Path,
    progress: &dyn ProgressSink,
    filename: &str,
) -> Result<u64> {
    let mut response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| ArgusError::Network {
            attempts: 1,
            detail: e.to_string(),
        })?;
    let total = response.content_length();

    let mut file = File::create(dest)?;
    let mut downloaded = 0u64;
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let n = response.read(&mut chunk).map_err(|e| ArgusError::Network {
            attempts: 1,
            detail: e.to_string(),
        })?;
        if n == 0 {
            break;
        }
        file.write_all(&chunk[..n])?;
        downloaded += n as u64;
        progress.progress(downloaded, total, filename);
    }
    file.flush()?;

    if downloaded == 0 {
        return Err(ArgusError::Network {
            attempts: 1,
            detail: "downloaded file is empty".into(),
        });
    }
    Ok(downloaded)
}
