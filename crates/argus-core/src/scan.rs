//! Remote directory scanning.
//!
//! The survey archive exposes plain HTML directory listings:
//! `<base>/<telescope>/<date>/<region>/` pages link the FITS frames of one
//! region, and the `<telescope>/<date>/` page links its region
//! subdirectories. The scanner is a thin contract; anything smarter
//! (crawling, caching, auth) lives outside the core.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{info, warn};

use crate::error::{ArgusError, Result};

/// One remote file from a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteFile {
    pub filename: String,
    pub url: String,
    /// Size in bytes; 0 when the listing does not report one.
    pub size: u64,
}

/// Inbound scanner contract: given a URL, yield the FITS files it lists.
pub trait Scanner: Send + Sync {
    fn scan(&self, url: &str) -> Result<Vec<RemoteFile>>;
}

/// Scanner over Apache-style HTML directory listings.
pub struct DirectoryScanner {
    client: reqwest::blocking::Client,
}

impl DirectoryScanner {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .no_proxy()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64)")
            .build()
            .map_err(|e| ArgusError::Network {
                attempts: 0,
                detail: e.to_string(),
            })?;
        Ok(Self { client })
    }

    fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| ArgusError::Network {
                attempts: 1,
                detail: format!("{url}: {e}"),
            })?;
        response.text().map_err(|e| ArgusError::Network {
            attempts: 1,
            detail: e.to_string(),
        })
    }

    /// Region subdirectories (`K###`) of a telescope/date listing page.
    pub fn scan_regions(&self, url: &str) -> Result<Vec<String>> {
        let content = self.fetch(url)?;
        let mut regions: Vec<String> = Vec::new();
        for href in hrefs(&content) {
            let name = href.trim_end_matches('/').rsplit('/').next().unwrap_or("");
            if region_regex().is_match(name) {
                let region = name.to_uppercase();
                if !regions.contains(&region) {
                    regions.push(region);
                }
            }
        }
        regions.sort();
        info!(url, regions = regions.len(), "region scan complete");
        Ok(regions)
    }
}

impl Scanner for DirectoryScanner {
    fn scan(&self, url: &str) -> Result<Vec<RemoteFile>> {
        let content = self.fetch(url)?;
        let mut files = Vec::new();
        for href in hrefs(&content) {
            let clean = href.split(['?', '#']).next().unwrap_or("");
            if !is_fits_href(clean) {
                continue;
            }
            let filename = clean.rsplit('/').next().unwrap_or(clean).to_string();
            let url = join_url(url, clean);
            files.push(RemoteFile {
                filename,
                url,
                size: 0,
            });
        }
        // Directory listings put the size column right after each link.
        fill_sizes(&content, &mut files);
        info!(files = files.len(), "file scan complete");
        Ok(files)
    }
}

fn hrefs(html: &str) -> Vec<String> {
    href_regex()
        .captures_iter(html)
        .map(|c| c[1].to_string())
        .collect()
}

fn is_fits_href(href: &str) -> bool {
    let lower = href.to_lowercase();
    lower.ends_with(".fits") || lower.ends_with(".fit") || lower.ends_with(".fts")
}

fn join_url(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if href.starts_with('/') {
        // Scheme + host of the base.
        if let Some(scheme_end) = base.find("://") {
            if let Some(host_end) = base[scheme_end + 3..].find('/') {
                return format!("{}{}", &base[..scheme_end + 3 + host_end], href);
            }
        }
        return format!("{}{}", base.trim_end_matches('/'), href);
    }
    format!("{}/{}", base.trim_end_matches('/'), href)
}

/// Best-effort size extraction: for each filename, look for a byte count on
/// the listing line that mentions it. Missing sizes stay 0.
fn fill_sizes(html: &str, files: &mut [RemoteFile]) {
    for line in html.lines() {
        for file in files.iter_mut() {
            if file.size == 0 && line.contains(&file.filename) {
                if let Some(c) = size_regex().captures(line) {
                    if let Ok(size) = c[1].parse::<u64>() {
                        file.size = size;
                    }
                }
            }
        }
    }
    let missing = files.iter().filter(|f| f.size == 0).count();
    if missing > 0 {
        warn!(missing, "listing did not report sizes for some files");
    }
}

fn href_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r#"(?i)<a\s+[^>]*href\s*=\s*["']([^"']+)["']"#).unwrap())
}

fn region_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"(?i)^K\d{3}$").unwrap())
}

fn size_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"\s(\d{4,})\s*$").unwrap())
}

/// Expand a URL template with `{telescope}`, `{date}`, `{region}`, and
/// `{year}` placeholders.
pub fn expand_url_template(template: &str, telescope: &str, date: &str, region: &str) -> String {
    template
        .replace("{telescope}", telescope)
        .replace("{date}", date)
        .replace("{region}", region)
        .replace("{year}", date.get(..4).unwrap_or(""))
        .trim_end_matches('/')
        .to_string()
}
