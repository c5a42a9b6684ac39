//! Observation filename parsing.
//!
//! Survey frames are named like
//! `GY3_K073-2_No Filter_60S_Bin2_UTC20250719_171814_-12.8C_.fit`:
//! telescope id, sky-region tile with sub-index, filter, exposure, binning,
//! UTC timestamp, sensor temperature.

use std::path::Path;
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;

/// Identity of one observation within a night, parsed from its filename.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservationDescriptor {
    /// Telescope id, e.g. `GY5`.
    pub telescope: String,
    /// Sky-region tile, e.g. `K096`.
    pub region: String,
    /// Tile sub-index, e.g. `1` in `K096-1`; absent on some older frames.
    pub region_index: Option<u32>,
    /// UTC timestamp of the exposure start.
    pub timestamp: Option<NaiveDateTime>,
    /// Exposure length in seconds.
    pub exposure_secs: Option<u32>,
    /// Sensor binning factor.
    pub binning: Option<u32>,
}

impl ObservationDescriptor {
    /// Parse a descriptor from a filename or path. Returns `None` when the
    /// telescope or region token is missing.
    pub fn parse(filename: &str) -> Option<Self> {
        let name = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());

        let telescope = regexes().telescope.captures(&name)?[1].to_uppercase();
        let region_caps = regexes().region.captures(&name)?;
        let region = region_caps[1].to_uppercase();
        let region_index = region_caps.get(2).and_then(|m| m.as_str().parse().ok());

        let timestamp = regexes().utc.captures(&name).and_then(|c| {
            NaiveDateTime::parse_from_str(&format!("{} {}", &c[1], &c[2]), "%Y%m%d %H%M%S").ok()
        });
        let exposure_secs = regexes()
            .exposure
            .captures(&name)
            .and_then(|c| c[1].parse().ok());
        let binning = regexes()
            .binning
            .captures(&name)
            .and_then(|c| c[1].parse().ok());

        Some(Self {
            telescope,
            region,
            region_index,
            timestamp,
            exposure_secs,
            binning,
        })
    }

    /// Region with its sub-index, e.g. `K096-1`; bare region when unindexed.
    pub fn region_full(&self) -> String {
        match self.region_index {
            Some(i) => format!("{}-{}", self.region, i),
            None => self.region.clone(),
        }
    }

    /// Observation date as `YYYYMMDD`, when the filename carries a timestamp.
    pub fn date(&self) -> Option<String> {
        self.timestamp.map(|t| t.format("%Y%m%d").to_string())
    }
}

struct Regexes {
    telescope: Regex,
    region: Regex,
    utc: Regex,
    exposure: Regex,
    binning: Regex,
}

fn regexes() -> &'static Regexes {
    static CELL: OnceLock<Regexes> = OnceLock::new();
    CELL.get_or_init(|| Regexes {
        telescope: Regex::new(r"(?i)(GY\d+)").unwrap(),
        region: Regex::new(r"(?i)(K\d{3})(?:-(\d+))?").unwrap(),
        utc: Regex::new(r"UTC(\d{8})_(\d{6})").unwrap(),
        exposure: Regex::new(r"_(\d+)S_").unwrap(),
        binning: Regex::new(r"(?i)_Bin(\d+)").unwrap(),
    })
}
