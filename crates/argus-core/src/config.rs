//! Pipeline configuration and the flat key/value settings store.
//!
//! Everything the pipeline needs arrives through an explicit [`Config`]
//! record passed top-down; nothing is read from the environment after
//! startup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::align::AlignMethod;
use crate::consts::{
    DEFAULT_DIFF_SIGMA, DEFAULT_NOISE_SIGMA, DEFAULT_RETRY_TIMES, DEFAULT_TIMEOUT_SECS,
};
use crate::cutouts::CutoutConfig;
use crate::denoise::NoiseMethod;
use crate::detect::catalog::SortKey;
use crate::detect::DetectConfig;
use crate::error::{ArgusError, Result};
use crate::lines::LineSuppressConfig;
use crate::stretch::StretchMethod;

/// External plate-solver invocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Solver binary, e.g. `astap`.
    pub binary: PathBuf,
    /// Extra arguments placed before the FITS path.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_solver_timeout")]
    pub timeout_secs: u64,
}

fn default_solver_timeout() -> u64 {
    300
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub download_root: PathBuf,
    pub template_dir: PathBuf,
    pub diff_root: PathBuf,

    /// Listing URL template with `{telescope}` / `{date}` / `{region}`
    /// placeholders.
    #[serde(default)]
    pub url_template: String,

    /// Worker count for the PlateSolve, Differ, and Detect stages.
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,
    #[serde(default = "default_retry_times")]
    pub retry_times: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// None disables plate solving; WCS-less observations then rely on the
    /// rigid aligner.
    #[serde(default)]
    pub solver: Option<SolverConfig>,

    #[serde(default = "default_noise_methods")]
    pub noise_methods: Vec<NoiseMethod>,
    #[serde(default = "default_noise_sigma")]
    pub noise_sigma: f32,

    #[serde(default)]
    pub alignment: AlignMethod,

    #[serde(default = "default_blur_sigma")]
    pub blur_sigma: f32,

    #[serde(default)]
    pub stretch: StretchMethod,

    #[serde(default)]
    pub suppress_lines: bool,
    #[serde(default)]
    pub line_suppress: LineSuppressConfig,

    #[serde(default)]
    pub detection: DetectConfig,
    #[serde(default)]
    pub sort_by: SortKey,

    #[serde(default)]
    pub cutouts: CutoutConfig,
}

fn default_thread_count() -> usize {
    4
}
fn default_retry_times() -> usize {
    DEFAULT_RETRY_TIMES
}
fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_noise_methods() -> Vec<NoiseMethod> {
    vec![NoiseMethod::Outlier]
}
fn default_noise_sigma() -> f32 {
    DEFAULT_NOISE_SIGMA
}
fn default_blur_sigma() -> f32 {
    DEFAULT_DIFF_SIGMA
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_root: PathBuf::from("downloads"),
            template_dir: PathBuf::from("templates"),
            diff_root: PathBuf::from("diff_output"),
            url_template: String::new(),
            thread_count: default_thread_count(),
            retry_times: default_retry_times(),
            timeout_secs: default_timeout_secs(),
            solver: None,
            noise_methods: default_noise_methods(),
            noise_sigma: default_noise_sigma(),
            alignment: AlignMethod::default(),
            blur_sigma: default_blur_sigma(),
            stretch: StretchMethod::default(),
            suppress_lines: false,
            line_suppress: LineSuppressConfig::default(),
            detection: DetectConfig::default(),
            sort_by: SortKey::default(),
            cutouts: CutoutConfig::default(),
        }
    }
}

impl Config {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|_| ArgusError::InputMissing(path.to_path_buf()))?;
        toml::from_str(&contents)
            .map_err(|e| ArgusError::ConfigInvalid(format!("{}: {e}", path.display())))
    }

    /// Validate roots and parameters; fatal at startup on failure.
    pub fn validate(&self) -> Result<()> {
        std::fs::create_dir_all(&self.download_root).map_err(|e| {
            ArgusError::ConfigInvalid(format!(
                "download root {} not writable: {e}",
                self.download_root.display()
            ))
        })?;
        std::fs::create_dir_all(&self.diff_root).map_err(|e| {
            ArgusError::ConfigInvalid(format!(
                "diff output root {} not writable: {e}",
                self.diff_root.display()
            ))
        })?;
        if !self.template_dir.is_dir() {
            return Err(ArgusError::ConfigInvalid(format!(
                "template directory {} does not exist",
                self.template_dir.display()
            )));
        }
        if self.thread_count == 0 {
            return Err(ArgusError::ConfigInvalid("thread_count must be at least 1".into()));
        }
        if self.detection.min_area > self.detection.max_area {
            return Err(ArgusError::ConfigInvalid(format!(
                "detection area window inverted: {} > {}",
                self.detection.min_area, self.detection.max_area
            )));
        }
        if self.cutouts.size == 0 {
            return Err(ArgusError::ConfigInvalid("cutout size must be nonzero".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Flat key/value persistence for last-used paths and batch defaults.
///
/// Best-effort by design: a missing or unreadable store means defaults, and
/// a failed save is logged, never fatal. The core never blocks on it.
#[derive(Clone, Debug, Default)]
pub struct ConfigStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl ConfigStore {
    pub fn load(path: &Path) -> Self {
        let values = std::fs::read_to_string(path)
            .ok()
            .and_then(|s| toml::from_str::<BTreeMap<String, String>>(&s).ok())
            .unwrap_or_default();
        Self {
            path: path.to_path_buf(),
            values,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn save(&self) {
        let Ok(serialized) = toml::to_string(&self.values) else {
            return;
        };
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&self.path, serialized) {
            warn!(path = %self.path.display(), error = %e, "settings store not saved");
        }
    }
}
