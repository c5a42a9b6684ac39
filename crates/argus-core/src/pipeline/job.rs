//! Job identity and lifecycle.

use std::path::PathBuf;

use crate::error::ErrorKind;

pub type JobId = usize;

/// The four pipeline stages, in visiting order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStage {
    Download,
    PlateSolve,
    Differ,
    Detect,
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStage::Download => write!(f, "download"),
            JobStage::PlateSolve => write!(f, "plate-solve"),
            JobStage::Differ => write!(f, "differ"),
            JobStage::Detect => write!(f, "detect"),
        }
    }
}

/// Job status as surfaced to the UI.
#[derive(Clone, Debug, PartialEq)]
pub enum JobStatus {
    Pending,
    Downloading,
    Downloaded,
    Solving,
    Solved,
    Differing,
    Differed,
    Detecting,
    Done { sources: usize },
    Skipped { reason: String },
    Failed { kind: ErrorKind, reason: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Done { .. } | JobStatus::Skipped { .. } | JobStatus::Failed { .. }
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Downloading => write!(f, "downloading"),
            JobStatus::Downloaded => write!(f, "downloaded"),
            JobStatus::Solving => write!(f, "solving"),
            JobStatus::Solved => write!(f, "solved"),
            JobStatus::Differing => write!(f, "differing"),
            JobStatus::Differed => write!(f, "differed"),
            JobStatus::Detecting => write!(f, "detecting"),
            JobStatus::Done { sources } => write!(f, "done ({sources} sources)"),
            JobStatus::Skipped { reason } => write!(f, "skipped: {reason}"),
            JobStatus::Failed { kind, reason } => write!(f, "failed: {}: {reason}", kind.as_str()),
        }
    }
}

/// One observation selected for processing.
#[derive(Clone, Debug)]
pub struct JobSpec {
    pub filename: String,
    pub url: String,
    /// Remote size in bytes when the listing reported one.
    pub size: u64,
    pub telescope: String,
    /// Observation night, `YYYYMMDD`.
    pub date: String,
    pub region: String,
}

/// One observation in flight through the stages.
#[derive(Clone, Debug)]
pub struct PipelineJob {
    pub id: JobId,
    pub spec: JobSpec,
    /// Local path of the downloaded FITS.
    pub local_path: PathBuf,
    /// Root output directory for this job's diff products.
    pub output_dir: PathBuf,
}

/// Read-only job snapshot for the UI.
#[derive(Clone, Debug)]
pub struct JobRecord {
    pub id: JobId,
    pub filename: String,
    pub status: JobStatus,
    /// Wall-clock seconds spent per completed stage.
    pub stage_secs: Vec<(JobStage, f64)>,
}
