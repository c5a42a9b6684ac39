use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArgusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("Input missing: {}", .0.display())]
    InputMissing(PathBuf),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Network error after {attempts} attempt(s): {detail}")]
    Network { attempts: usize, detail: String },

    #[error("External tool failure: {0}")]
    ExternalTool(String),

    #[error("Alignment failed: {0}")]
    AlignmentFailed(String),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

/// Terminal-status classification of an error, independent of its payload.
/// Used for job statuses and the per-directory error log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigInvalid,
    InputMissing,
    NetworkFatal,
    ExternalToolFailure,
    AlignmentFailed,
    IoError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigInvalid => "config_invalid",
            ErrorKind::InputMissing => "input_missing",
            ErrorKind::NetworkFatal => "network_fatal",
            ErrorKind::ExternalToolFailure => "external_tool_failure",
            ErrorKind::AlignmentFailed => "alignment_failed",
            ErrorKind::IoError => "io_error",
        }
    }
}

impl ArgusError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArgusError::Io(_) | ArgusError::InvalidFits(_) | ArgusError::ImageError(_) => {
                ErrorKind::IoError
            }
            ArgusError::InputMissing(_) => ErrorKind::InputMissing,
            ArgusError::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
            ArgusError::Network { .. } => ErrorKind::NetworkFatal,
            ArgusError::ExternalTool(_) => ErrorKind::ExternalToolFailure,
            ArgusError::AlignmentFailed(_) => ErrorKind::AlignmentFailed,
            ArgusError::Pipeline(_) => ErrorKind::IoError,
        }
    }
}

pub type Result<T> = std::result::Result<T, ArgusError>;
