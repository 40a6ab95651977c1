use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::server::types::{InstallStage, SoftwareType};

/// Typed failures raised by every provisioning stage.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("cannot resolve host {host}: {hint}")]
    NetworkUnreachable { host: String, hint: String },

    #[error("download of {url} failed: {message}")]
    Download { url: String, message: String },

    #[error("upstream request to {url} failed: {message}")]
    Upstream { url: String, message: String },

    #[error("{software} version {requested} was not found upstream: {detail}")]
    UpstreamVersionNotFound {
        software: SoftwareType,
        requested: String,
        detail: String,
    },

    #[error("invalid build identifier {0:?}")]
    InvalidBuildIdentifier(String),

    #[error("integrity check failed for {path:?}: {detail}")]
    DownloadIntegrityFailure { path: PathBuf, detail: String },

    #[error("failed to extract {archive:?}: {detail}")]
    ArchiveExtractionFailure { archive: PathBuf, detail: String },

    #[error("loader installer {}: {stderr_tail}", describe_exit(.exit_code))]
    InstallerProcessFailed {
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    #[error("Java {label} is unavailable: {message}")]
    JavaUnavailable { label: String, message: String },

    #[error("invalid install request: {0}")]
    InvalidRequest(String),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the crate.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with code {}", code),
        None => "was terminated without an exit code".to_string(),
    }
}

impl ProvisionError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProvisionError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn extraction(archive: &Path, detail: impl std::fmt::Display) -> Self {
        ProvisionError::ArchiveExtractionFailure {
            archive: archive.to_path_buf(),
            detail: detail.to_string(),
        }
    }

    /// True for failures caused by the network rather than by content.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            ProvisionError::NetworkUnreachable { .. }
                | ProvisionError::Download { .. }
                | ProvisionError::Upstream { .. }
        )
    }
}

impl From<tokio::task::JoinError> for ProvisionError {
    fn from(e: tokio::task::JoinError) -> Self {
        ProvisionError::Task(e.to_string())
    }
}

/// Attaches the offending path to `std::io` errors.
pub trait IoResultExt<T> {
    fn at_path(self, path: &Path) -> ProvisionResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at_path(self, path: &Path) -> ProvisionResult<T> {
        self.map_err(|e| ProvisionError::io(path, e))
    }
}

/// Terminal failure of one `install()` call, with the context an operator
/// needs to act on it.
#[derive(Debug, Error)]
#[error("{software} install into {target_dir:?} failed while {stage}: {error}{}", hint_suffix(.hint))]
pub struct InstallFailure {
    pub software: SoftwareType,
    pub target_dir: PathBuf,
    pub stage: InstallStage,
    #[source]
    pub error: ProvisionError,
    pub hint: Option<String>,
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(hint) => format!(" ({})", hint),
        None => String::new(),
    }
}
