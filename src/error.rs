use std::path::PathBuf;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Run-level errors. Anything here aborts the run; per-job problems are
/// recorded on the job's `AnalysisResult` instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Input error ({path}): {message}")]
    Input { path: PathBuf, message: String },

    #[error("Failed to persist progress to {path}: {message}")]
    Persistence { path: PathBuf, message: String },

    #[error(
        "Progress file {path} belongs to a different input: {message}. \
         Rerun with --fresh to discard it, or pick another output directory with -o"
    )]
    ProgressMismatch { path: PathBuf, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Worker error: {0}")]
    Worker(String),
}

impl PipelineError {
    pub fn input(path: impl Into<PathBuf>, err: impl ToString) -> Self {
        PipelineError::Input {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, err: impl ToString) -> Self {
        PipelineError::Persistence {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        PipelineError::Report(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Report(err.to_string())
    }
}
