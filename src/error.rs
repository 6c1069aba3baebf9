use std::path::PathBuf;

use thiserror::Error;

/// Batch-aborting failures. Anything per-record is logged and absorbed instead.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{} not found (run `link_archive fetch-links` first)", .0.display())]
    DataFileMissing(PathBuf),

    #[error("{0} environment variable is not set")]
    MissingEnv(&'static str),

    #[error("thread {0} not found or not accessible")]
    ThreadNotFound(String),

    #[error("Discord API returned {status} for {endpoint}")]
    Discord {
        endpoint: String,
        status: reqwest::StatusCode,
    },
}
