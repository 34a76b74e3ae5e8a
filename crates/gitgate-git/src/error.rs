//! Error types for gitgate-git

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The protocol backend executable could not be started at all.
    #[error("Protocol backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend exited unsuccessfully without producing any output.
    #[error("Protocol backend failed (exit code {code:?}): {stderr}")]
    BackendFailure { code: Option<i32>, stderr: String },

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("Protocol backend timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
