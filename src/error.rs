//! Error taxonomy for the orchestration engine
//!
//! Every failure class an orchestration operation can return. Errors are
//! ordinary result values, never control flow; each variant carries the
//! path, port, or diagnostic line the caller needs to render a precise
//! message.

use std::path::PathBuf;
use thiserror::Error;

/// Engine-level errors returned by orchestration operations
#[derive(Debug, Error)]
pub enum Error {
    /// Bad port or site directory; returned before any process is touched
    #[error("invalid {what}: {reason}")]
    Validation { what: String, reason: String },

    /// Hidden-service directory mode or ownership could not be enforced
    #[error("could not enforce permissions on {path}: {reason}")]
    Permission { path: PathBuf, reason: String },

    /// Config file write failed; no partial content is left behind
    #[error("failed to write config {path}: {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Executable missing or the process exited immediately
    #[error("failed to start {process}: {reason}")]
    ProcessStart { process: String, reason: String },

    /// Bootstrap did not reach 100% within the wall-clock bound.
    /// The relay process is left running; the caller may keep waiting
    /// for the address or stop the service explicitly.
    #[error("tor bootstrap timed out after {seconds}s at {percent}%")]
    BootstrapTimeout { seconds: u64, percent: u8 },

    /// Relay exited or reported a fatal diagnostic before reaching 100%
    #[error("tor bootstrap failed: {reason}")]
    BootstrapFailed { reason: String },

    /// The caller cancelled the bootstrap watch; the relay keeps running
    #[error("bootstrap watch cancelled")]
    WatchCancelled,

    /// Persisted service configuration could not be loaded or saved
    #[error("failed to access state file {path}: {source}")]
    State {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Partial failure while stopping; both processes were attempted
    #[error("stop completed with errors: {summary}")]
    StopPartial { summary: String },

    /// IO with no more specific classification
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            what: what.into(),
            reason: reason.into(),
        }
    }

    pub fn process_start(process: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ProcessStart {
            process: process.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
