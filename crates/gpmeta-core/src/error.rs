//! Error types for the crawl and enrichment stages.
//!
//! Unit-of-work errors (one field, one row, one file) are recovered by the
//! orchestrators; only [`NavError`] from a page load ends a crawl.

use std::path::PathBuf;
use std::time::Duration;

/// Failure reported by a [`Navigator`](crate::navigator::Navigator) session.
#[derive(Debug, thiserror::Error)]
pub enum NavError {
    /// Page or control never appeared within the wait budget.
    #[error("navigation timeout after {waited:?}: {what}")]
    Timeout { what: String, waited: Duration },

    /// The session could not be built or died underneath us.
    #[error("navigator session error: {0}")]
    Session(String),
}

impl NavError {
    pub fn timeout(what: impl Into<String>, waited: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            waited,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Idempotent no-op: the link already has a record.
    #[error("already committed: {0}")]
    AlreadyCommitted(String),

    #[error("ledger I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("ledger format error: {0}")]
    Csv(#[from] csv::Error),
}

impl LedgerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Reason a ledger row was skipped during enrichment.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowError {
    #[error("missing fields: {0}")]
    Validation(String),

    #[error("invalid latitude/longitude: {latitude:?}, {longitude:?}")]
    CoordinateParse { latitude: String, longitude: String },

    #[error("geocoding not implemented for {0:?}; provide latitude/longitude")]
    GeocodeUnavailable(String),

    #[error("file not found: {0:?}")]
    FileNotFound(PathBuf),
}

/// Failure of the external transcoding capability.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Failed { program: String, status: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TagError {
    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error("could not replace {path:?} with tagged copy: {source}")]
    Replace {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not move {from:?} to {to:?}: {source}")]
    Relocate {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

/// The run stopped because its [`CancellationToken`](crate::CancellationToken)
/// was cancelled.
#[derive(Debug, Clone, thiserror::Error)]
#[error("operation cancelled")]
pub struct CancelledError;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("profile lock {path:?} still held after {waited:?}; close the browser and retry")]
    Held { path: PathBuf, waited: Duration },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
}
