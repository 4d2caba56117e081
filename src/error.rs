//! Error taxonomy for the comparison harness.
//!
//! Every failure is fatal to the run: there is no retry and no partial
//! report. The variants mirror the stages a run moves through, so the top
//! level message always says which stage gave up.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the library.
pub type HarnessResult<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// The launched job ran but exited with a non-zero status.
    #[error("failed running `{command}` ({status}):\n{stderr}")]
    LaunchFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// The launcher itself could not be started.
    #[error("could not start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The expected numeric pattern was absent from a driver's output.
    #[error("{what}; output began with: {excerpt:?}")]
    Parse { what: String, excerpt: String },

    /// Configuration rejected before any process was launched.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown primitive '{name}'. Choose from: {valid}")]
    UnknownPrimitive { name: String, valid: String },

    /// Result sequences that must line up positionally did not.
    #[error("{context}: expected {expected} data points, got {actual}")]
    SizeMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    pub(crate) fn parse(what: impl Into<String>, output: &str) -> Self {
        const EXCERPT_LEN: usize = 200;
        let excerpt = output.chars().take(EXCERPT_LEN).collect();
        HarnessError::Parse {
            what: what.into(),
            excerpt,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HarnessError::Io {
            path: path.into(),
            source,
        }
    }
}
