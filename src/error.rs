//! Error types for domain configuration and keystore provisioning.

use std::path::PathBuf;
use std::process::ExitStatus;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The network location of the input is not valid URI syntax.
    #[error("invalid url {input:?}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The settings file is unreadable or refers to a missing env var.
    #[error("invalid settings: {0}")]
    Config(String),

    #[error("keytool not available: {0}")]
    KeytoolUnavailable(String),

    /// keytool ran but exited non-zero. `stderr` holds its diagnostics.
    #[error("keytool failed with status {status}: {stderr}")]
    KeytoolFailed { status: ExitStatus, stderr: String },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
