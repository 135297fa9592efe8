use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Network request failed: {0}")]
    Network(String),

    #[error("Server responded with status {status}")]
    HttpStatus { status: u16, body: String },

    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Installer failed: {0}")]
    Install(String),

    #[error("Event stream error: {0}")]
    Stream(String),

    #[error("Gave up reconnecting after {0} attempts")]
    MaxRetriesExceeded(u32),

    #[error("An update download is already in progress")]
    DownloadInProgress,

    #[error("An update is already being installed")]
    InstallInProgress,

    #[error("Download cancelled")]
    Cancelled,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Response status when the error came from an HTTP exchange.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
