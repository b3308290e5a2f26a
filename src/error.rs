//! Error types for streamctl
//!
//! Components report success to the orchestrator as plain booleans or
//! outcome enums. This type is for the plumbing underneath them.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid resolution {0:?}, expected WIDTHxHEIGHT (e.g. 1920x1080)")]
    InvalidResolution(String),

    #[error("Underlying I/O error")]
    IOError(#[from] std::io::Error),

    #[error("Malformed JSON")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Could not read archive")]
    Zip(#[from] zip::result::ZipError),

    #[error("Archive entry {0:?} escapes the extraction directory")]
    UnsafeArchivePath(String),

    #[error("Checksum mismatch, expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Missing IGDB credentials")]
    MissingCredentials,

    #[error("{0} is not available on this platform")]
    Unavailable(&'static str),

    #[error("{0}")]
    Platform(String),
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        Error::Http(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
