//! Error types of the session core.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::conversation::ArchiveId;

/// Failures of a persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Local file I/O failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A value could not be encoded or decoded.
    #[error("serialization error for key '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The key cannot be mapped onto the backend.
    #[error("invalid key '{0}'")]
    InvalidKey(String),

    /// The remote store could not be reached.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote store answered with an error status.
    #[error("object store returned {status}: {body}")]
    Remote { status: u16, body: String },
}

/// Failures reported by the session controller.
///
/// Backend failures are never reported here; they become error messages in
/// the transcript instead.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The referenced chat log is not in the archive.
    #[error("chat log #{id} not found")]
    NotFound { id: ArchiveId },

    /// Reading or writing chat history failed.
    #[error("failed to persist chat history: {0}")]
    Persistence(#[from] StoreError),
}

/// Failures while writing an exported chat log.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write chat log to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}, expected {expected}")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("missing required setting {0}")]
    Missing(&'static str),
}

/// Failures of an account store.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("account storage failed: {0}")]
    Store(#[from] StoreError),

    #[error("stored account record is corrupt: {0}")]
    Corrupt(String),
}
