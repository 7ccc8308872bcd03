//! Common error types for omnistore.

use std::fmt;
use thiserror::Error;

/// The backend operation a failure is attributed to.
///
/// Network-facing failures are always classified into one of these kinds so
/// callers can tell "backend said no" apart from "malformed request".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Metadata,
    Download,
    Upload,
    Delete,
    Copy,
    Move,
    CreateFolder,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Metadata => "metadata",
            OperationKind::Download => "download",
            OperationKind::Upload => "upload",
            OperationKind::Delete => "delete",
            OperationKind::Copy => "copy",
            OperationKind::Move => "move",
            OperationKind::CreateFolder => "create folder",
        };
        f.write_str(name)
    }
}

/// Top-level error type for omnistore operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No path was supplied.
    #[error("Must specify path")]
    EmptyPath,

    /// The path is malformed or would alter itself under canonicalization.
    #[error("Invalid path '{0}' specified")]
    InvalidPath(String),

    /// The target does not exist, or cannot exist given the namespace shape.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Metadata lookup completed with an unexpected response.
    #[error("Metadata error{}: {message}", fmt_status(.status))]
    Metadata { status: Option<u16>, message: String },

    /// Download completed with an unexpected response.
    #[error("Download error{}: {message}", fmt_status(.status))]
    Download { status: Option<u16>, message: String },

    /// Upload completed with an unexpected response.
    #[error("Upload error{}: {message}", fmt_status(.status))]
    Upload { status: Option<u16>, message: String },

    /// Delete completed with an unexpected response.
    #[error("Delete error{}: {message}", fmt_status(.status))]
    Delete { status: Option<u16>, message: String },

    /// Backend-side copy failed.
    #[error("Copy error{}: {message}", fmt_status(.status))]
    Copy { status: Option<u16>, message: String },

    /// Backend-side move failed.
    #[error("Move error{}: {message}", fmt_status(.status))]
    Move { status: Option<u16>, message: String },

    /// Folder creation completed with an unexpected response.
    #[error("Create folder error{}: {message}", fmt_status(.status))]
    CreateFolder { status: Option<u16>, message: String },

    /// A mutating operation was attempted against a read-only backend.
    #[error("Provider '{0}' is read-only")]
    ReadOnlyProvider(String),

    /// The destination already holds an entry and the caller asked not to replace it.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The operation was cancelled while suspended.
    #[error("Operation cancelled")]
    Cancelled,

    /// Backend resolution or settings are invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Local I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl Error {
    /// Build the error of the given operation kind.
    pub fn operation(kind: OperationKind, status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            OperationKind::Metadata => Error::Metadata { status, message },
            OperationKind::Download => Error::Download { status, message },
            OperationKind::Upload => Error::Upload { status, message },
            OperationKind::Delete => Error::Delete { status, message },
            OperationKind::Copy => Error::Copy { status, message },
            OperationKind::Move => Error::Move { status, message },
            OperationKind::CreateFolder => Error::CreateFolder { status, message },
        }
    }

    /// Backend status carried by an operation error, if any.
    pub fn backend_status(&self) -> Option<u16> {
        match self {
            Error::Metadata { status, .. }
            | Error::Download { status, .. }
            | Error::Upload { status, .. }
            | Error::Delete { status, .. }
            | Error::Copy { status, .. }
            | Error::Move { status, .. }
            | Error::CreateFolder { status, .. } => *status,
            _ => None,
        }
    }

    /// Suggested HTTP status class for presenting this error to a client.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::EmptyPath | Error::InvalidPath(_) | Error::Configuration(_) => 400,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::Cancelled => 499,
            Error::Io(_) | Error::Serialization(_) => 500,
            _ => 502,
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
