//! Error types for the sync engine.

use chansync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during a sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A diffed field snapshot could not be parsed.
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// A resource manifest could not be parsed or holds an invalid record.
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    /// An expected structure placement could not be found.
    #[error("structure resolution failed: {0}")]
    StructureResolution(String),

    /// Non-success status or transport failure talking to the remote side.
    #[error("network error: {message}")]
    TransientNetwork {
        /// Error message.
        message: String,
        /// HTTP status, when the server answered at all.
        status: Option<u16>,
    },

    /// The remote importer reported an error status.
    #[error("remote import failed: {0}")]
    RemoteImport(String),

    /// An external collaborator failed.
    #[error("{collaborator} failed: {message}")]
    Collaborator {
        /// Which collaborator.
        collaborator: &'static str,
        /// Error message.
        message: String,
    },

    /// Local I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Creates a network error from a transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransientNetwork {
            message: message.into(),
            status: None,
        }
    }

    /// Creates a network error from a non-success HTTP status.
    pub fn http_status(status: u16, url: &str) -> Self {
        Self::TransientNetwork {
            message: format!("{} returned {}", url, status),
            status: Some(status),
        }
    }

    /// Creates a collaborator error.
    pub fn collaborator(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator,
            message: message.into(),
        }
    }

    /// Returns true if re-running the whole event might succeed.
    ///
    /// The engine never retries by itself; this is a hint for the host.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::TransientNetwork { .. } | SyncError::Io(_))
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::MalformedSnapshot(message) => SyncError::MalformedSnapshot(message),
            ProtocolError::InvalidResponse(message) => SyncError::TransientNetwork {
                message,
                status: None,
            },
            other => SyncError::MalformedManifest(other.to_string()),
        }
    }
}
