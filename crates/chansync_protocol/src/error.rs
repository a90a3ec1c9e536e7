//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while parsing or validating protocol data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A serialized field snapshot could not be parsed into records.
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// A resource manifest could not be parsed.
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    /// A record violates its own invariants.
    #[error("invalid record {resource_id}: {reason}")]
    InvalidRecord {
        /// Resource the record describes.
        resource_id: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A remote response body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A structure path could not be parsed.
    #[error("invalid structure path {path:?}")]
    InvalidPath {
        /// The offending path text.
        path: String,
    },
}

impl ProtocolError {
    /// Creates a snapshot error.
    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::MalformedSnapshot(message.into())
    }

    /// Creates a manifest error.
    pub fn manifest(message: impl Into<String>) -> Self {
        Self::MalformedManifest(message.into())
    }
}
