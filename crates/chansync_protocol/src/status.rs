//! Remote import status tokens.

use crate::error::{ProtocolError, ProtocolResult};

/// Token the status endpoint returns while an import is running.
pub const IMPORTING_TOKEN: &str = "importing";

/// Prefix of the status endpoint's failure messages.
pub const ERROR_PREFIX: &str = "ERROR";

/// State of the remote importer as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportStatus {
    /// The import is still running.
    Importing,
    /// The import failed; carries the remote message.
    Failed(String),
    /// The import finished; carries whatever the remote reported.
    Done(String),
}

impl ImportStatus {
    /// Classifies a status string.
    pub fn from_token(token: &str) -> Self {
        if token == IMPORTING_TOKEN {
            ImportStatus::Importing
        } else if token.starts_with(ERROR_PREFIX) {
            ImportStatus::Failed(token.to_string())
        } else {
            ImportStatus::Done(token.to_string())
        }
    }

    /// Decodes the JSON string body of a status response.
    pub fn decode(body: &[u8]) -> ProtocolResult<Self> {
        let token: String = serde_json::from_slice(body)
            .map_err(|e| ProtocolError::InvalidResponse(format!("status body: {}", e)))?;
        Ok(Self::from_token(&token))
    }

    /// Returns true while the import is still running.
    pub fn is_importing(&self) -> bool {
        matches!(self, ImportStatus::Importing)
    }
}
