//! Resource import records and their JSON wire form.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// What the remote importer should do with a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportAction {
    /// The resource is new.
    Added,
    /// The resource or its metadata changed.
    Updated,
    /// The resource was removed.
    Deleted,
}

impl ImportAction {
    /// Maps a manifest `action` attribute to an action.
    ///
    /// Anything other than `added` or `deleted` is an update.
    pub fn from_manifest(action: &str) -> Self {
        match action.trim().to_ascii_lowercase().as_str() {
            "added" => ImportAction::Added,
            "deleted" => ImportAction::Deleted,
            _ => ImportAction::Updated,
        }
    }
}

impl fmt::Display for ImportAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportAction::Added => "added",
            ImportAction::Updated => "updated",
            ImportAction::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// A catalog entry a resource is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntryCode {
    /// Entry code.
    pub code: String,
    /// Whether the resource is the entry's main picture.
    pub is_main_picture: bool,
}

/// A localized value of a resource meta field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaValue {
    /// Language code, lowercase.
    #[serde(rename = "Languagecode")]
    pub language_code: String,
    /// Value text. Multi-valued data is joined with `;`.
    #[serde(rename = "Data")]
    pub data: String,
}

/// A resource meta field with its localized values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetaField {
    /// Meta field name.
    pub id: String,
    /// Values per language, in manifest order.
    pub values: Vec<MetaValue>,
}

/// One resource to be imported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImportRecord {
    /// Import action.
    pub action: ImportAction,
    /// Legacy single-code list; see [`ImportRecord::entry_codes`] for the full set.
    pub codes: Vec<String>,
    /// Entries the resource is attached to.
    pub entry_codes: Vec<EntryCode>,
    /// Resource metadata.
    pub meta_fields: Vec<MetaField>,
    /// Absolute path of the resource file. Absent for deletions.
    #[serde(rename = "Path", default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    /// Resource identifier.
    pub resource_id: String,
}

impl ImportRecord {
    /// Creates a record with no entries, metadata or file.
    pub fn new(resource_id: impl Into<String>, action: ImportAction) -> Self {
        Self {
            action,
            codes: Vec::new(),
            entry_codes: Vec::new(),
            meta_fields: Vec::new(),
            file_path: None,
            resource_id: resource_id.into(),
        }
    }

    /// Sets the file path.
    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Adds an entry code.
    pub fn with_entry_code(mut self, code: impl Into<String>, is_main_picture: bool) -> Self {
        let code = code.into();
        self.codes = vec![code.clone()];
        self.entry_codes.push(EntryCode {
            code,
            is_main_picture,
        });
        self
    }

    /// Adds a meta field.
    pub fn with_meta_field(mut self, field: MetaField) -> Self {
        self.meta_fields.push(field);
        self
    }

    /// Checks the record invariants: a file path is required unless the
    /// resource is being deleted.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.action != ImportAction::Deleted && self.file_path.is_none() {
            return Err(ProtocolError::InvalidRecord {
                resource_id: self.resource_id.clone(),
                reason: format!("{} resource has no file path", self.action),
            });
        }
        Ok(())
    }
}

/// Encodes a batch of records as the JSON request body.
pub fn encode_batch(records: &[ImportRecord]) -> ProtocolResult<Vec<u8>> {
    serde_json::to_vec(records).map_err(|e| ProtocolError::InvalidRecord {
        resource_id: String::new(),
        reason: e.to_string(),
    })
}
