//! Controlled vocabulary list (CVL) cache.
//!
//! Lists and their values are loaded lazily on first use and kept until
//! [`CvlCache::invalidate`] is called. The cache is owned by whoever builds
//! the orchestrator; there is no process-wide state.

use crate::error::SyncResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Separator between key and value in [`CvlDataMode::KeysAndValues`].
pub const CVL_KEY_DELIMITER: &str = "||";

/// A controlled vocabulary list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cvl {
    /// List id.
    pub id: String,
    /// Whether values are localized per language.
    pub localized: bool,
}

/// The text of a CVL value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CvlText {
    /// One value for every language.
    Plain(String),
    /// Value per language code.
    Localized(HashMap<String, String>),
}

/// One key/value entry of a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvlValue {
    /// Owning list.
    pub cvl_id: String,
    /// Key stored in entity fields.
    pub key: String,
    /// Display text.
    pub value: CvlText,
}

impl CvlValue {
    /// Creates a non-localized value.
    pub fn plain(cvl_id: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            cvl_id: cvl_id.into(),
            key: key.into(),
            value: CvlText::Plain(value.into()),
        }
    }

    /// Creates a localized value from `(language, text)` pairs.
    pub fn localized<'a>(
        cvl_id: impl Into<String>,
        key: impl Into<String>,
        texts: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        Self {
            cvl_id: cvl_id.into(),
            key: key.into(),
            value: CvlText::Localized(
                texts
                    .into_iter()
                    .map(|(lang, text)| (lang.to_string(), text.to_string()))
                    .collect(),
            ),
        }
    }
}

/// How CVL field data is rendered downstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CvlDataMode {
    /// Raw keys.
    #[default]
    Keys,
    /// Display values only.
    Values,
    /// `key||value`.
    KeysAndValues,
}

/// Loads lists and values from the source system.
pub trait CvlLoader: Send + Sync {
    /// Loads every list.
    fn load_lists(&self) -> SyncResult<Vec<Cvl>>;

    /// Loads every value of every list.
    fn load_values(&self) -> SyncResult<Vec<CvlValue>>;
}

/// Lazily populated CVL cache.
pub struct CvlCache<L: CvlLoader> {
    loader: L,
    lists: RwLock<Option<Arc<Vec<Cvl>>>>,
    values: RwLock<Option<Arc<Vec<CvlValue>>>>,
}

impl<L: CvlLoader> CvlCache<L> {
    /// Creates an empty cache backed by `loader`.
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            lists: RwLock::new(None),
            values: RwLock::new(None),
        }
    }

    /// Returns every list, loading them on first use.
    pub fn lists(&self) -> SyncResult<Arc<Vec<Cvl>>> {
        if let Some(lists) = self.lists.read().as_ref() {
            return Ok(Arc::clone(lists));
        }

        let mut slot = self.lists.write();
        if let Some(lists) = slot.as_ref() {
            return Ok(Arc::clone(lists));
        }
        let lists = Arc::new(self.loader.load_lists()?);
        debug!(count = lists.len(), "CVL lists loaded");
        *slot = Some(Arc::clone(&lists));
        Ok(lists)
    }

    /// Returns every value, loading them on first use.
    pub fn values(&self) -> SyncResult<Arc<Vec<CvlValue>>> {
        if let Some(values) = self.values.read().as_ref() {
            return Ok(Arc::clone(values));
        }

        let mut slot = self.values.write();
        if let Some(values) = slot.as_ref() {
            return Ok(Arc::clone(values));
        }
        let values = Arc::new(self.loader.load_values()?);
        debug!(count = values.len(), "CVL values loaded");
        *slot = Some(Arc::clone(&values));
        Ok(values)
    }

    /// Looks up a list by id.
    pub fn list(&self, cvl_id: &str) -> SyncResult<Option<Cvl>> {
        Ok(self.lists()?.iter().find(|cvl| cvl.id == cvl_id).cloned())
    }

    /// Looks up the value stored under `key` in a list.
    pub fn value(&self, cvl_id: &str, key: &str) -> SyncResult<Option<CvlValue>> {
        Ok(self
            .values()?
            .iter()
            .find(|v| v.cvl_id == cvl_id && v.key == key)
            .cloned())
    }

    /// Renders raw field data (`;`-separated keys) for export.
    ///
    /// Keys without a value are skipped. Returns `None` when a localized
    /// value has no text for `language`.
    pub fn render(
        &self,
        cvl_id: &str,
        raw: &str,
        mode: CvlDataMode,
        language: &str,
    ) -> SyncResult<Option<String>> {
        if mode == CvlDataMode::Keys {
            return Ok(Some(raw.to_string()));
        }

        let values = self.values()?;
        let mut rendered = Vec::new();

        for key in raw.split(';') {
            let Some(entry) = values.iter().find(|v| v.cvl_id == cvl_id && v.key == key) else {
                continue;
            };

            let text = match &entry.value {
                CvlText::Plain(text) => text.as_str(),
                CvlText::Localized(texts) => match texts.get(language) {
                    Some(text) => text.as_str(),
                    None => return Ok(None),
                },
            };

            rendered.push(match mode {
                CvlDataMode::KeysAndValues => format!("{}{}{}", key, CVL_KEY_DELIMITER, text),
                _ => text.to_string(),
            });
        }

        Ok(Some(rendered.join(";")))
    }

    /// Drops everything loaded so far; the next lookup reloads.
    pub fn invalidate(&self) {
        *self.lists.write() = None;
        *self.values.write() = None;
        debug!("CVL cache invalidated");
    }

    /// Returns true if nothing is currently loaded.
    pub fn is_empty(&self) -> bool {
        self.lists.read().is_none() && self.values.read().is_none()
    }
}

impl<L: CvlLoader + ?Sized> CvlLoader for Arc<L> {
    fn load_lists(&self) -> SyncResult<Vec<Cvl>> {
        (**self).load_lists()
    }

    fn load_values(&self) -> SyncResult<Vec<CvlValue>> {
        (**self).load_values()
    }
}
