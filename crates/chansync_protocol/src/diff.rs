//! Presence diffing of keyed record lists.
//!
//! Two snapshots of the same list field are compared by key only:
//! keys present in both snapshots drop out of both sides, what is left of
//! the old snapshot was deleted and what is left of the new one was added.
//! A record whose key survives but whose other content changed shows up in
//! neither output.

use crate::error::{ProtocolError, ProtocolResult};
use std::collections::HashSet;

/// A record with a stable identifying key.
pub trait Keyed {
    /// Returns the record key.
    fn key(&self) -> &str;
}

/// Outcome of diffing two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffResult<T> {
    /// Records present only in the new snapshot, in new-snapshot order.
    pub to_add: Vec<T>,
    /// Records present only in the old snapshot, in old-snapshot order.
    pub to_delete: Vec<T>,
}

impl<T> DiffResult<T> {
    /// Returns true if nothing was added or removed.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_delete.is_empty()
    }
}

impl<T> Default for DiffResult<T> {
    fn default() -> Self {
        Self {
            to_add: Vec::new(),
            to_delete: Vec::new(),
        }
    }
}

/// Diffs two snapshots by key presence.
pub fn diff<T: Keyed + Clone>(old: &[T], new: &[T]) -> DiffResult<T> {
    let old_keys: HashSet<&str> = old.iter().map(Keyed::key).collect();
    let new_keys: HashSet<&str> = new.iter().map(Keyed::key).collect();
    let shared: HashSet<&str> = old_keys.intersection(&new_keys).copied().collect();

    DiffResult {
        to_add: new
            .iter()
            .filter(|record| !shared.contains(record.key()))
            .cloned()
            .collect(),
        to_delete: old
            .iter()
            .filter(|record| !shared.contains(record.key()))
            .cloned()
            .collect(),
    }
}

/// One `SKU` element of a serialized SKU field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkuRecord {
    /// Value of the `id` attribute.
    pub id: String,
    /// Child elements as `(name, text)` pairs, in document order.
    pub fields: Vec<(String, String)>,
}

impl Keyed for SkuRecord {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Parses a serialized SKU field into records.
///
/// Every `SKU` element nested anywhere below the document root counts.
/// An empty or whitespace-only snapshot is an empty list.
pub fn parse_sku_snapshot(xml: &str) -> ProtocolResult<Vec<SkuRecord>> {
    if xml.trim().is_empty() {
        return Ok(Vec::new());
    }

    let doc = roxmltree::Document::parse(xml).map_err(|e| ProtocolError::snapshot(e.to_string()))?;

    doc.descendants()
        .filter(|node| node.has_tag_name("SKU") && node.parent_element().is_some())
        .map(|node| {
            let id = node
                .attribute("id")
                .ok_or_else(|| ProtocolError::snapshot("SKU element without id attribute"))?;
            let fields = node
                .children()
                .filter(|child| child.is_element())
                .map(|child| {
                    (
                        child.tag_name().name().to_string(),
                        child.text().unwrap_or_default().trim().to_string(),
                    )
                })
                .collect();
            Ok(SkuRecord {
                id: id.to_string(),
                fields,
            })
        })
        .collect()
}

/// Diffs the previous and current revision of a SKU field.
///
/// An absent revision is treated as an empty snapshot.
pub fn diff_sku_snapshots(
    old: Option<&str>,
    new: Option<&str>,
) -> ProtocolResult<DiffResult<SkuRecord>> {
    let old = parse_sku_snapshot(old.unwrap_or_default())?;
    let new = parse_sku_snapshot(new.unwrap_or_default())?;
    Ok(diff(&old, &new))
}
