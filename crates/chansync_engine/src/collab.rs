//! External collaborators the orchestrator drives.
//!
//! Document building, the downstream catalog API and the source system's
//! entity model live outside the engine. Hosts plug them in through the
//! traits below; tests plug in recording fakes.

use crate::error::SyncResult;
use chansync_protocol::{EntityId, EventKind, StructureNode, SyncProgress};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::info;

/// A catalog document written by a [`DocumentBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogDocument {
    /// Where the document was saved.
    pub path: PathBuf,
    /// Number of structure nodes it was built from.
    pub nodes: usize,
}

/// A resource manifest written by a [`DocumentBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceManifest {
    /// Path of the manifest XML.
    pub manifest_path: PathBuf,
    /// Directory resource file paths are resolved against.
    pub base_dir: PathBuf,
}

/// Turns structure nodes into documents the catalog can import.
pub trait DocumentBuilder: Send + Sync {
    /// Builds and saves the catalog document for `nodes`.
    fn catalog_document(
        &self,
        channel_id: EntityId,
        nodes: &[StructureNode],
    ) -> SyncResult<CatalogDocument>;

    /// Builds and saves the update document for a single entity.
    fn entity_update_document(
        &self,
        channel_id: EntityId,
        entity_id: EntityId,
    ) -> SyncResult<CatalogDocument>;

    /// Builds and saves a resource manifest for the resource nodes given.
    ///
    /// Returns `None` when there is nothing to import.
    fn resource_manifest(
        &self,
        channel_id: EntityId,
        resources: &[StructureNode],
    ) -> SyncResult<Option<ResourceManifest>>;

    /// Builds and saves a resource manifest for one updated resource.
    fn resource_update_manifest(
        &self,
        channel_id: EntityId,
        resource_id: EntityId,
    ) -> SyncResult<ResourceManifest>;
}

/// The downstream catalog service.
pub trait CatalogApi: Send + Sync {
    /// Triggers import of a saved catalog document.
    fn import_catalog(&self, document: &CatalogDocument) -> SyncResult<()>;

    /// Tells the catalog an import of `document` has been handed over.
    fn notify_post_import(&self, document: &Path) -> SyncResult<()>;

    /// Removes a SKU.
    fn delete_sku(&self, sku_id: &str) -> SyncResult<()>;

    /// Removes an entity at every placement given.
    fn delete_entity(
        &self,
        channel_id: EntityId,
        entity_id: EntityId,
        placements: &[StructureNode],
    ) -> SyncResult<()>;

    /// Removes a link between two entities.
    fn delete_link(
        &self,
        source_id: EntityId,
        target_id: EntityId,
        link_type_id: Option<&str>,
    ) -> SyncResult<()>;

    /// Detaches a resource from an entity.
    fn delete_resource_link(&self, resource_id: EntityId, source_id: EntityId) -> SyncResult<()>;

    /// Pushes the data of a link entity for the link starting at `source_id`.
    fn update_link_entity_data(
        &self,
        channel_id: EntityId,
        link_entity_id: EntityId,
        source_id: EntityId,
    ) -> SyncResult<()>;

    /// Announces that an add/update/publish run finished.
    fn import_update_completed(
        &self,
        channel_name: &str,
        kind: EventKind,
        resources_included: bool,
    ) -> SyncResult<()>;

    /// Announces that a delete run finished.
    fn delete_completed(&self, channel_name: &str, kind: EventKind) -> SyncResult<()>;
}

/// Type information about an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityKind {
    /// Entity type id, e.g. `Item` or `Resource`.
    pub type_id: String,
    /// Whether entities of this type carry link data.
    pub is_link_type: bool,
}

impl EntityKind {
    /// Creates a plain entity kind.
    pub fn new(type_id: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            is_link_type: false,
        }
    }

    /// Creates a link-entity kind.
    pub fn link(type_id: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            is_link_type: true,
        }
    }

    /// Returns true if the type id matches.
    pub fn is(&self, type_id: &str) -> bool {
        self.type_id == type_id
    }
}

/// Entity lookups in the source system.
pub trait EntitySource: Send + Sync {
    /// Returns the type of an entity.
    fn entity_kind(&self, entity_id: EntityId) -> SyncResult<EntityKind>;

    /// Sources of the links a link entity is attached to.
    fn link_sources(&self, link_entity_id: EntityId) -> SyncResult<Vec<EntityId>>;

    /// Display name of the channel, if it has one.
    fn display_name(&self, channel_id: EntityId) -> SyncResult<Option<String>>;
}

/// Previous and current serialized value of a field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSnapshots {
    /// Value at the previous revision, if there was one.
    pub previous: Option<String>,
    /// Value at the current revision.
    pub current: Option<String>,
}

/// Field revision history in the source system.
pub trait RevisionHistory: Send + Sync {
    /// Returns the current value of `field` and the one at the revision
    /// before it.
    fn field_snapshots(&self, entity_id: EntityId, field: &str) -> SyncResult<FieldSnapshots>;
}

/// Receives progress milestones.
pub trait ProgressSink: Send + Sync {
    /// Called for every milestone, including the terminal one.
    fn report(&self, kind: EventKind, progress: &SyncProgress);
}

/// Writes milestones to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn report(&self, kind: EventKind, progress: &SyncProgress) {
        info!(
            kind = %kind,
            percent = progress.percent,
            terminal = progress.is_terminal(),
            "{}",
            progress.message
        );
    }
}

/// Keeps every milestone in memory, for testing.
#[derive(Debug, Default)]
pub struct RecordingProgressSink {
    reports: Mutex<Vec<(EventKind, SyncProgress)>>,
}

impl RecordingProgressSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every report received so far.
    pub fn reports(&self) -> Vec<(EventKind, SyncProgress)> {
        self.reports.lock().clone()
    }

    /// Returns the percentages reported so far, in order.
    pub fn percents(&self) -> Vec<u8> {
        self.reports.lock().iter().map(|(_, p)| p.percent).collect()
    }

    /// Returns the last report.
    pub fn last(&self) -> Option<SyncProgress> {
        self.reports.lock().last().map(|(_, p)| p.clone())
    }
}

impl ProgressSink for RecordingProgressSink {
    fn report(&self, kind: EventKind, progress: &SyncProgress) {
        self.reports.lock().push((kind, progress.clone()));
    }
}

impl<P: ProgressSink + ?Sized> ProgressSink for std::sync::Arc<P> {
    fn report(&self, kind: EventKind, progress: &SyncProgress) {
        (**self).report(kind, progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_helpers() {
        assert!(EntityKind::new("Item").is("Item"));
        assert!(!EntityKind::new("Item").is_link_type);
        assert!(EntityKind::link("Bundle").is_link_type);
    }

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingProgressSink::new();
        sink.report(EventKind::Publish, &SyncProgress::milestone(0, "start"));
        sink.report(EventKind::Publish, &SyncProgress::completed(true, "done"));

        assert_eq!(sink.percents(), vec![0, 100]);
        assert!(sink.last().unwrap().is_completed());
        assert_eq!(sink.reports()[0].0, EventKind::Publish);
    }
}
