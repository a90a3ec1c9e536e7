//! Per-event sync state machine.
//!
//! One run handles exactly one [`ChangeEvent`]:
//!
//! ```text
//! Initiated → Resolving → Building → Pushing → Completed | Failed
//! ```
//!
//! Every run ends with a terminal [`SyncProgress`], which is also the last
//! report handed to the progress sink. Errors halt the run; nothing is
//! retried here. Retrying a whole event is the host's decision.

use crate::collab::{
    CatalogApi, DocumentBuilder, EntitySource, ProgressSink, ResourceManifest, RevisionHistory,
    TracingProgressSink,
};
use crate::config::SyncSettings;
use crate::cvl::{CvlCache, CvlLoader};
use crate::error::{SyncError, SyncResult};
use crate::http::HttpClient;
use crate::importer::{BatchImporter, Sleeper};
use crate::repository::StructureRepository;
use crate::resolver::StructureResolver;
use chansync_protocol::{
    diff_sku_snapshots, ChangeEvent, EntityId, EventKind, LinkChange, StructureNode, SyncProgress,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// CVL cache with a type-erased loader, as owned by an orchestrator.
pub type SharedCvlCache = CvlCache<Arc<dyn CvlLoader>>;

/// Where the current run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No run has started yet.
    Idle,
    /// A run was accepted.
    Initiated,
    /// Structure is being resolved.
    Resolving,
    /// Documents are being built.
    Building,
    /// Documents and resources are being pushed downstream.
    Pushing,
    /// The last run completed.
    Completed,
    /// The last run failed.
    Failed,
}

impl RunState {
    /// Returns true while a run is in flight.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RunState::Initiated | RunState::Resolving | RunState::Building | RunState::Pushing
        )
    }
}

/// Counters across runs.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Runs that ended in `Completed`.
    pub runs_completed: u64,
    /// Runs that ended in `Failed`.
    pub runs_failed: u64,
    /// Error message of the last failed run.
    pub last_error: Option<String>,
    /// When the last run ended.
    pub last_run_time: Option<Instant>,
}

/// Result of a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Whether resources were part of the run.
    pub resources_included: bool,
}

impl RunOutcome {
    fn with_resources(resources_included: bool) -> Self {
        Self { resources_included }
    }
}

/// The external collaborators of an orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    /// Builds catalog documents and resource manifests.
    pub documents: Arc<dyn DocumentBuilder>,
    /// The downstream catalog.
    pub catalog: Arc<dyn CatalogApi>,
    /// Entity lookups in the source system.
    pub entities: Arc<dyn EntitySource>,
    /// Field revision history.
    pub history: Arc<dyn RevisionHistory>,
    /// Progress reporting.
    pub progress: Arc<dyn ProgressSink>,
}

impl Collaborators {
    /// Bundles collaborators, reporting progress to the log.
    pub fn new(
        documents: Arc<dyn DocumentBuilder>,
        catalog: Arc<dyn CatalogApi>,
        entities: Arc<dyn EntitySource>,
        history: Arc<dyn RevisionHistory>,
    ) -> Self {
        Self {
            documents,
            catalog,
            entities,
            history,
            progress: Arc::new(TracingProgressSink),
        }
    }

    /// Replaces the progress sink.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }
}

/// Milestone bookkeeping for one run.
struct Run<'a> {
    kind: EventKind,
    sink: &'a dyn ProgressSink,
    percent: u8,
}

impl<'a> Run<'a> {
    fn new(kind: EventKind, sink: &'a dyn ProgressSink) -> Self {
        Self {
            kind,
            sink,
            percent: 0,
        }
    }

    fn milestone(&mut self, percent: u8, message: impl Into<String>) {
        let progress = SyncProgress::milestone(percent, message);
        self.percent = progress.percent;
        self.sink.report(self.kind, &progress);
    }

    fn finish(&self, progress: &SyncProgress) {
        self.sink.report(self.kind, progress);
    }
}

/// Channel name used in completion notifications.
///
/// Falls back to `[<id>]` when the channel has no name, and truncates
/// names longer than `max_len` to `max_len - 1` characters. A `max_len`
/// of zero disables truncation.
pub fn channel_display_name(name: Option<&str>, channel_id: EntityId, max_len: usize) -> String {
    let name = match name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("[{}]", channel_id),
    };

    if max_len > 0 && name.chars().count() > max_len {
        name.chars().take(max_len - 1).collect()
    } else {
        name
    }
}

/// Drives one change event at a time through resolution, document
/// building and the downstream push.
pub struct SyncOrchestrator<R: StructureRepository, C: HttpClient, S: Sleeper> {
    settings: SyncSettings,
    resolver: StructureResolver<R>,
    importer: BatchImporter<C, S>,
    collab: Collaborators,
    cvl: Option<Arc<SharedCvlCache>>,
    state: RwLock<RunState>,
    stats: RwLock<SyncStats>,
}

impl<R: StructureRepository, C: HttpClient, S: Sleeper> SyncOrchestrator<R, C, S> {
    /// Creates an orchestrator.
    pub fn new(
        settings: SyncSettings,
        repository: Arc<R>,
        client: C,
        sleeper: S,
        collab: Collaborators,
    ) -> Self {
        let importer = BatchImporter::new(&settings, client, sleeper);
        Self {
            settings,
            resolver: StructureResolver::new(repository),
            importer,
            collab,
            cvl: None,
            state: RwLock::new(RunState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Attaches a CVL cache, invalidated at the start of every publish.
    pub fn with_cvl_cache(mut self, cache: Arc<SharedCvlCache>) -> Self {
        self.cvl = Some(cache);
        self
    }

    /// Returns the settings.
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Returns the structure resolver.
    pub fn resolver(&self) -> &StructureResolver<R> {
        &self.resolver
    }

    /// Returns the resource importer.
    pub fn importer(&self) -> &BatchImporter<C, S> {
        &self.importer
    }

    /// Gets the current state.
    pub fn state(&self) -> RunState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    fn set_state(&self, state: RunState) {
        debug!(?state, "run state");
        *self.state.write() = state;
    }

    /// Handles one change event and returns its terminal progress report.
    pub fn handle(&self, event: &ChangeEvent) -> SyncProgress {
        let kind = event.kind();
        let mut run = Run::new(kind, self.collab.progress.as_ref());

        self.set_state(RunState::Initiated);
        info!(kind = %kind, channel = event.channel_id(), "run started");
        run.milestone(0, describe(event));

        let progress = match self.dispatch(event, &mut run) {
            Ok(outcome) => {
                self.set_state(RunState::Completed);
                let mut stats = self.stats.write();
                stats.runs_completed += 1;
                stats.last_run_time = Some(Instant::now());
                info!(
                    kind = %kind,
                    resources_included = outcome.resources_included,
                    "run completed"
                );
                SyncProgress::completed(outcome.resources_included, format!("{} completed", kind))
            }
            Err(e) => {
                self.handle_error(kind, &e);
                SyncProgress::failed(run.percent, e.to_string())
            }
        };

        run.finish(&progress);
        progress
    }

    fn handle_error(&self, kind: EventKind, error: &SyncError) {
        error!(kind = %kind, error = %error, "run failed");
        self.set_state(RunState::Failed);
        let mut stats = self.stats.write();
        stats.runs_failed += 1;
        stats.last_error = Some(error.to_string());
        stats.last_run_time = Some(Instant::now());
    }

    fn dispatch(&self, event: &ChangeEvent, run: &mut Run<'_>) -> SyncResult<RunOutcome> {
        let channel_id = event.channel_id();

        let outcome = match event {
            ChangeEvent::Publish { channel_id } => self.publish(*channel_id, run)?,
            ChangeEvent::EntityAdded {
                channel_id,
                entity_id,
            } => {
                self.set_state(RunState::Resolving);
                run.milestone(1, "Fetching channel entities...");
                let nodes = self.resolver.entity_added(*channel_id, *entity_id)?;
                run.milestone(10, "Done fetching channel entities");
                self.push_structure(*channel_id, &nodes, run)?;
                RunOutcome::with_resources(true)
            }
            ChangeEvent::EntityUpdated {
                channel_id,
                entity_id,
                ..
            } => self.entity_updated(*channel_id, *entity_id, event, run)?,
            ChangeEvent::EntityDeleted {
                channel_id,
                entity_id,
            } => self.entity_deleted(*channel_id, *entity_id, run)?,
            ChangeEvent::LinkAdded(link) => {
                self.set_state(RunState::Resolving);
                run.milestone(1, "Fetching channel entities...");
                let nodes = self.resolver.link_added(link.channel_id, link.target_id)?;
                run.milestone(10, "Done fetching channel entities");
                self.push_structure(link.channel_id, &nodes, run)?;
                RunOutcome::with_resources(true)
            }
            ChangeEvent::LinkUpdated(link) => {
                self.set_state(RunState::Resolving);
                run.milestone(1, "Fetching channel entities...");
                let nodes = self.resolver.link_updated(
                    link.channel_id,
                    link.source_id,
                    link.target_id,
                )?;
                run.milestone(10, "Done fetching channel entities");
                self.push_structure(link.channel_id, &nodes, run)?;
                RunOutcome::with_resources(true)
            }
            ChangeEvent::LinkDeleted(link) => self.link_deleted(link, run)?,
        };

        self.announce(channel_id, event.kind(), outcome)?;
        Ok(outcome)
    }

    /// Sends the completion notification matching the event kind.
    fn announce(&self, channel_id: EntityId, kind: EventKind, outcome: RunOutcome) -> SyncResult<()> {
        let name = self.collab.entities.display_name(channel_id)?;
        let name = channel_display_name(
            name.as_deref(),
            channel_id,
            self.settings.display_name_max_len,
        );

        if kind.is_delete() {
            self.collab.catalog.delete_completed(&name, kind)
        } else {
            self.collab
                .catalog
                .import_update_completed(&name, kind, outcome.resources_included)
        }
    }

    fn publish(&self, channel_id: EntityId, run: &mut Run<'_>) -> SyncResult<RunOutcome> {
        if let Some(cvl) = &self.cvl {
            cvl.invalidate();
        }

        self.set_state(RunState::Resolving);
        run.milestone(1, "Fetching all channel entities...");
        let nodes = self.resolver.channel_structure(channel_id)?;
        info!(channel = channel_id, nodes = nodes.len(), "channel structure fetched");
        run.milestone(10, "Fetched all channel entities. Generating catalog document...");

        self.push_structure(channel_id, &nodes, run)?;
        Ok(RunOutcome::with_resources(true))
    }

    fn entity_updated(
        &self,
        channel_id: EntityId,
        entity_id: EntityId,
        event: &ChangeEvent,
        run: &mut Run<'_>,
    ) -> SyncResult<RunOutcome> {
        let kind = self.collab.entities.entity_kind(entity_id)?;
        debug!(entity = entity_id, type_id = %kind.type_id, "updated entity");

        self.set_state(RunState::Resolving);
        let placements = self.resolver.existing_placements(channel_id, entity_id)?;

        if kind.is(&self.settings.resource_type) {
            self.set_state(RunState::Building);
            let manifest = self
                .collab
                .documents
                .resource_update_manifest(channel_id, entity_id)?;
            self.set_state(RunState::Pushing);
            run.milestone(51, "Done generating resource manifest");
            self.import_resources(&manifest, run)?;
            return Ok(RunOutcome::with_resources(true));
        }

        if kind.is(&self.settings.channel_node_type) {
            self.push_structure(channel_id, &placements, run)?;
            return Ok(RunOutcome::with_resources(true));
        }

        let mut resources_included = false;
        if kind.is(&self.settings.item_type) && event.changed(&self.settings.sku_field) {
            resources_included = self.sku_update(channel_id, entity_id, &placements, run)?;
        }

        self.set_state(RunState::Building);
        let document = self
            .collab
            .documents
            .entity_update_document(channel_id, entity_id)?;

        if kind.is_link_type {
            let sources = self.collab.entities.link_sources(entity_id)?;
            if let Some(source_id) = sources.first() {
                self.collab
                    .catalog
                    .update_link_entity_data(channel_id, entity_id, *source_id)?;
            }
        }

        self.set_state(RunState::Pushing);
        debug!(document = %document.path.display(), "importing update document");
        self.collab.catalog.import_catalog(&document)?;
        self.collab.catalog.notify_post_import(&document.path)?;

        Ok(RunOutcome::with_resources(resources_included))
    }

    /// Removes SKUs dropped from the field and re-exports the item
    /// structure when SKUs were added. Returns true if anything was added.
    fn sku_update(
        &self,
        channel_id: EntityId,
        entity_id: EntityId,
        placements: &[StructureNode],
        run: &mut Run<'_>,
    ) -> SyncResult<bool> {
        let snapshots = self
            .collab
            .history
            .field_snapshots(entity_id, &self.settings.sku_field)?;
        let diff = diff_sku_snapshots(snapshots.previous.as_deref(), snapshots.current.as_deref())?;

        info!(
            entity = entity_id,
            added = diff.to_add.len(),
            deleted = diff.to_delete.len(),
            "SKU field changed"
        );

        for sku in &diff.to_delete {
            self.collab.catalog.delete_sku(&sku.id)?;
        }

        if diff.to_add.is_empty() {
            return Ok(false);
        }

        self.push_structure(channel_id, placements, run)?;
        Ok(true)
    }

    fn entity_deleted(
        &self,
        channel_id: EntityId,
        entity_id: EntityId,
        run: &mut Run<'_>,
    ) -> SyncResult<RunOutcome> {
        self.set_state(RunState::Resolving);
        let placements = self.resolver.existing_placements(channel_id, entity_id)?;
        if placements.is_empty() {
            warn!(entity = entity_id, "deleted entity has no placements in channel");
        }

        self.set_state(RunState::Pushing);
        self.collab
            .catalog
            .delete_entity(channel_id, entity_id, &placements)?;
        run.milestone(99, format!("Deleted entity {}", entity_id));
        Ok(RunOutcome::default())
    }

    fn link_deleted(&self, link: &LinkChange, run: &mut Run<'_>) -> SyncResult<RunOutcome> {
        self.set_state(RunState::Resolving);
        let placements = self
            .resolver
            .existing_placements(link.channel_id, link.target_id)?;
        let target = self.collab.entities.entity_kind(link.target_id)?;
        debug!(
            source = link.source_id,
            target = link.target_id,
            placements = placements.len(),
            "link removed"
        );

        self.set_state(RunState::Pushing);
        if target.is(&self.settings.resource_type) {
            self.collab
                .catalog
                .delete_resource_link(link.target_id, link.source_id)?;
        } else {
            self.collab.catalog.delete_link(
                link.source_id,
                link.target_id,
                link.link_type_id.as_deref(),
            )?;
        }
        run.milestone(99, "Link deleted");
        Ok(RunOutcome::default())
    }

    /// Builds and pushes the catalog document for `nodes`, plus a resource
    /// import for the resource nodes among them.
    fn push_structure(
        &self,
        channel_id: EntityId,
        nodes: &[StructureNode],
        run: &mut Run<'_>,
    ) -> SyncResult<()> {
        self.set_state(RunState::Building);
        let document = self.collab.documents.catalog_document(channel_id, nodes)?;
        info!(
            document = %document.path.display(),
            nodes = document.nodes,
            "catalog document saved"
        );
        run.milestone(26, "Done generating catalog document. Generating resource manifest...");

        let resources: Vec<StructureNode> = nodes
            .iter()
            .filter(|node| node.is_type(&self.settings.resource_type))
            .cloned()
            .collect();
        let manifest = if resources.is_empty() {
            None
        } else {
            self.collab
                .documents
                .resource_manifest(channel_id, &resources)?
        };

        self.set_state(RunState::Pushing);
        run.milestone(51, "Sending catalog document...");
        self.collab.catalog.import_catalog(&document)?;
        run.milestone(75, "Done sending catalog document");
        self.collab.catalog.notify_post_import(&document.path)?;

        if let Some(manifest) = manifest {
            self.import_resources(&manifest, run)?;
        }
        Ok(())
    }

    fn import_resources(&self, manifest: &ResourceManifest, run: &mut Run<'_>) -> SyncResult<()> {
        run.milestone(76, "Sending resources...");
        let report = self
            .importer
            .import_manifest(&manifest.manifest_path, &manifest.base_dir)?;

        if report.is_partial() {
            warn!(
                completed = report.batches_completed,
                total = report.batches_total,
                "resource import stopped after partial success"
            );
        }
        let report = report.into_result()?;

        info!(
            records = report.records,
            batches = report.batches_total,
            "resources imported"
        );
        run.milestone(99, "Done sending resources");
        self.collab
            .catalog
            .notify_post_import(&manifest.manifest_path)
    }
}

fn describe(event: &ChangeEvent) -> String {
    match event {
        ChangeEvent::Publish { channel_id } => {
            format!("Publish started for channel {}", channel_id)
        }
        ChangeEvent::EntityAdded {
            channel_id,
            entity_id,
        } => format!(
            "Received entity added for entity {} in channel {}",
            entity_id, channel_id
        ),
        ChangeEvent::EntityUpdated {
            channel_id,
            entity_id,
            ..
        } => format!(
            "Received entity update for entity {} in channel {}",
            entity_id, channel_id
        ),
        ChangeEvent::EntityDeleted {
            channel_id,
            entity_id,
        } => format!(
            "Received entity deleted for entity {} in channel {}",
            entity_id, channel_id
        ),
        ChangeEvent::LinkAdded(link) => format!(
            "Received link added for source {} and target {} in channel {}",
            link.source_id, link.target_id, link.channel_id
        ),
        ChangeEvent::LinkUpdated(link) => format!(
            "Received link update for source {} and target {} in channel {}",
            link.source_id, link.target_id, link.channel_id
        ),
        ChangeEvent::LinkDeleted(link) => format!(
            "Received link deleted for source {} and target {} in channel {}",
            link.source_id, link.target_id, link.channel_id
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::RecordingProgressSink;

    #[test]
    fn display_name_fallback() {
        assert_eq!(channel_display_name(None, 42, 100), "[42]");
        assert_eq!(channel_display_name(Some(""), 42, 100), "[42]");
        assert_eq!(channel_display_name(Some("Spring"), 42, 100), "Spring");
    }

    #[test]
    fn display_name_truncation() {
        let long = "x".repeat(150);
        assert_eq!(channel_display_name(Some(&long), 1, 100).len(), 99);

        let exact = "y".repeat(100);
        assert_eq!(channel_display_name(Some(&exact), 1, 100), exact);

        assert_eq!(channel_display_name(Some(&long), 1, 0).len(), 150);
    }

    #[test]
    fn run_state_activity() {
        assert!(!RunState::Idle.is_active());
        assert!(RunState::Resolving.is_active());
        assert!(RunState::Pushing.is_active());
        assert!(!RunState::Completed.is_active());
        assert!(!RunState::Failed.is_active());
    }

    #[test]
    fn run_tracks_last_percent() {
        let sink = RecordingProgressSink::new();
        let mut run = Run::new(EventKind::LinkAdded, &sink);
        run.milestone(1, "a");
        run.milestone(10, "b");
        assert_eq!(run.percent, 10);

        run.finish(&SyncProgress::failed(run.percent, "boom"));
        assert_eq!(sink.percents(), vec![1, 10, 10]);
        assert!(sink.last().unwrap().is_terminal());
    }

    #[test]
    fn describe_mentions_ids() {
        let text = describe(&ChangeEvent::LinkAdded(LinkChange::new(1, 9, 20)));
        assert!(text.contains("source 9"));
        assert!(text.contains("target 20"));
    }
}
