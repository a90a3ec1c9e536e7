//! Integration tests driving the orchestrator end to end.

use chansync_engine::{
    CatalogApi, CatalogDocument, Collaborators, Cvl, CvlCache, CvlLoader, CvlValue,
    DocumentBuilder, EntityKind, EntitySource, FieldSnapshots, HttpResponse,
    MemoryStructureRepository, RecordingProgressSink, RecordingSleeper, ResourceManifest,
    RevisionHistory, RunState, ScriptedClient, SharedCvlCache, SyncError, SyncOrchestrator,
    SyncResult, SyncSettings,
};
use chansync_protocol::{
    ChangeEvent, EntityId, EventKind, LinkChange, StructureNode, SyncProgress, Terminal,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Writes manifests into a temp directory; catalog documents are only named.
struct FileDocuments {
    dir: PathBuf,
    built: Mutex<Vec<Vec<EntityId>>>,
}

impl FileDocuments {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            built: Mutex::new(Vec::new()),
        }
    }

    fn write_manifest(&self, ids: &[EntityId]) -> ResourceManifest {
        let resources: String = ids
            .iter()
            .map(|id| {
                format!(
                    r#"<Resource id="{id}" action="added"><Paths><Path>{id}/image.jpg</Path></Paths></Resource>"#
                )
            })
            .collect();
        let xml = format!("<Resources><ResourceFiles>{}</ResourceFiles></Resources>", resources);
        let manifest_path = self.dir.join("Resources.xml");
        std::fs::write(&manifest_path, xml).unwrap();
        ResourceManifest {
            manifest_path,
            base_dir: self.dir.clone(),
        }
    }
}

impl DocumentBuilder for FileDocuments {
    fn catalog_document(
        &self,
        _channel_id: EntityId,
        nodes: &[StructureNode],
    ) -> SyncResult<CatalogDocument> {
        self.built
            .lock()
            .push(nodes.iter().map(|n| n.entity_id).collect());
        Ok(CatalogDocument {
            path: self.dir.join("catalog.xml"),
            nodes: nodes.len(),
        })
    }

    fn entity_update_document(
        &self,
        _channel_id: EntityId,
        entity_id: EntityId,
    ) -> SyncResult<CatalogDocument> {
        Ok(CatalogDocument {
            path: self.dir.join(format!("update-{}.xml", entity_id)),
            nodes: 1,
        })
    }

    fn resource_manifest(
        &self,
        _channel_id: EntityId,
        resources: &[StructureNode],
    ) -> SyncResult<Option<ResourceManifest>> {
        let ids: Vec<EntityId> = resources.iter().map(|n| n.entity_id).collect();
        Ok(Some(self.write_manifest(&ids)))
    }

    fn resource_update_manifest(
        &self,
        _channel_id: EntityId,
        resource_id: EntityId,
    ) -> SyncResult<ResourceManifest> {
        Ok(self.write_manifest(&[resource_id]))
    }
}

/// Records every catalog call as a short string. A call starting with the
/// `fail_on` prefix is recorded and then fails.
#[derive(Default)]
struct RecordingCatalog {
    calls: Mutex<Vec<String>>,
    fail_on: Mutex<Option<&'static str>>,
}

impl RecordingCatalog {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn fail_on(&self, prefix: &'static str) {
        *self.fail_on.lock() = Some(prefix);
    }

    fn push(&self, call: String) -> SyncResult<()> {
        let failing = matches!(*self.fail_on.lock(), Some(prefix) if call.starts_with(prefix));
        self.calls.lock().push(call);
        if failing {
            return Err(SyncError::collaborator("catalog", "service unavailable"));
        }
        Ok(())
    }
}

impl CatalogApi for RecordingCatalog {
    fn import_catalog(&self, document: &CatalogDocument) -> SyncResult<()> {
        self.push(format!("import {}", file_name(&document.path)))
    }

    fn notify_post_import(&self, document: &Path) -> SyncResult<()> {
        self.push(format!("notify {}", file_name(document)))
    }

    fn delete_sku(&self, sku_id: &str) -> SyncResult<()> {
        self.push(format!("delete_sku {}", sku_id))
    }

    fn delete_entity(
        &self,
        _channel_id: EntityId,
        entity_id: EntityId,
        placements: &[StructureNode],
    ) -> SyncResult<()> {
        self.push(format!("delete_entity {} x{}", entity_id, placements.len()))
    }

    fn delete_link(
        &self,
        source_id: EntityId,
        target_id: EntityId,
        link_type_id: Option<&str>,
    ) -> SyncResult<()> {
        self.push(format!(
            "delete_link {} {} {}",
            source_id,
            target_id,
            link_type_id.unwrap_or("-")
        ))
    }

    fn delete_resource_link(&self, resource_id: EntityId, source_id: EntityId) -> SyncResult<()> {
        self.push(format!("delete_resource_link {} {}", resource_id, source_id))
    }

    fn update_link_entity_data(
        &self,
        _channel_id: EntityId,
        link_entity_id: EntityId,
        source_id: EntityId,
    ) -> SyncResult<()> {
        self.push(format!("update_link_entity {} {}", link_entity_id, source_id))
    }

    fn import_update_completed(
        &self,
        channel_name: &str,
        kind: EventKind,
        resources_included: bool,
    ) -> SyncResult<()> {
        self.push(format!(
            "completed {} {} {}",
            channel_name, kind, resources_included
        ))
    }

    fn delete_completed(&self, channel_name: &str, kind: EventKind) -> SyncResult<()> {
        self.push(format!("delete_completed {} {}", channel_name, kind))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

struct FakeEntities {
    kinds: HashMap<EntityId, EntityKind>,
    link_sources: HashMap<EntityId, Vec<EntityId>>,
    channel_name: Option<String>,
}

impl EntitySource for FakeEntities {
    fn entity_kind(&self, entity_id: EntityId) -> SyncResult<EntityKind> {
        Ok(self
            .kinds
            .get(&entity_id)
            .cloned()
            .unwrap_or_else(|| EntityKind::new("Product")))
    }

    fn link_sources(&self, link_entity_id: EntityId) -> SyncResult<Vec<EntityId>> {
        Ok(self
            .link_sources
            .get(&link_entity_id)
            .cloned()
            .unwrap_or_default())
    }

    fn display_name(&self, _channel_id: EntityId) -> SyncResult<Option<String>> {
        Ok(self.channel_name.clone())
    }
}

#[derive(Default)]
struct FakeHistory {
    snapshots: FieldSnapshots,
}

impl RevisionHistory for FakeHistory {
    fn field_snapshots(&self, _entity_id: EntityId, _field: &str) -> SyncResult<FieldSnapshots> {
        Ok(self.snapshots.clone())
    }
}

#[derive(Default)]
struct CountingCvlLoader {
    loads: AtomicUsize,
}

impl CvlLoader for CountingCvlLoader {
    fn load_lists(&self) -> SyncResult<Vec<Cvl>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Cvl {
            id: "Size".into(),
            localized: false,
        }])
    }

    fn load_values(&self) -> SyncResult<Vec<CvlValue>> {
        Ok(vec![CvlValue::plain("Size", "s", "Small")])
    }
}

fn node(path: &[EntityId], entity_type: &str) -> StructureNode {
    StructureNode::new(path.to_vec(), entity_type).unwrap()
}

/// ```text
/// 1 channel
/// └── 5 node
///     └── 9 product
///         ├── 20 item
///         │   └── 21 resource
///         └── 30 item
/// ```
fn repository() -> MemoryStructureRepository {
    MemoryStructureRepository::with_nodes(vec![
        node(&[1], "Channel"),
        node(&[1, 5], "ChannelNode"),
        node(&[1, 5, 9], "Product"),
        node(&[1, 5, 9, 20], "Item"),
        node(&[1, 5, 9, 20, 21], "Resource"),
        node(&[1, 5, 9, 30], "Item"),
    ])
}

struct Harness {
    _dir: TempDir,
    orchestrator: SyncOrchestrator<MemoryStructureRepository, Arc<ScriptedClient>, Arc<RecordingSleeper>>,
    client: Arc<ScriptedClient>,
    catalog: Arc<RecordingCatalog>,
    documents: Arc<FileDocuments>,
    progress: Arc<RecordingProgressSink>,
}

fn harness_with(history: FakeHistory, channel_name: Option<&str>) -> Harness {
    let dir = TempDir::new().unwrap();
    let settings = SyncSettings::new(1, "https://shop.example.com/inriverapi/", "secret");

    let client = Arc::new(ScriptedClient::new());
    let catalog = Arc::new(RecordingCatalog::default());
    let documents = Arc::new(FileDocuments::new(dir.path()));
    let progress = Arc::new(RecordingProgressSink::new());

    let entities = FakeEntities {
        kinds: HashMap::from([
            (5, EntityKind::new("ChannelNode")),
            (20, EntityKind::new("Item")),
            (21, EntityKind::new("Resource")),
            (30, EntityKind::new("Item")),
            (77, EntityKind::link("ProductItemBundle")),
        ]),
        link_sources: HashMap::from([(77, vec![9, 5])]),
        channel_name: channel_name.map(str::to_string),
    };

    let collab = Collaborators::new(
        documents.clone(),
        catalog.clone(),
        Arc::new(entities),
        Arc::new(history),
    )
    .with_progress(progress.clone());

    let orchestrator = SyncOrchestrator::new(
        settings,
        Arc::new(repository()),
        Arc::clone(&client),
        Arc::new(RecordingSleeper::new()),
        collab,
    );

    Harness {
        _dir: dir,
        orchestrator,
        client,
        catalog,
        documents,
        progress,
    }
}

fn harness() -> Harness {
    harness_with(FakeHistory::default(), Some("Spring"))
}

fn accept_import(client: &ScriptedClient) {
    client.push_post(Ok(HttpResponse::ok_json("true")));
    client.push_get(Ok(HttpResponse::ok_json(r#""importing""#)));
    client.push_get(Ok(HttpResponse::ok_json(r#""Import finished""#)));
}

#[test]
fn publish_pushes_catalog_then_resources() {
    let h = harness();
    accept_import(&h.client);

    let progress = h.orchestrator.handle(&ChangeEvent::Publish { channel_id: 1 });

    assert!(progress.is_completed(), "{:?}", progress);
    assert_eq!(progress.resources_included(), Some(true));
    assert_eq!(
        h.progress.percents(),
        vec![0, 1, 10, 26, 51, 75, 76, 99, 100]
    );
    assert_eq!(
        h.catalog.calls(),
        vec![
            "import catalog.xml",
            "notify catalog.xml",
            "notify Resources.xml",
            "completed Spring Publish true",
        ]
    );

    let built = h.documents.built.lock().clone();
    assert_eq!(built.len(), 1);
    assert_eq!(built[0].len(), 6);

    let bodies = h.client.posted_bodies();
    assert_eq!(bodies.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&bodies[0]).unwrap();
    assert_eq!(body[0]["ResourceId"], "21");
    assert_eq!(body[0]["Action"], "added");

    assert_eq!(h.orchestrator.state(), RunState::Completed);
    assert_eq!(h.orchestrator.stats().runs_completed, 1);
}

#[test]
fn publish_invalidates_cvl_cache() {
    let h = harness();
    let loader = Arc::new(CountingCvlLoader::default());
    let cache: Arc<SharedCvlCache> = Arc::new(CvlCache::new(loader.clone() as Arc<dyn CvlLoader>));
    cache.lists().unwrap();
    assert!(!cache.is_empty());

    let orchestrator = h.orchestrator.with_cvl_cache(Arc::clone(&cache));
    accept_import(&h.client);
    assert!(orchestrator
        .handle(&ChangeEvent::Publish { channel_id: 1 })
        .is_completed());

    assert!(cache.is_empty());
    cache.lists().unwrap();
    assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
}

#[test]
fn entity_added_without_resources_skips_import() {
    let h = harness();

    let progress = h.orchestrator.handle(&ChangeEvent::EntityAdded {
        channel_id: 1,
        entity_id: 30,
    });

    // Structure pushes always announce resources, even with no manifest.
    assert_eq!(progress.resources_included(), Some(true));
    assert!(h.client.requests().is_empty());
    assert_eq!(h.documents.built.lock()[0], vec![9, 30]);
    assert_eq!(
        h.catalog.calls().last().map(String::as_str),
        Some("completed Spring EntityAdded true")
    );
}

#[test]
fn entity_added_with_resource_descendants_imports_them() {
    let h = harness();
    accept_import(&h.client);

    let progress = h.orchestrator.handle(&ChangeEvent::EntityAdded {
        channel_id: 1,
        entity_id: 20,
    });

    assert_eq!(progress.resources_included(), Some(true));
    assert_eq!(h.documents.built.lock()[0], vec![9, 20, 21]);
    assert_eq!(h.client.posted_bodies().len(), 1);
}

#[test]
fn resource_update_imports_manifest() {
    let h = harness();
    accept_import(&h.client);

    let progress = h
        .orchestrator
        .handle(&ChangeEvent::entity_updated(1, 21, Some("ResourceName")));

    assert_eq!(progress.resources_included(), Some(true));
    assert_eq!(h.progress.percents(), vec![0, 51, 76, 99, 100]);
    assert_eq!(
        h.catalog.calls(),
        vec![
            "notify Resources.xml",
            "completed Spring EntityUpdated true"
        ]
    );
    assert!(h.documents.built.lock().is_empty());
}

#[test]
fn sku_change_deletes_removed_and_exports_added() {
    let history = FakeHistory {
        snapshots: FieldSnapshots {
            previous: Some(r#"<SKUs><SKU id="a"/><SKU id="b"/></SKUs>"#.into()),
            current: Some(r#"<SKUs><SKU id="b"/><SKU id="c"/></SKUs>"#.into()),
        },
    };
    let h = harness_with(history, Some("Spring"));

    let progress = h
        .orchestrator
        .handle(&ChangeEvent::entity_updated(1, 20, Some("ItemName,SKUs")));

    assert_eq!(progress.resources_included(), Some(true));
    assert_eq!(
        h.catalog.calls(),
        vec![
            "delete_sku a",
            "import catalog.xml",
            "notify catalog.xml",
            "import update-20.xml",
            "notify update-20.xml",
            "completed Spring EntityUpdated true",
        ]
    );
    assert_eq!(h.documents.built.lock()[0], vec![20]);
}

#[test]
fn sku_removal_only_skips_structure_push() {
    let history = FakeHistory {
        snapshots: FieldSnapshots {
            previous: Some(r#"<SKUs><SKU id="a"/></SKUs>"#.into()),
            current: None,
        },
    };
    let h = harness_with(history, Some("Spring"));

    let progress = h
        .orchestrator
        .handle(&ChangeEvent::entity_updated(1, 20, Some("SKUs")));

    assert_eq!(progress.resources_included(), Some(false));
    assert!(h.documents.built.lock().is_empty());
    assert_eq!(h.catalog.calls()[0], "delete_sku a");
}

#[test]
fn malformed_sku_snapshot_fails_run() {
    let history = FakeHistory {
        snapshots: FieldSnapshots {
            previous: Some("<SKUs><SKU id=".into()),
            current: Some(r#"<SKUs><SKU id="c"/></SKUs>"#.into()),
        },
    };
    let h = harness_with(history, Some("Spring"));

    let progress = h
        .orchestrator
        .handle(&ChangeEvent::entity_updated(1, 20, Some("SKUs")));

    assert!(matches!(progress.terminal, Terminal::Failed { .. }));
    assert!(h.catalog.calls().is_empty());
    assert_eq!(h.orchestrator.state(), RunState::Failed);
    let stats = h.orchestrator.stats();
    assert_eq!(stats.runs_failed, 1);
    assert!(stats.last_error.is_some());
}

#[test]
fn channel_node_update_only_pushes_structure() {
    let h = harness();

    let progress = h
        .orchestrator
        .handle(&ChangeEvent::entity_updated(1, 5, Some("NodeName")));

    assert!(progress.is_completed());
    assert_eq!(progress.resources_included(), Some(true));
    assert_eq!(
        h.catalog.calls(),
        vec![
            "import catalog.xml",
            "notify catalog.xml",
            "completed Spring EntityUpdated true",
        ]
    );
}

#[test]
fn link_entity_update_pushes_link_data() {
    let h = harness();

    h.orchestrator
        .handle(&ChangeEvent::entity_updated(1, 77, Some("BundleQty")));

    let calls = h.catalog.calls();
    assert_eq!(calls[0], "update_link_entity 77 9");
    assert_eq!(calls[1], "import update-77.xml");
}

#[test]
fn entity_deleted_removes_every_placement() {
    let h = harness();

    let progress = h.orchestrator.handle(&ChangeEvent::EntityDeleted {
        channel_id: 1,
        entity_id: 20,
    });

    assert_eq!(progress.resources_included(), Some(false));
    assert_eq!(
        h.catalog.calls(),
        vec!["delete_entity 20 x1", "delete_completed Spring EntityDeleted"]
    );
}

#[test]
fn link_deleted_dispatches_on_target_type() {
    let h = harness();
    h.orchestrator
        .handle(&ChangeEvent::LinkDeleted(LinkChange::new(1, 20, 21)));
    h.orchestrator.handle(&ChangeEvent::LinkDeleted(
        LinkChange::new(1, 9, 30).with_link_type("ProductItem"),
    ));

    assert_eq!(
        h.catalog.calls(),
        vec![
            "delete_resource_link 21 20",
            "delete_completed Spring LinkDeleted",
            "delete_link 9 30 ProductItem",
            "delete_completed Spring LinkDeleted",
        ]
    );
}

#[test]
fn link_added_exports_ancestor_chain() {
    let h = harness();
    accept_import(&h.client);

    let progress = h
        .orchestrator
        .handle(&ChangeEvent::LinkAdded(LinkChange::new(1, 9, 20)));

    assert!(progress.is_completed());
    assert_eq!(progress.resources_included(), Some(true));
    let built = h.documents.built.lock().clone();
    assert!(built[0].contains(&9));
    assert!(built[0].contains(&5));
    assert!(built[0].contains(&21));
    assert_eq!(built[0].last(), Some(&20));
    assert_eq!(
        h.progress.percents()[..3],
        [0, 1, 10]
    );
}

#[test]
fn link_updated_without_parent_fails() {
    let h = harness();

    let progress = h
        .orchestrator
        .handle(&ChangeEvent::LinkUpdated(LinkChange::new(1, 5, 30)));

    match progress.terminal {
        Terminal::Failed { error } => assert!(error.contains("can't find parent")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(progress.percent, 1);
    assert!(h.catalog.calls().is_empty());
}

#[test]
fn rejected_resource_batch_fails_run() {
    let h = harness();
    h.client.push_post(Ok(HttpResponse::with_status(500)));

    let progress = h.orchestrator.handle(&ChangeEvent::Publish { channel_id: 1 });

    match &progress.terminal {
        Terminal::Failed { error } => assert!(error.contains("rejected"), "{}", error),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(progress.percent, 76);
    assert!(h.client.requests().iter().all(|r| r.method == "POST"));
}

#[test]
fn remote_import_error_fails_run() {
    let h = harness();
    h.client.push_post(Ok(HttpResponse::ok_json("true")));
    h.client
        .push_get(Ok(HttpResponse::ok_json(r#""ERROR file not found""#)));

    let progress = h.orchestrator.handle(&ChangeEvent::Publish { channel_id: 1 });

    assert!(matches!(progress.terminal, Terminal::Failed { .. }));
    assert!(progress.message.contains("ERROR file not found"));
    assert!(!h
        .catalog
        .calls()
        .iter()
        .any(|c| c.starts_with("completed")));
}

#[test]
fn link_added_without_resources_announces_resources() {
    let h = harness();

    let progress = h
        .orchestrator
        .handle(&ChangeEvent::LinkAdded(LinkChange::new(1, 9, 30)));

    assert!(progress.is_completed(), "{:?}", progress);
    assert_eq!(progress.resources_included(), Some(true));
    assert!(h.client.requests().is_empty());
    assert_eq!(
        h.catalog.calls().last().map(String::as_str),
        Some("completed Spring LinkAdded true")
    );
}

#[test]
fn link_updated_announces_resources() {
    let h = harness();
    accept_import(&h.client);

    let progress = h
        .orchestrator
        .handle(&ChangeEvent::LinkUpdated(LinkChange::new(1, 9, 30)));

    assert!(progress.is_completed(), "{:?}", progress);
    assert_eq!(progress.resources_included(), Some(true));
    assert_eq!(
        h.catalog.calls().last().map(String::as_str),
        Some("completed Spring LinkUpdated true")
    );
}

fn assert_failed_without_announcement(h: &Harness, progress: &SyncProgress) {
    assert!(matches!(progress.terminal, Terminal::Failed { .. }), "{:?}", progress);
    assert_eq!(h.progress.last().as_ref(), Some(progress));
    assert_eq!(h.orchestrator.state(), RunState::Failed);
    assert!(!h
        .catalog
        .calls()
        .iter()
        .any(|c| c.starts_with("completed")));
    let stats = h.orchestrator.stats();
    assert_eq!(stats.runs_completed, 0);
    assert_eq!(stats.runs_failed, 1);
    assert!(stats.last_error.is_some());
}

#[test]
fn catalog_import_failure_fails_run() {
    let h = harness();
    h.catalog.fail_on("import");

    let progress = h.orchestrator.handle(&ChangeEvent::EntityAdded {
        channel_id: 1,
        entity_id: 30,
    });

    assert_failed_without_announcement(&h, &progress);
    assert!(progress.message.contains("service unavailable"), "{}", progress.message);
    assert_eq!(progress.percent, 51);
    assert_eq!(h.catalog.calls(), vec!["import catalog.xml"]);
}

#[test]
fn post_import_notification_failure_fails_run() {
    let h = harness();
    h.catalog.fail_on("notify");

    let progress = h
        .orchestrator
        .handle(&ChangeEvent::entity_updated(1, 5, Some("NodeName")));

    assert_failed_without_announcement(&h, &progress);
    assert_eq!(progress.percent, 75);
    assert_eq!(
        h.catalog.calls(),
        vec!["import catalog.xml", "notify catalog.xml"]
    );
    assert!(h.client.requests().is_empty());
}

#[test]
fn publish_status_query_failure_fails_run() {
    let h = harness();
    h.client.push_post(Ok(HttpResponse::ok_json("true")));
    h.client.push_get(Ok(HttpResponse::with_status(500)));

    let progress = h.orchestrator.handle(&ChangeEvent::Publish { channel_id: 1 });

    assert_failed_without_announcement(&h, &progress);
    assert_eq!(progress.percent, 76);
    assert_eq!(h.client.posted_bodies().len(), 1);
}

#[test]
fn unnamed_channel_is_announced_by_id() {
    let h = harness_with(FakeHistory::default(), None);

    h.orchestrator.handle(&ChangeEvent::EntityAdded {
        channel_id: 1,
        entity_id: 30,
    });

    assert_eq!(
        h.catalog.calls().last().map(String::as_str),
        Some("completed [1] EntityAdded true")
    );
}

#[test]
fn every_run_reports_a_terminal() {
    let h = harness();
    let events = [
        ChangeEvent::EntityAdded {
            channel_id: 1,
            entity_id: 30,
        },
        ChangeEvent::LinkUpdated(LinkChange::new(1, 5, 30)),
        ChangeEvent::EntityDeleted {
            channel_id: 1,
            entity_id: 30,
        },
    ];

    for event in &events {
        let progress = h.orchestrator.handle(event);
        assert!(progress.is_terminal());
        assert_eq!(h.progress.last(), Some(progress));
    }

    let stats = h.orchestrator.stats();
    assert_eq!(stats.runs_completed, 2);
    assert_eq!(stats.runs_failed, 1);
}
