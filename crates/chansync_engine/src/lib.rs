//! # Chansync Engine
//!
//! Incremental synchronization of a product channel into a downstream
//! catalog.
//!
//! This crate provides:
//! - Structure resolution per change event (which nodes must be re-sent)
//! - Batched resource import with blocking completion polling
//! - The per-event state machine (initiated → resolving → building →
//!   pushing → completed/failed)
//! - HTTP transport abstraction with a blocking `reqwest` client
//! - Collaborator traits for document building and the catalog API
//! - A CVL cache with explicit invalidation
//!
//! ## Architecture
//!
//! Data flows one way:
//!
//! 1. A [`ChangeEvent`](chansync_protocol::ChangeEvent) enters the
//!    [`SyncOrchestrator`]
//! 2. The [`StructureResolver`] reads the [`StructureRepository`]
//! 3. A [`DocumentBuilder`] turns the nodes into documents
//! 4. The [`CatalogApi`] imports them; resources go through the
//!    [`BatchImporter`]
//! 5. A completion notification closes the run
//!
//! ## Key Invariants
//!
//! - One event per run, processed start to finish on the calling thread
//! - Every run ends in a terminal progress report
//! - Placements are never dropped; duplicates are acceptable
//! - A failed batch stops the import; earlier batches stay imported
//! - The HTTP client is built once and never reconfigured

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collab;
mod config;
mod cvl;
mod error;
mod http;
mod importer;
mod orchestrator;
mod repository;
mod resolver;

pub use collab::{
    CatalogApi, CatalogDocument, DocumentBuilder, EntityKind, EntitySource, FieldSnapshots,
    ProgressSink, RecordingProgressSink, ResourceManifest, RevisionHistory, TracingProgressSink,
};
pub use config::{PollPolicy, SyncSettings, DEFAULT_MAX_BATCH_SIZE};
pub use cvl::{Cvl, CvlCache, CvlDataMode, CvlLoader, CvlText, CvlValue, CVL_KEY_DELIMITER};
pub use error::{SyncError, SyncResult};
pub use http::{
    HttpClient, HttpResponse, ImportEndpoint, RecordedRequest, ReqwestClient, ScriptedClient,
};
pub use importer::{
    batches, BatchImporter, ImportFailure, ImportReport, RecordingSleeper, Sleeper, ThreadSleeper,
};
pub use orchestrator::{
    channel_display_name, Collaborators, RunOutcome, RunState, SharedCvlCache, SyncOrchestrator,
    SyncStats,
};
pub use repository::{MemoryStructureRepository, StructureRepository};
pub use resolver::{deduplicated_ancestors, placements_with_multiplicity, StructureResolver};
