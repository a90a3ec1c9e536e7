//! # Chansync Protocol
//!
//! Data model and wire types for incremental channel synchronization.
//!
//! This crate provides:
//! - `StructureNode` placements and path helpers
//! - `ChangeEvent` for the seven kinds of channel change
//! - `ImportRecord` and its JSON wire form
//! - Presence diffing of keyed record lists (SKU snapshots)
//! - Resource manifest parsing
//! - Remote import status tokens and progress reports
//!
//! This is a pure crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod diff;
mod error;
mod event;
mod manifest;
mod progress;
mod record;
mod status;
mod structure;

pub use diff::{diff, diff_sku_snapshots, parse_sku_snapshot, DiffResult, Keyed, SkuRecord};
pub use error::{ProtocolError, ProtocolResult};
pub use event::{ChangeEvent, EventKind, LinkChange};
pub use manifest::{parse_manifest, resolve_resource_path};
pub use progress::{SyncProgress, Terminal};
pub use record::{encode_batch, EntryCode, ImportAction, ImportRecord, MetaField, MetaValue};
pub use status::{ImportStatus, ERROR_PREFIX, IMPORTING_TOKEN};
pub use structure::{format_path, parse_path, EntityId, StructureNode};
