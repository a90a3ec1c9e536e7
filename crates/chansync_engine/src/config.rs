//! Configuration for the sync engine.

use chansync_protocol::EntityId;
use std::path::PathBuf;
use std::time::Duration;

/// Default maximum number of records per import batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// Settings for one engine instance.
///
/// Built once by the host and shared read-only by every component.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Channel being synchronized.
    pub channel_id: EntityId,
    /// Base URL of the remote import API, e.g.
    /// `https://shop.example.com/inriverapi/InriverDataImport/`.
    pub endpoint: String,
    /// API key sent in the `apikey` header.
    pub api_key: String,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Maximum number of records per import batch.
    pub max_batch_size: usize,
    /// Wait policy for the import status poll loop.
    pub poll: PollPolicy,
    /// Root folder exported resource files are written under.
    pub resources_root: PathBuf,
    /// Entity type id of resources.
    pub resource_type: String,
    /// Entity type id of items.
    pub item_type: String,
    /// Entity type id of channel nodes.
    pub channel_node_type: String,
    /// Name of the item field holding the serialized SKU list.
    pub sku_field: String,
    /// Maximum length of the channel name sent in completion notifications.
    pub display_name_max_len: usize,
}

impl SyncSettings {
    /// Creates settings for a channel and remote endpoint.
    pub fn new(channel_id: EntityId, endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            channel_id,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            request_timeout: Duration::from_secs(60 * 60),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            poll: PollPolicy::default(),
            resources_root: PathBuf::from("resources"),
            resource_type: "Resource".into(),
            item_type: "Item".into(),
            channel_node_type: "ChannelNode".into(),
            sku_field: "SKUs".into(),
            display_name_max_len: 100,
        }
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the maximum batch size. Zero is treated as one.
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.max(1);
        self
    }

    /// Sets the poll policy.
    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Sets the resources root folder.
    pub fn with_resources_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.resources_root = root.into();
        self
    }

    /// Sets the SKU field name.
    pub fn with_sku_field(mut self, field: impl Into<String>) -> Self {
        self.sku_field = field.into();
        self
    }

    /// URL of the resource import endpoint.
    pub fn import_url(&self) -> String {
        self.endpoint_url("ImportResources")
    }

    /// URL of the import status endpoint.
    pub fn status_url(&self) -> String {
        self.endpoint_url("IsImporting")
    }

    fn endpoint_url(&self, action: &str) -> String {
        if self.endpoint.ends_with('/') {
            format!("{}{}", self.endpoint, action)
        } else {
            format!("{}/{}", self.endpoint, action)
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::new(0, "", "")
    }
}

/// Escalating wait policy for the import status poll loop.
///
/// There is no attempt ceiling: a remote importer that never leaves the
/// in-progress state keeps the loop waiting indefinitely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait used for the first attempts.
    pub short: Duration,
    /// Wait used once `medium_from` attempts have been made.
    pub medium: Duration,
    /// Wait used once `long_from` attempts have been made.
    pub long: Duration,
    /// First attempt (1-based) that waits `medium`.
    pub medium_from: u32,
    /// First attempt (1-based) that waits `long`.
    pub long_from: u32,
}

impl PollPolicy {
    /// Returns the wait before re-checking the status on `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt >= self.long_from {
            self.long
        } else if attempt >= self.medium_from {
            self.medium
        } else {
            self.short
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            short: Duration::from_secs(5),
            medium: Duration::from_secs(60),
            long: Duration::from_secs(600),
            medium_from: 10,
            long_from: 30,
        }
    }
}
