//! Batched resource import with completion polling.
//!
//! Records are pushed in contiguous batches of at most `max_batch_size`.
//! After the remote side accepts a batch the importer blocks, polling the
//! status endpoint until the import leaves the in-progress state, before
//! sending the next batch.
//!
//! ## Failure semantics
//!
//! - A failed POST aborts the run; later batches are not attempted
//! - An error status from the remote importer aborts the run
//! - A batch that cannot be encoded is returned as an error before it is sent
//! - A failed status query is returned as an error
//! - Batches already imported are never rolled back

use crate::config::{PollPolicy, SyncSettings};
use crate::error::{SyncError, SyncResult};
use crate::http::{HttpClient, ImportEndpoint};
use chansync_protocol::{encode_batch, parse_manifest, ImportRecord, ImportStatus};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Blocking wait between status checks.
pub trait Sleeper: Send + Sync {
    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeps on the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested waits without sleeping, for testing.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Creates a sleeper with no recorded waits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every wait requested so far.
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.waits.lock().push(duration);
    }
}

impl<S: Sleeper + ?Sized> Sleeper for Arc<S> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Why an import run stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportFailure {
    /// The POST of a batch failed (transport error or non-success status).
    Rejected {
        /// Zero-based index of the batch.
        batch: usize,
        /// Error description.
        error: String,
    },
    /// The remote importer reported an error status.
    Remote {
        /// Zero-based index of the batch.
        batch: usize,
        /// Remote message.
        message: String,
    },
}

/// Outcome of an import run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    /// Number of records handed to the importer.
    pub records: usize,
    /// Number of batches the records were split into.
    pub batches_total: usize,
    /// Number of batches fully handled before the run ended.
    pub batches_completed: usize,
    /// Why the run stopped early, if it did.
    pub failure: Option<ImportFailure>,
}

impl ImportReport {
    fn empty() -> Self {
        Self {
            records: 0,
            batches_total: 0,
            batches_completed: 0,
            failure: None,
        }
    }

    /// Returns true if every batch was imported.
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// Returns true if some but not all batches reached the remote side.
    pub fn is_partial(&self) -> bool {
        !self.succeeded() && self.batches_completed > 0
    }

    /// Converts a failed report into the matching engine error.
    pub fn into_result(self) -> SyncResult<Self> {
        match &self.failure {
            None => Ok(self),
            Some(ImportFailure::Rejected { batch, error }) => Err(SyncError::transport(format!(
                "batch {} of {} rejected: {}",
                batch + 1,
                self.batches_total,
                error
            ))),
            Some(ImportFailure::Remote { message, .. }) => {
                Err(SyncError::RemoteImport(message.clone()))
            }
        }
    }
}

/// Splits `items` into contiguous batches of at most `max` elements.
///
/// A `max` of zero is treated as one.
pub fn batches<T>(items: &[T], max: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(max.max(1))
}

/// Pushes import records to the remote service batch by batch.
pub struct BatchImporter<C: HttpClient, S: Sleeper> {
    endpoint: ImportEndpoint<C>,
    sleeper: S,
    max_batch_size: usize,
    poll: PollPolicy,
}

impl<C: HttpClient, S: Sleeper> BatchImporter<C, S> {
    /// Creates an importer from settings.
    pub fn new(settings: &SyncSettings, client: C, sleeper: S) -> Self {
        Self {
            endpoint: ImportEndpoint::new(settings, client),
            sleeper,
            max_batch_size: settings.max_batch_size.max(1),
            poll: settings.poll.clone(),
        }
    }

    /// Returns the HTTP client.
    pub fn client(&self) -> &C {
        self.endpoint.client()
    }

    /// Reads a manifest from disk and imports its records.
    pub fn import_manifest(&self, manifest: &Path, base_dir: &Path) -> SyncResult<ImportReport> {
        info!(
            manifest = %manifest.display(),
            base_dir = %base_dir.display(),
            "starting resource import"
        );
        let xml = std::fs::read_to_string(manifest)?;
        let records = parse_manifest(&xml, base_dir)?;
        self.import(&records)
    }

    /// Imports records in order, batch by batch.
    ///
    /// Returns `Err` when a batch cannot be encoded or a status query
    /// fails; rejected batches and remote errors are reported through
    /// [`ImportReport::failure`].
    pub fn import(&self, records: &[ImportRecord]) -> SyncResult<ImportReport> {
        if records.is_empty() {
            debug!("nothing to tell the server about");
            return Ok(ImportReport::empty());
        }

        let total = records.len();
        let mut report = ImportReport {
            records: total,
            batches_total: total.div_ceil(self.max_batch_size),
            batches_completed: 0,
            failure: None,
        };

        for (index, batch) in batches(records, self.max_batch_size).enumerate() {
            debug!(
                batch = index + 1,
                size = batch.len(),
                total,
                url = self.endpoint.import_url(),
                "sending resources"
            );

            // An encoding failure is local; it never reaches the remote side.
            let body = encode_batch(batch)?;

            match self.endpoint.post_body(body, batch.len()) {
                Ok(true) => {
                    if let ImportStatus::Failed(message) = self.wait_for_completion()? {
                        error!(batch = index + 1, %message, "remote import failed");
                        report.failure = Some(ImportFailure::Remote {
                            batch: index,
                            message,
                        });
                        return Ok(report);
                    }
                }
                Ok(false) => {
                    warn!(batch = index + 1, "remote did not accept batch, not waiting for it");
                }
                Err(e) => {
                    error!(batch = index + 1, error = %e, "import failed");
                    report.failure = Some(ImportFailure::Rejected {
                        batch: index,
                        error: e.to_string(),
                    });
                    return Ok(report);
                }
            }

            report.batches_completed += 1;
        }

        info!(
            records = total,
            batches = report.batches_total,
            "resource import finished"
        );
        Ok(report)
    }

    /// Polls the status endpoint until the import is no longer running.
    ///
    /// Has no attempt ceiling.
    fn wait_for_completion(&self) -> SyncResult<ImportStatus> {
        let mut status = self.endpoint.status()?;
        let mut attempt = 0u32;

        while status.is_importing() {
            attempt = attempt.saturating_add(1);
            let delay = self.poll.delay_for_attempt(attempt);
            debug!(attempt, delay_secs = delay.as_secs(), "remote still importing");
            self.sleeper.sleep(delay);
            status = self.endpoint.status()?;
        }

        Ok(status)
    }
}
