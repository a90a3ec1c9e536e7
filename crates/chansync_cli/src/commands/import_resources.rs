//! Import-resources command implementation.

use chansync_engine::{BatchImporter, ImportReport, ReqwestClient, SyncSettings, ThreadSleeper};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Runs the import-resources command.
pub fn run(
    manifest: &Path,
    base_dir: &Path,
    endpoint: &str,
    api_key: &str,
    batch_size: usize,
    timeout_secs: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    if !manifest.exists() {
        return Err(format!("No manifest found at {:?}", manifest).into());
    }

    // The importer never looks at the channel.
    let settings = SyncSettings::new(0, endpoint, api_key)
        .with_max_batch_size(batch_size)
        .with_request_timeout(Duration::from_secs(timeout_secs));

    let client = ReqwestClient::from_settings(&settings)?;
    let importer = BatchImporter::new(&settings, client, ThreadSleeper);

    info!(url = %settings.import_url(), "importing resources");
    let report = importer.import_manifest(manifest, base_dir)?;
    print_report(&report);

    report.into_result()?;
    Ok(())
}

fn print_report(report: &ImportReport) {
    println!("Resource Import");
    println!("===============");
    println!();
    println!("Records:  {}", report.records);
    println!(
        "Batches:  {} of {} completed",
        report.batches_completed, report.batches_total
    );

    if report.succeeded() {
        println!("Status:   OK");
    } else if report.is_partial() {
        println!("Status:   PARTIAL (earlier batches stay imported)");
    } else {
        println!("Status:   FAILED");
    }
}
