//! Diff-skus command implementation.

use crate::OutputFormat;
use chansync_protocol::{diff_sku_snapshots, SkuRecord};
use serde::Serialize;
use std::path::Path;

/// SKU diff result.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SkuDiff {
    /// SKU ids only in the current snapshot.
    pub to_add: Vec<String>,
    /// SKU ids only in the previous snapshot.
    pub to_delete: Vec<String>,
}

/// Diffs two snapshot files. A missing file counts as an empty snapshot.
pub fn diff_files(old: &Path, new: &Path) -> Result<SkuDiff, Box<dyn std::error::Error>> {
    let old = read_snapshot(old)?;
    let new = read_snapshot(new)?;
    let diff = diff_sku_snapshots(old.as_deref(), new.as_deref())?;

    Ok(SkuDiff {
        to_add: ids(&diff.to_add),
        to_delete: ids(&diff.to_delete),
    })
}

/// Runs the diff-skus command.
pub fn run(old: &Path, new: &Path, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let diff = diff_files(old, new)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&diff)?);
        }
        OutputFormat::Text => {
            println!("SKUs to add:    {}", diff.to_add.len());
            for id in &diff.to_add {
                println!("  + {}", id);
            }
            println!("SKUs to delete: {}", diff.to_delete.len());
            for id in &diff.to_delete {
                println!("  - {}", id);
            }
        }
    }

    Ok(())
}

fn read_snapshot(path: &Path) -> std::io::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn ids(records: &[SkuRecord]) -> Vec<String> {
    records.iter().map(|r| r.id.clone()).collect()
}
