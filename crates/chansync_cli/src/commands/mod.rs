//! CLI command implementations.

pub mod diff_skus;
pub mod import_resources;
