//! Loading a catalog page supplied by the caller.
//!
//! A page is a JSON array of catalog records. Records that cannot be read
//! are skipped with a warning so one bad entry does not sink the page.

use std::path::Path;

use anyhow::{bail, Context, Result};
use log::{debug, warn};
use serde_json::Value;

use crate::models::CatalogEntry;

/// Parse a catalog page document.
pub fn parse_catalog_page(json: &str) -> Result<Vec<CatalogEntry>> {
    let value: Value = serde_json::from_str(json).context("catalog page is not valid JSON")?;
    let Value::Array(records) = value else {
        bail!("catalog page must be a JSON array of records");
    };

    let total = records.len();
    let entries: Vec<CatalogEntry> = records
        .into_iter()
        .enumerate()
        .filter_map(|(idx, record)| match CatalogEntry::from_value(record) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("skipping catalog record #{}: {}", idx, err);
                None
            }
        })
        .collect();

    debug!("catalog page: {} of {} records usable", entries.len(), total);
    Ok(entries)
}

/// Read and parse a catalog page from disk.
pub fn load_catalog_page(path: &Path) -> Result<Vec<CatalogEntry>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog page {}", path.display()))?;
    parse_catalog_page(&json).with_context(|| format!("invalid catalog page {}", path.display()))
}
