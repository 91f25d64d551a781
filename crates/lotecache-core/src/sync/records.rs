use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, warn};

use super::{DataSyncSummary, PageCursor};
use crate::api::airtable::{status_formula, MAX_PAGE_SIZE};
use crate::api::{RecordSource, TableWriter};
use crate::models::InventoryRow;
use crate::query::LISTED_STATUS;

/// Conflict column for inventory upserts.
pub const RECORD_KEY: &str = "record_id";

#[derive(Debug, Clone)]
pub struct DataSyncOptions {
    pub table: String,
    pub formula: String,
    pub page_delay: Duration,
}

impl Default for DataSyncOptions {
    fn default() -> Self {
        Self {
            table: "inventario_cache".to_string(),
            formula: status_formula("OrdenStatus", LISTED_STATUS),
            page_delay: Duration::from_millis(250),
        }
    }
}

/// Copy every matching record into the inventory table.
///
/// Each page is upserted as one batch. When a batch is rejected its rows are
/// retried one at a time so a single bad record does not sink the page.
/// A failed fetch aborts the run.
pub async fn sync_inventory(
    source: &dyn RecordSource,
    writer: &dyn TableWriter,
    options: &DataSyncOptions,
) -> Result<DataSyncSummary> {
    info!(table = %options.table, formula = %options.formula, "Starting inventory sync");
    let mut summary = DataSyncSummary::default();
    let mut cursor = PageCursor::new(source, &options.formula, MAX_PAGE_SIZE, options.page_delay);

    while let Some(records) = cursor.next_page().await? {
        summary.pages = cursor.pages();
        summary.fetched += records.len();
        if records.is_empty() {
            continue;
        }

        let now = Utc::now();
        let rows = records
            .iter()
            .map(|r| serde_json::to_value(InventoryRow::from_record(r, now)))
            .collect::<Result<Vec<Value>, _>>()
            .context("Failed to serialize inventory rows")?;

        match writer.upsert_rows(&options.table, &rows, RECORD_KEY).await {
            Ok(_) => {
                info!(page = summary.pages, rows = rows.len(), "Upserted page");
                summary.synced += rows.len();
            }
            Err(e) => {
                warn!(page = summary.pages, error = %e, "Batch upsert failed, retrying rows one by one");
                let (ok, failed) = upsert_individually(writer, &options.table, &rows).await;
                summary.synced += ok;
                summary.failed += failed;
            }
        }
    }

    info!(
        pages = summary.pages,
        fetched = summary.fetched,
        synced = summary.synced,
        failed = summary.failed,
        "Inventory sync finished"
    );
    Ok(summary)
}

async fn upsert_individually(writer: &dyn TableWriter, table: &str, rows: &[Value]) -> (usize, usize) {
    let mut ok = 0;
    let mut failed = 0;
    for row in rows {
        match writer.upsert_rows(table, std::slice::from_ref(row), RECORD_KEY).await {
            Ok(_) => ok += 1,
            Err(e) => {
                let record_id = row.get(RECORD_KEY).and_then(Value::as_str).unwrap_or("?");
                error!(record_id = record_id, error = %e, "Failed to upsert record");
                failed += 1;
            }
        }
    }
    (ok, failed)
}
