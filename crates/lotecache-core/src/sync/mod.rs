//! Batch jobs that copy the Airtable inventory into Supabase.
//!
//! - `records`: field data into the inventory cache table
//! - `images`: photos into the storage bucket, URLs back into the table
//! - `scheduler`: fixed-interval runner that never overlaps runs

pub mod images;
pub mod records;
pub mod scheduler;

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::api::RecordSource;
use crate::models::AirtableRecord;

pub use images::ImageMirror;
pub use records::{sync_inventory, DataSyncOptions};
pub use scheduler::{run_every, RunGuard, RunPermit};

/// Outcome of a data sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataSyncSummary {
    pub pages: usize,
    pub fetched: usize,
    pub synced: usize,
    pub failed: usize,
}

/// Outcome of an image mirror run. `skipped` counts photos already in the
/// bucket; `failed` counts photos that could not be mirrored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageSyncSummary {
    pub records: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Walks every page of records matching a formula, pausing between pages.
pub struct PageCursor<'a> {
    source: &'a dyn RecordSource,
    formula: &'a str,
    page_size: u32,
    delay: Duration,
    offset: Option<String>,
    pages: usize,
    done: bool,
}

impl<'a> PageCursor<'a> {
    pub fn new(source: &'a dyn RecordSource, formula: &'a str, page_size: u32, delay: Duration) -> Self {
        Self {
            source,
            formula,
            page_size,
            delay,
            offset: None,
            pages: 0,
            done: false,
        }
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    /// The next page, or None once the source reports no further offset.
    pub async fn next_page(&mut self) -> Result<Option<Vec<AirtableRecord>>> {
        if self.done {
            return Ok(None);
        }
        if self.pages > 0 && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let page = self
            .source
            .fetch_page(self.formula, self.page_size, self.offset.as_deref())
            .await
            .with_context(|| format!("Failed to fetch page {} from Airtable", self.pages + 1))?;

        self.pages += 1;
        self.offset = page.offset;
        self.done = self.offset.is_none();
        debug!(page = self.pages, records = page.records.len(), "Fetched record page");
        Ok(Some(page.records))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{record, FakeSource};
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_cursor_follows_offsets() {
        let source = FakeSource::with_pages(vec![
            vec![record("rec1", json!({})), record("rec2", json!({}))],
            vec![record("rec3", json!({}))],
        ]);
        let mut cursor = PageCursor::new(&source, "{OrdenStatus} = 'Comprado'", 100, Duration::ZERO);

        assert_eq!(cursor.next_page().await.expect("page 1").map(|r| r.len()), Some(2));
        assert_eq!(cursor.next_page().await.expect("page 2").map(|r| r.len()), Some(1));
        assert!(cursor.next_page().await.expect("end").is_none());
        assert_eq!(cursor.pages(), 2);

        let requests = source.requests.lock().unwrap();
        assert_eq!(requests[0].2, None);
        assert_eq!(requests[1].2.as_deref(), Some("off1"));
        assert_eq!(requests[1].1, 100);
    }

    #[tokio::test]
    async fn test_cursor_fetch_error_names_page() {
        let source = FakeSource::default();
        let mut cursor = PageCursor::new(&source, "x", 100, Duration::ZERO);
        let err = cursor.next_page().await.expect_err("no pages");
        assert!(err.to_string().contains("page 1"));
    }
}
