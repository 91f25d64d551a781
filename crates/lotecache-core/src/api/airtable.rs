//! Client for the Airtable REST API (`https://api.airtable.com/v0`).
//!
//! Only listing is needed: the inventory table is read page by page with a
//! formula filter and never written from here.

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::debug;

use super::http::{build_client, send_with_retry};
use crate::models::RecordPage;

/// Base URL for Airtable's REST API
const API_BASE_URL: &str = "https://api.airtable.com/v0";

/// Airtable refuses page sizes above 100.
pub const MAX_PAGE_SIZE: u32 = 100;

/// API client for one Airtable table.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct AirtableClient {
    client: Client,
    api_key: String,
    base_id: String,
    table_id: String,
    base_url: String,
}

impl AirtableClient {
    pub fn new(api_key: String, base_id: String, table_id: String) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            api_key,
            base_id,
            table_id,
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different API host (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn table_url(&self) -> String {
        format!("{}/{}/{}", self.base_url, self.base_id, self.table_id)
    }

    /// Fetch one page of records matching `filter_formula`.
    /// Pass the `offset` returned by the previous page to continue.
    pub async fn list_page(
        &self,
        filter_formula: &str,
        page_size: u32,
        offset: Option<&str>,
    ) -> Result<RecordPage> {
        let url = self.table_url();
        let mut query: Vec<(&str, String)> = vec![
            ("filterByFormula", filter_formula.to_string()),
            ("pageSize", page_size.clamp(1, MAX_PAGE_SIZE).to_string()),
        ];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        let response = send_with_retry("airtable list records", || {
            self.client.get(&url).bearer_auth(&self.api_key).query(&query)
        })
        .await?;

        let page: RecordPage = response
            .json()
            .await
            .context("Failed to parse Airtable records response")?;
        debug!(records = page.records.len(), more = page.offset.is_some(), "Airtable page received");
        Ok(page)
    }
}

/// Formula selecting records whose `field` equals `value`.
pub fn status_formula(field: &str, value: &str) -> String {
    format!("{{{}}} = '{}'", field, value.replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_formula() {
        assert_eq!(status_formula("OrdenStatus", "Comprado"), "{OrdenStatus} = 'Comprado'");
        assert_eq!(status_formula("Nota", "it's"), "{Nota} = 'it\\'s'");
    }

    #[test]
    fn test_table_url() {
        let client = AirtableClient::new("key".into(), "appBase".into(), "tblInv".into())
            .expect("client")
            .with_base_url("http://localhost:9000/v0/");
        assert_eq!(client.table_url(), "http://localhost:9000/v0/appBase/tblInv");
    }
}
