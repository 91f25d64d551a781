//! Client for a Supabase project: PostgREST tables, RPC functions and the
//! storage API.
//!
//! All requests carry the project key in `apikey`. The bearer token is the
//! same key unless a signed-in user's access token is supplied, in which
//! case row level security applies to that user.

use anyhow::{Context, Result};
use reqwest::{header, Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::http::{api_error, build_client, send_with_retry};
use crate::models::StorageObject;

/// Accept header asking PostgREST for exactly one object.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// API client for one Supabase project.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    bearer: String,
}

/// Total row count from a `Content-Range` header (`0-19/342`, `*/0`).
/// None when the server did not count (`0-19/*`).
pub fn parse_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

impl SupabaseClient {
    pub fn new(base_url: &str, api_key: String) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer: api_key.clone(),
            api_key,
        })
    }

    /// Act as a signed-in user: requests are authorized with the user's
    /// access token, so row level security applies to that user.
    pub fn with_access_token(mut self, token: String) -> Self {
        self.bearer = token;
        self
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }

    fn storage_url(&self, path: &str) -> String {
        format!("{}/storage/v1/{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("apikey", &self.api_key).bearer_auth(&self.bearer)
    }

    /// Run a filtered select. With `count_exact` the total number of matching
    /// rows (ignoring `offset`/`limit`) is returned alongside the rows.
    pub async fn select(
        &self,
        table: &str,
        params: &[(String, String)],
        count_exact: bool,
    ) -> Result<(Vec<Value>, Option<u64>)> {
        let url = self.rest_url(table);
        let response = send_with_retry("select", || {
            let request = self.authorized(self.client.get(&url)).query(params);
            if count_exact {
                request.header("Prefer", "count=exact")
            } else {
                request
            }
        })
        .await?;

        let total = response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);
        let rows: Vec<Value> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse rows from {}", table))?;
        debug!(table = table, rows = rows.len(), total = ?total, "Select completed");
        Ok((rows, total))
    }

    /// Fetch exactly one row. PostgREST answers PGRST116 both when nothing
    /// matches and when several rows match; either case is `Ok(None)`.
    pub async fn select_single(
        &self,
        table: &str,
        params: &[(String, String)],
    ) -> Result<Option<Value>> {
        let url = self.rest_url(table);
        let result = send_with_retry("select single", || {
            self.authorized(self.client.get(&url))
                .query(params)
                .header(header::ACCEPT, SINGLE_OBJECT)
        })
        .await;

        match result {
            Ok(response) => {
                let row: Value = response
                    .json()
                    .await
                    .with_context(|| format!("Failed to parse row from {}", table))?;
                Ok(Some(row))
            }
            Err(e) if api_error(&e).map(|a| a.is_no_rows()).unwrap_or(false) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Insert rows, merging into existing rows that collide on `on_conflict`.
    /// Returns the number of rows sent.
    pub async fn upsert<T: Serialize>(&self, table: &str, rows: &[T], on_conflict: &str) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let url = self.rest_url(table);
        send_with_retry("upsert", || {
            self.authorized(self.client.post(&url))
                .query(&[("on_conflict", on_conflict)])
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(rows)
        })
        .await
        .with_context(|| format!("Failed to upsert {} rows into {}", rows.len(), table))?;
        Ok(rows.len())
    }

    pub async fn insert<T: Serialize>(&self, table: &str, row: &T) -> Result<()> {
        let url = self.rest_url(table);
        send_with_retry("insert", || {
            self.authorized(self.client.post(&url))
                .header("Prefer", "return=minimal")
                .json(row)
        })
        .await
        .with_context(|| format!("Failed to insert into {}", table))?;
        Ok(())
    }

    /// Delete the rows matching every filter in `params` (`col=eq.value`).
    pub async fn delete(&self, table: &str, params: &[(String, String)]) -> Result<()> {
        let url = self.rest_url(table);
        send_with_retry("delete", || {
            self.authorized(self.client.delete(&url))
                .query(params)
                .header("Prefer", "return=minimal")
        })
        .await
        .with_context(|| format!("Failed to delete from {}", table))?;
        Ok(())
    }

    /// Call a Postgres function exposed over RPC. Void functions yield `Null`.
    pub async fn rpc(&self, function: &str, args: &Value) -> Result<Value> {
        let url = self.rest_url(&format!("rpc/{}", function));
        let response = send_with_retry("rpc", || {
            self.authorized(self.client.post(&url)).json(args)
        })
        .await
        .with_context(|| format!("RPC {} failed", function))?;

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).with_context(|| format!("Failed to parse RPC {} result", function))
    }

    // ===== Storage =====

    /// List up to `limit` objects directly inside `prefix` (a folder path).
    pub async fn list_objects(&self, bucket: &str, prefix: &str, limit: u32) -> Result<Vec<StorageObject>> {
        let url = self.storage_url(&format!("object/list/{}", bucket));
        let body = serde_json::json!({
            "prefix": prefix,
            "limit": limit,
            "offset": 0,
            "sortBy": { "column": "name", "order": "asc" },
        });
        let response = send_with_retry("storage list", || {
            self.authorized(self.client.post(&url)).json(&body)
        })
        .await
        .with_context(|| format!("Failed to list {}/{}", bucket, prefix))?;

        response
            .json()
            .await
            .context("Failed to parse storage listing")
    }

    /// Upload `bytes` to `path` inside `bucket`. Without `upsert` an
    /// existing object is left untouched and the call fails with a conflict.
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        content_type: &str,
        upsert: bool,
    ) -> Result<()> {
        let url = self.storage_url(&format!("object/{}/{}", bucket, path));
        send_with_retry("storage upload", || {
            self.authorized(self.client.post(&url))
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CACHE_CONTROL, "max-age=3600")
                .header("x-upsert", if upsert { "true" } else { "false" })
                .body(bytes.to_vec())
        })
        .await
        .with_context(|| format!("Failed to upload {}/{}", bucket, path))?;
        Ok(())
    }

    /// Public URL of an object in a public bucket. Pure string building.
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        self.storage_url(&format!("object/public/{}/{}", bucket, path))
    }
}
