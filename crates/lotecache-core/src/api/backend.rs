//! Service-facing seams over the remote APIs.
//!
//! The services and sync jobs talk to these traits rather than to the HTTP
//! clients directly, which keeps them testable with in-memory fakes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::{json, Value};
use tracing::warn;

use super::http::build_client;
use super::{AirtableClient, SupabaseClient};
use crate::models::RecordPage;
use crate::query::{QueryParams, LISTED_STATUS};

/// Read side of the inventory cache table.
#[async_trait]
pub trait InventoryBackend: Send + Sync {
    /// Rows matching `params` and the total match count.
    async fn query_vehicles(&self, params: &[(String, String)]) -> Result<(Vec<Value>, Option<u64>)>;
    async fn vehicle_by_slug(&self, slug: &str) -> Result<Option<Value>>;
    /// Slugs of listed vehicles, most recently updated first.
    async fn vehicle_slugs(&self) -> Result<Vec<String>>;
    async fn filter_options(&self) -> Result<Value>;
    async fn increment_view_count(&self, vehicle_id: i64) -> Result<()>;
}

/// Per-user saved vehicles.
#[async_trait]
pub trait FavoritesBackend: Send + Sync {
    async fn favorite_ids(&self, user_id: &str) -> Result<Vec<i64>>;
    async fn add_favorite(&self, user_id: &str, vehicle_id: i64) -> Result<()>;
    async fn remove_favorite(&self, user_id: &str, vehicle_id: i64) -> Result<()>;
}

/// Paged source of spreadsheet records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_page(&self, formula: &str, page_size: u32, offset: Option<&str>) -> Result<RecordPage>;
}

/// Bulk upsert target.
#[async_trait]
pub trait TableWriter: Send + Sync {
    async fn upsert_rows(&self, table: &str, rows: &[Value], on_conflict: &str) -> Result<usize>;
}

/// Bucket storage for mirrored images.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Names of the objects directly inside `folder`.
    async fn object_names(&self, bucket: &str, folder: &str) -> Result<Vec<String>>;
    /// Store a new object; never overwrites.
    async fn put_object(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// A downloaded image and its declared content type.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Downloads source images. `Ok(None)` means the server answered with a
/// non-success status.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_image(&self, url: &str) -> Result<Option<FetchedImage>>;
}

// ============================================================================
// Supabase-backed implementations
// ============================================================================

/// The inventory cache table behind PostgREST.
#[derive(Clone)]
pub struct SupabaseInventory {
    client: SupabaseClient,
    table: String,
}

impl SupabaseInventory {
    pub fn new(client: SupabaseClient, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl InventoryBackend for SupabaseInventory {
    async fn query_vehicles(&self, params: &[(String, String)]) -> Result<(Vec<Value>, Option<u64>)> {
        self.client.select(&self.table, params, true).await
    }

    async fn vehicle_by_slug(&self, slug: &str) -> Result<Option<Value>> {
        let params: QueryParams = vec![
            ("select".into(), "*".into()),
            ("slug".into(), format!("eq.{}", slug)),
        ];
        self.client.select_single(&self.table, &params).await
    }

    async fn vehicle_slugs(&self) -> Result<Vec<String>> {
        let params: QueryParams = vec![
            ("select".into(), "slug".into()),
            ("ordenstatus".into(), format!("eq.{}", LISTED_STATUS)),
            ("order".into(), "updated_at.desc".into()),
        ];
        let (rows, _) = self.client.select(&self.table, &params, false).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("slug").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn filter_options(&self) -> Result<Value> {
        self.client.rpc("get_filter_options", &json!({})).await
    }

    async fn increment_view_count(&self, vehicle_id: i64) -> Result<()> {
        self.client
            .rpc("increment_view_count", &json!({ "p_vehicle_id": vehicle_id }))
            .await?;
        Ok(())
    }
}

/// The `user_favorites(user_id, vehicle_id)` table.
#[derive(Clone)]
pub struct SupabaseFavorites {
    client: SupabaseClient,
    table: String,
}

impl SupabaseFavorites {
    pub fn new(client: SupabaseClient, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    fn match_params(user_id: &str, vehicle_id: i64) -> QueryParams {
        vec![
            ("user_id".into(), format!("eq.{}", user_id)),
            ("vehicle_id".into(), format!("eq.{}", vehicle_id)),
        ]
    }
}

#[async_trait]
impl FavoritesBackend for SupabaseFavorites {
    async fn favorite_ids(&self, user_id: &str) -> Result<Vec<i64>> {
        let params: QueryParams = vec![
            ("select".into(), "vehicle_id".into()),
            ("user_id".into(), format!("eq.{}", user_id)),
        ];
        let (rows, _) = self.client.select(&self.table, &params, false).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("vehicle_id").and_then(Value::as_i64))
            .collect())
    }

    async fn add_favorite(&self, user_id: &str, vehicle_id: i64) -> Result<()> {
        self.client
            .insert(&self.table, &json!({ "user_id": user_id, "vehicle_id": vehicle_id }))
            .await
    }

    async fn remove_favorite(&self, user_id: &str, vehicle_id: i64) -> Result<()> {
        self.client
            .delete(&self.table, &Self::match_params(user_id, vehicle_id))
            .await
    }
}

#[async_trait]
impl TableWriter for SupabaseClient {
    async fn upsert_rows(&self, table: &str, rows: &[Value], on_conflict: &str) -> Result<usize> {
        self.upsert(table, rows, on_conflict).await
    }
}

/// Folder listings are capped; vehicles carry a few dozen photos at most.
const FOLDER_LIST_LIMIT: u32 = 1000;

#[async_trait]
impl ObjectStore for SupabaseClient {
    async fn object_names(&self, bucket: &str, folder: &str) -> Result<Vec<String>> {
        let objects = self.list_objects(bucket, folder, FOLDER_LIST_LIMIT).await?;
        Ok(objects.into_iter().map(|o| o.name).collect())
    }

    async fn put_object(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        self.upload(bucket, path, &bytes, content_type, false).await
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        SupabaseClient::public_url(self, bucket, path)
    }
}

#[async_trait]
impl RecordSource for AirtableClient {
    async fn fetch_page(&self, formula: &str, page_size: u32, offset: Option<&str>) -> Result<RecordPage> {
        self.list_page(formula, page_size, offset).await
    }
}

/// Plain HTTP downloader for source image URLs.
#[derive(Clone)]
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client()?,
        })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch_image(&self, url: &str) -> Result<Option<FetchedImage>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to download {}", url))?;

        if !response.status().is_success() {
            warn!(url = url, status = %response.status(), "Image download failed");
            return Ok(None);
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read image body from {}", url))?
            .to_vec();
        Ok(Some(FetchedImage { bytes, content_type }))
    }
}
