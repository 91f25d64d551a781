use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::join_all;
use reqwest::Url;
use tracing::{debug, error, info, warn};

use super::records::RECORD_KEY;
use super::{ImageSyncSummary, PageCursor};
use crate::api::airtable::MAX_PAGE_SIZE;
use crate::api::{ImageFetcher, ObjectStore, RecordSource, TableWriter};
use crate::models::{AirtableRecord, ImageField, ImageSyncUpdate};
use crate::utils::dedup_preserving_order;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// What happened to one source photo.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Uploaded(String),
    AlreadyMirrored(String),
    Failed,
}

impl Outcome {
    fn url(&self) -> Option<&str> {
        match self {
            Outcome::Uploaded(url) | Outcome::AlreadyMirrored(url) => Some(url),
            Outcome::Failed => None,
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    uploaded: usize,
    skipped: usize,
    failed: usize,
}

impl Tally {
    fn count(&mut self, outcomes: &[Outcome]) {
        for outcome in outcomes {
            match outcome {
                Outcome::Uploaded(_) => self.uploaded += 1,
                Outcome::AlreadyMirrored(_) => self.skipped += 1,
                Outcome::Failed => self.failed += 1,
            }
        }
    }
}

/// Last path segment of an image URL, used as the stored file name.
pub fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}

/// `{vehicle}/{column}/{file}`
pub fn storage_path(vehicle: &str, field: ImageField, file_name: &str) -> String {
    format!("{}/{}/{}", vehicle, field.column(), file_name)
}

/// Folder for a record's photos: the purchase order when present, else the
/// record id.
pub fn vehicle_folder(record: &AirtableRecord) -> String {
    record.text("OrdenCompra").unwrap_or_else(|| record.id.clone())
}

/// Column value written back for a field: the cover keeps its first photo,
/// galleries are comma-joined. Nothing mirrored gives None.
pub fn column_value(field: ImageField, urls: &[String]) -> Option<String> {
    if urls.is_empty() {
        return None;
    }
    match field {
        ImageField::Feature => urls.first().cloned(),
        ImageField::Exterior | ImageField::Interior => Some(urls.join(",")),
    }
}

/// Copies listing photos into the storage bucket and points the inventory
/// table at the copies.
pub struct ImageMirror {
    store: Arc<dyn ObjectStore>,
    fetcher: Arc<dyn ImageFetcher>,
    bucket: String,
}

impl ImageMirror {
    pub fn new(store: Arc<dyn ObjectStore>, fetcher: Arc<dyn ImageFetcher>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            fetcher,
            bucket: bucket.into(),
        }
    }

    async fn mirror_url(&self, vehicle: &str, field: ImageField, existing: &HashSet<String>, url: &str) -> Outcome {
        match self.try_mirror_url(vehicle, field, existing, url).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(url = url, field = %field, error = %e, "Failed to mirror image");
                Outcome::Failed
            }
        }
    }

    async fn try_mirror_url(
        &self,
        vehicle: &str,
        field: ImageField,
        existing: &HashSet<String>,
        url: &str,
    ) -> Result<Outcome> {
        let file_name = file_name_from_url(url)
            .with_context(|| format!("No file name in image URL {}", url))?;
        let path = storage_path(vehicle, field, &file_name);

        if existing.contains(&file_name) {
            debug!(path = %path, "Already in bucket");
            return Ok(Outcome::AlreadyMirrored(self.store.public_url(&self.bucket, &path)));
        }

        let Some(image) = self.fetcher.fetch_image(url).await? else {
            return Ok(Outcome::Failed);
        };
        let content_type = image.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
        self.store
            .put_object(&self.bucket, &path, image.bytes, content_type)
            .await
            .with_context(|| format!("Failed to upload {}", path))?;

        debug!(path = %path, "Uploaded image");
        Ok(Outcome::Uploaded(self.store.public_url(&self.bucket, &path)))
    }

    async fn mirror_field(&self, record: &AirtableRecord, vehicle: &str, field: ImageField) -> Vec<Outcome> {
        let urls = dedup_preserving_order(record.list(field.column()));
        if urls.is_empty() {
            return Vec::new();
        }

        let folder = format!("{}/{}", vehicle, field.column());
        let existing: HashSet<String> = match self.store.object_names(&self.bucket, &folder).await {
            Ok(names) => names.into_iter().collect(),
            Err(e) => {
                warn!(folder = %folder, error = %e, "Could not list folder, uploading everything");
                HashSet::new()
            }
        };

        join_all(
            urls.iter()
                .map(|url| self.mirror_url(vehicle, field, &existing, url)),
        )
        .await
    }

    /// Mirror one record's photos. All three columns are processed
    /// concurrently.
    async fn mirror_record(&self, record: &AirtableRecord, tally: &mut Tally) -> ImageSyncUpdate {
        let vehicle = vehicle_folder(record);
        let results = join_all(
            ImageField::ALL
                .iter()
                .map(|field| self.mirror_field(record, &vehicle, *field)),
        )
        .await;

        let mut columns: [Option<String>; 3] = Default::default();
        for (slot, (field, outcomes)) in columns.iter_mut().zip(ImageField::ALL.iter().zip(&results)) {
            tally.count(outcomes);
            let urls: Vec<String> = outcomes
                .iter()
                .filter_map(Outcome::url)
                .map(str::to_string)
                .collect();
            *slot = column_value(*field, &urls);
        }
        let [feature_image_url, fotos_exterior_url, fotos_interior_url] = columns;

        ImageSyncUpdate {
            record_id: record.id.clone(),
            feature_image_url,
            fotos_exterior_url,
            fotos_interior_url,
            last_synced_at: Utc::now(),
        }
    }

    /// Mirror every record matching `formula` and write the new URLs to
    /// `table` in a single upsert.
    pub async fn run(
        &self,
        source: &dyn RecordSource,
        writer: &dyn TableWriter,
        table: &str,
        formula: &str,
        page_delay: Duration,
    ) -> Result<ImageSyncSummary> {
        info!(bucket = %self.bucket, formula = formula, "Starting image sync");
        let mut summary = ImageSyncSummary::default();
        let mut tally = Tally::default();
        let mut updates = Vec::new();

        let mut cursor = PageCursor::new(source, formula, MAX_PAGE_SIZE, page_delay);
        while let Some(records) = cursor.next_page().await? {
            for record in &records {
                debug!(record_id = %record.id, "Mirroring record images");
                updates.push(self.mirror_record(record, &mut tally).await);
                summary.records += 1;
            }
        }
        summary.uploaded = tally.uploaded;
        summary.skipped = tally.skipped;
        summary.failed = tally.failed;

        updates.retain(|u| !u.record_id.is_empty());
        if updates.is_empty() {
            warn!("No image updates to write");
            return Ok(summary);
        }

        let rows = updates
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to serialize image updates")?;
        writer
            .upsert_rows(table, &rows, RECORD_KEY)
            .await
            .context("Failed to write image URLs")?;

        info!(
            records = summary.records,
            uploaded = summary.uploaded,
            skipped = summary.skipped,
            failed = summary.failed,
            "Image sync finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::api::FetchedImage;
    use crate::sync::testing::{record, FakeSource, FakeWriter};

    #[derive(Default)]
    struct FakeStore {
        objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
        fail_listing: bool,
    }

    #[async_trait]
    impl ObjectStore for FakeStore {
        async fn object_names(&self, _bucket: &str, folder: &str) -> Result<Vec<String>> {
            if self.fail_listing {
                return Err(anyhow!("listing unavailable"));
            }
            let prefix = format!("{}/", folder);
            Ok(self
                .objects
                .lock()
                .unwrap()
                .keys()
                .filter_map(|k| k.strip_prefix(&prefix))
                .filter(|rest| !rest.contains('/'))
                .map(str::to_string)
                .collect())
        }

        async fn put_object(&self, _bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
            let mut objects = self.objects.lock().unwrap();
            if objects.contains_key(path) {
                return Err(anyhow!("The resource already exists"));
            }
            objects.insert(path.to_string(), (bytes, content_type.to_string()));
            Ok(())
        }

        fn public_url(&self, bucket: &str, path: &str) -> String {
            format!("https://proj.supabase.co/storage/v1/object/public/{}/{}", bucket, path)
        }
    }

    /// URLs containing "missing" answer 404, "boom" errors, anything else
    /// serves a small JPEG (PNG when the URL ends in .png, without a type).
    #[derive(Default)]
    struct FakeFetcher {
        fetched: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageFetcher for FakeFetcher {
        async fn fetch_image(&self, url: &str) -> Result<Option<FetchedImage>> {
            self.fetched.lock().unwrap().push(url.to_string());
            if url.contains("missing") {
                return Ok(None);
            }
            if url.contains("boom") {
                return Err(anyhow!("connection reset"));
            }
            let content_type = (!url.ends_with(".png")).then(|| "image/jpeg".to_string());
            Ok(Some(FetchedImage {
                bytes: vec![0xFF, 0xD8, 0xFF],
                content_type,
            }))
        }
    }

    const PUBLIC: &str = "https://proj.supabase.co/storage/v1/object/public/fotos_airtable";

    fn mirror(store: Arc<FakeStore>, fetcher: Arc<FakeFetcher>) -> ImageMirror {
        ImageMirror::new(store, fetcher, "fotos_airtable")
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://dl.airtable.com/att/abc/front.jpg?w=800").as_deref(),
            Some("front.jpg")
        );
        assert_eq!(file_name_from_url("https://cdn.example.com/a/b/").as_deref(), Some("b"));
        assert_eq!(file_name_from_url("https://cdn.example.com/"), None);
        assert_eq!(file_name_from_url("not a url"), None);
    }

    #[test]
    fn test_column_values() {
        let urls = vec!["a".to_string(), "b".to_string()];
        assert_eq!(column_value(ImageField::Feature, &urls).as_deref(), Some("a"));
        assert_eq!(column_value(ImageField::Exterior, &urls).as_deref(), Some("a,b"));
        assert_eq!(column_value(ImageField::Interior, &[]), None);
        assert_eq!(storage_path("OC-7", ImageField::Interior, "x.jpg"), "OC-7/fotos_interior_url/x.jpg");
    }

    #[test]
    fn test_vehicle_folder_falls_back_to_record_id() {
        assert_eq!(vehicle_folder(&record("rec1", json!({"OrdenCompra": "OC-1042"}))), "OC-1042");
        assert_eq!(vehicle_folder(&record("rec2", json!({"OrdenCompra": "  "}))), "rec2");
    }

    #[tokio::test]
    async fn test_run_mirrors_and_writes_back() {
        let store = Arc::new(FakeStore::default());
        store.objects.lock().unwrap().insert(
            "OC-1/fotos_exterior_url/side.jpg".to_string(),
            (vec![1], "image/jpeg".to_string()),
        );
        let fetcher = Arc::new(FakeFetcher::default());
        let source = FakeSource::with_pages(vec![vec![
            record(
                "rec1",
                json!({
                    "OrdenCompra": "OC-1",
                    "feature_image_url": "https://img.example.com/1/cover.png",
                    "fotos_exterior_url": "https://img.example.com/1/side.jpg, https://img.example.com/1/missing.jpg",
                    "fotos_interior_url": ["https://img.example.com/1/seat.jpg", "https://img.example.com/1/boom.jpg"]
                }),
            ),
            record("rec2", json!({})),
        ]]);
        let writer = FakeWriter::default();

        let summary = mirror(store.clone(), fetcher.clone())
            .run(&source, &writer, "inventario_cache", "{OrdenStatus} = 'Comprado'", Duration::ZERO)
            .await
            .expect("run");

        assert_eq!(
            summary,
            ImageSyncSummary {
                records: 2,
                uploaded: 2,
                skipped: 1,
                failed: 2
            }
        );

        // Existing file was not downloaded again
        let fetched = fetcher.fetched.lock().unwrap();
        assert!(!fetched.iter().any(|u| u.ends_with("side.jpg")));

        let objects = store.objects.lock().unwrap();
        assert_eq!(objects["OC-1/feature_image_url/cover.png"].1, DEFAULT_CONTENT_TYPE);
        assert_eq!(objects["OC-1/fotos_interior_url/seat.jpg"].1, "image/jpeg");

        let calls = writer.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (table, rows, key) = &calls[0];
        assert_eq!(table, "inventario_cache");
        assert_eq!(key, "record_id");
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0]["feature_image_url"],
            json!(format!("{}/OC-1/feature_image_url/cover.png", PUBLIC))
        );
        assert_eq!(
            rows[0]["fotos_exterior_url"],
            json!(format!("{}/OC-1/fotos_exterior_url/side.jpg", PUBLIC))
        );
        assert_eq!(
            rows[0]["fotos_interior_url"],
            json!(format!("{}/OC-1/fotos_interior_url/seat.jpg", PUBLIC))
        );
        assert_eq!(rows[1]["record_id"], json!("rec2"));
        assert!(rows[1]["feature_image_url"].is_null());
    }

    #[tokio::test]
    async fn test_listing_failure_still_uploads() {
        let store = Arc::new(FakeStore {
            fail_listing: true,
            ..FakeStore::default()
        });
        let fetcher = Arc::new(FakeFetcher::default());
        let rec = record(
            "rec9",
            json!({"fotos_exterior_url": ["https://img.example.com/9/a.jpg", "https://img.example.com/9/b.jpg"]}),
        );

        let mut tally = Tally::default();
        let update = mirror(store.clone(), fetcher).mirror_record(&rec, &mut tally).await;
        assert_eq!(tally.uploaded, 2);
        assert_eq!(
            update.fotos_exterior_url,
            Some(format!(
                "{p}/rec9/fotos_exterior_url/a.jpg,{p}/rec9/fotos_exterior_url/b.jpg",
                p = PUBLIC
            ))
        );
        assert_eq!(update.feature_image_url, None);
    }

    #[tokio::test]
    async fn test_no_records_skips_write() {
        let source = FakeSource::with_pages(vec![vec![]]);
        let writer = FakeWriter::default();
        let summary = mirror(Arc::new(FakeStore::default()), Arc::new(FakeFetcher::default()))
            .run(&source, &writer, "inventario_cache", "x", Duration::ZERO)
            .await
            .expect("run");
        assert_eq!(summary, ImageSyncSummary::default());
        assert!(writer.calls.lock().unwrap().is_empty());
    }
}
