use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::InventoryBackend;
use crate::cache::{CacheManager, CachedData, MemoryCache, ViewTracker, DEFAULT_TTL_SECS};
use crate::models::{normalize_vehicles, Vehicle, VehicleFilters, VehiclePage};
use crate::query::{build_vehicle_query, cache_key};

/// Read access to the inventory for the storefront.
pub struct VehicleService {
    backend: Arc<dyn InventoryBackend>,
    memory: MemoryCache,
    disk: CacheManager,
    views: ViewTracker,
    ttl: Duration,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl VehicleService {
    pub fn new(backend: Arc<dyn InventoryBackend>, disk: CacheManager) -> Self {
        Self {
            backend,
            memory: MemoryCache::new(),
            views: ViewTracker::new(disk.clone()),
            disk,
            ttl: Duration::seconds(DEFAULT_TTL_SECS),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn disk_page(&self, key: &str) -> Option<CachedData<VehiclePage>> {
        self.disk.load_page(key).unwrap_or_else(|e| {
            warn!(error = %e, "Could not read disk cache");
            None
        })
    }

    fn with_views(&self, page: VehiclePage) -> VehiclePage {
        VehiclePage {
            vehicles: self.views.apply(page.vehicles),
            total_count: page.total_count,
        }
    }

    /// One page of listings matching `filters`.
    ///
    /// Served from memory or disk while younger than the TTL, otherwise
    /// fetched and cached. If the fetch fails, a stale page is served when one
    /// exists; the fetch error is returned only when nothing is cached.
    pub async fn get_all_vehicles(&self, filters: &VehicleFilters, page: u64) -> Result<VehiclePage> {
        let key = cache_key(filters, page);

        let cached = self.memory.get(&key).await;
        if let Some(entry) = cached.as_ref().filter(|c| c.is_fresh(self.ttl)) {
            debug!(key = %key, "Memory cache hit");
            return Ok(self.with_views(entry.data.clone()));
        }

        if let Some(entry) = self.disk_page(&key).filter(|c| c.is_fresh(self.ttl)) {
            debug!(key = %key, "Disk cache hit");
            let page = entry.data.clone();
            self.memory.insert(key, entry).await;
            return Ok(self.with_views(page));
        }

        match self.fetch_page(filters, page).await {
            Ok(fresh) => {
                self.memory.insert(key.clone(), CachedData::new(fresh.clone())).await;
                if let Err(e) = self.disk.save_page(&key, &fresh) {
                    warn!(error = %e, "Could not write disk cache");
                }
                Ok(self.with_views(fresh))
            }
            Err(e) => {
                error!(error = %e, "Inventory query failed, trying stale cache");
                if let Some(stale) = cached {
                    warn!(age = %stale.age_display(), "Returning stale in-memory page");
                    return Ok(self.with_views(stale.data));
                }
                if let Some(stale) = self.disk_page(&key) {
                    warn!(age = %stale.age_display(), "Returning stale disk page");
                    return Ok(self.with_views(stale.data));
                }
                Err(e)
            }
        }
    }

    async fn fetch_page(&self, filters: &VehicleFilters, page: u64) -> Result<VehiclePage> {
        let params = build_vehicle_query(filters, page);
        let (rows, total) = self.backend.query_vehicles(&params).await?;
        let vehicles = normalize_vehicles(&rows);
        info!(page = page, rows = vehicles.len(), total = ?total, "Fetched inventory page");
        Ok(VehiclePage {
            vehicles,
            total_count: total.unwrap_or(0),
        })
    }

    /// Distinct values for the filter UI. Empty object on failure.
    pub async fn get_filter_options(&self) -> Value {
        match self.backend.filter_options().await {
            Ok(Value::Null) => Value::Object(Default::default()),
            Ok(options) => options,
            Err(e) => {
                error!(error = %e, "Error fetching filter options");
                Value::Object(Default::default())
            }
        }
    }

    /// Look up one listing by slug and count the view.
    /// Missing slugs and lookup failures both yield None.
    pub async fn get_vehicle_by_slug(&self, slug: &str) -> Option<Vehicle> {
        if slug.is_empty() {
            return None;
        }
        let row = match self.backend.vehicle_by_slug(slug).await {
            Ok(row) => row?,
            Err(e) => {
                error!(slug = slug, error = %e, "Error fetching vehicle by slug");
                return None;
            }
        };
        let vehicle = Vehicle::from_row(&row)?;
        Some(self.record_view(vehicle).await)
    }

    async fn record_view(&self, vehicle: Vehicle) -> Vehicle {
        // Server-side counter; the caller does not wait for it.
        let backend = Arc::clone(&self.backend);
        let id = vehicle.id;
        let handle = tokio::spawn(async move {
            if let Err(e) = backend.increment_view_count(id).await {
                error!(vehicle_id = id, error = %e, "Error incrementing view count");
            }
        });
        let mut pending = self.pending.lock().await;
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
        drop(pending);

        self.views.record(vehicle)
    }

    /// Wait for outstanding view count updates. Short-lived processes call
    /// this before exiting.
    pub async fn flush_view_updates(&self) {
        let handles: Vec<_> = self.pending.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "View count task did not complete");
            }
        }
    }

    /// Slugs of every listed vehicle, newest first. Empty on failure.
    pub async fn get_all_vehicle_slugs(&self) -> Vec<String> {
        self.backend.vehicle_slugs().await.unwrap_or_else(|e| {
            error!(error = %e, "Error fetching vehicle slugs");
            Vec::new()
        })
    }

    /// Ids of the last vehicles viewed on this machine, most recent first.
    pub fn recently_viewed(&self) -> Vec<i64> {
        self.views.recently_viewed()
    }

    /// Drop cached pages from both tiers.
    pub async fn invalidate(&self) -> Result<usize> {
        self.memory.clear().await;
        self.disk.clear_pages()
    }
}
