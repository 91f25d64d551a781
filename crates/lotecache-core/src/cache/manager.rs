use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::models::VehiclePage;

/// Listing pages are served from cache for 5 minutes.
pub const DEFAULT_TTL_SECS: i64 = 5 * 60;

const VIEW_COUNTS_FILE: &str = "vehicle_views";
const RECENTLY_VIEWED_FILE: &str = "recently_viewed";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.cached_at
    }

    pub fn age_minutes(&self) -> i64 {
        self.age().num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }

    /// Younger than `ttl`. Entries stamped in the future count as fresh.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CachedData<U> {
        CachedData {
            data: f(self.data),
            cached_at: self.cached_at,
        }
    }
}

/// FNV-1a, used to turn arbitrary cache keys into stable file names.
fn stable_hash(key: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in key.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// JSON-file cache under a per-user cache directory. Holds listing pages
/// and the local view history.
#[derive(Debug, Clone)]
pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }

    fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", name))
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<CachedData<T>>> {
        let path = self.cache_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", name))?;

        let cached: CachedData<T> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", name))?;

        Ok(Some(cached))
    }

    /// Write via a temp file in the cache dir and rename over the target,
    /// so readers see either the old file or the new one.
    fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let cached = CachedData::new(data);
        let contents = serde_json::to_vec(&cached)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.cache_dir)
            .with_context(|| format!("Failed to create temp file for cache file: {}", name))?;
        tmp.write_all(&contents)
            .with_context(|| format!("Failed to write cache file: {}", name))?;
        tmp.persist(self.cache_path(name))
            .with_context(|| format!("Failed to replace cache file: {}", name))?;
        Ok(())
    }

    fn page_file(key: &str) -> String {
        format!("page_{:016x}", stable_hash(key))
    }

    /// Location of the file holding the page cached under `key`.
    pub fn page_path(&self, key: &str) -> PathBuf {
        self.cache_path(&Self::page_file(key))
    }

    // ===== Listing pages =====

    /// Load a cached page. The full key is stored with the page, so a hash
    /// collision reads as a miss.
    pub fn load_page(&self, key: &str) -> Result<Option<CachedData<VehiclePage>>> {
        let cached: Option<CachedData<(String, VehiclePage)>> = self.load(&Self::page_file(key))?;
        Ok(cached.and_then(|c| {
            if c.data.0 == key {
                Some(c.map(|(_, page)| page))
            } else {
                debug!(key = key, "Cache file belongs to another key");
                None
            }
        }))
    }

    pub fn save_page(&self, key: &str, page: &VehiclePage) -> Result<()> {
        self.save(&Self::page_file(key), &(key, page))
    }

    // ===== View history =====

    pub fn load_view_counts(&self) -> Result<HashMap<i64, i64>> {
        Ok(self
            .load::<HashMap<i64, i64>>(VIEW_COUNTS_FILE)?
            .map(|c| c.data)
            .unwrap_or_default())
    }

    pub fn save_view_counts(&self, counts: &HashMap<i64, i64>) -> Result<()> {
        self.save(VIEW_COUNTS_FILE, counts)
    }

    pub fn load_recently_viewed(&self) -> Result<Vec<i64>> {
        Ok(self
            .load::<Vec<i64>>(RECENTLY_VIEWED_FILE)?
            .map(|c| c.data)
            .unwrap_or_default())
    }

    pub fn save_recently_viewed(&self, ids: &[i64]) -> Result<()> {
        self.save(RECENTLY_VIEWED_FILE, &ids)
    }

    /// Delete every cached listing page. View history is kept.
    pub fn clear_pages(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            let is_page = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("page_") && n.ends_with(".json"))
                .unwrap_or(false);
            if is_page {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

// ============================================================================
// Tests
// ============================================================================
