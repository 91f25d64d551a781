use std::collections::HashMap;

use tokio::sync::RwLock;

use super::CachedData;
use crate::models::VehiclePage;

/// Process-local tier in front of the disk cache. Entries are never
/// evicted; staleness is decided by the reader.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CachedData<VehiclePage>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<CachedData<VehiclePage>> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn insert(&self, key: String, entry: CachedData<VehiclePage>) {
        self.entries.write().await.insert(key, entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_get() {
        let cache = MemoryCache::new();
        assert!(cache.get("k").await.is_none());

        let page = VehiclePage {
            vehicles: Vec::new(),
            total_count: 9,
        };
        cache.insert("k".to_string(), CachedData::new(page)).await;
        assert_eq!(cache.get("k").await.map(|c| c.data.total_count), Some(9));
        assert_eq!(cache.len().await, 1);

        cache.clear().await;
        assert_eq!(cache.len().await, 0);
    }
}
