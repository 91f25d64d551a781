use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{error, warn};

use super::CacheManager;
use crate::models::Vehicle;

/// How many vehicles the recently-viewed strip remembers.
pub const RECENTLY_VIEWED_LIMIT: usize = 10;

/// Local view history: a per-vehicle view counter and a most-recent-first
/// list of viewed ids. Storage failures are logged, never raised.
///
/// Clones share one lock, held across every read-modify-write of the files.
#[derive(Debug, Clone)]
pub struct ViewTracker {
    cache: CacheManager,
    lock: Arc<Mutex<()>>,
}

impl ViewTracker {
    pub fn new(cache: CacheManager) -> Self {
        Self {
            cache,
            lock: Arc::new(Mutex::new(())),
        }
    }

    fn exclusive(&self) -> MutexGuard<'_, ()> {
        // Poisoning carries no state; the guarded data lives on disk.
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn counts(&self) -> HashMap<i64, i64> {
        self.cache.load_view_counts().unwrap_or_else(|e| {
            warn!(error = %e, "Could not read local view counts");
            HashMap::new()
        })
    }

    /// Overlay local counts: the local count wins, then the row's own count.
    pub fn apply(&self, vehicles: Vec<Vehicle>) -> Vec<Vehicle> {
        let counts = self.counts();
        vehicles
            .into_iter()
            .map(|mut v| {
                if let Some(local) = counts.get(&v.id).copied().filter(|c| *c != 0) {
                    v.view_count = local;
                }
                v
            })
            .collect()
    }

    /// Count one more view of `vehicle` and remember it as the most recent.
    /// Returns the vehicle carrying its new count.
    pub fn record(&self, mut vehicle: Vehicle) -> Vehicle {
        let _guard = self.exclusive();
        let mut counts = self.counts();
        let current = counts
            .get(&vehicle.id)
            .copied()
            .filter(|c| *c != 0)
            .unwrap_or(vehicle.view_count);
        let next = current + 1;
        counts.insert(vehicle.id, next);
        if let Err(e) = self.cache.save_view_counts(&counts) {
            error!(error = %e, "Failed to save view counts");
        }

        self.push_recent(vehicle.id);
        vehicle.view_count = next;
        vehicle
    }

    pub fn recently_viewed(&self) -> Vec<i64> {
        self.cache.load_recently_viewed().unwrap_or_else(|e| {
            warn!(error = %e, "Could not read recently viewed list");
            Vec::new()
        })
    }

    fn push_recent(&self, vehicle_id: i64) {
        let mut recent = self.recently_viewed();
        recent.retain(|id| *id != vehicle_id);
        recent.insert(0, vehicle_id);
        recent.truncate(RECENTLY_VIEWED_LIMIT);
        if let Err(e) = self.cache.save_recently_viewed(&recent) {
            error!(error = %e, "Failed to update recently viewed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn vehicle(id: i64, views: i64) -> Vehicle {
        Vehicle::from_row(&json!({"id": id, "viewcount": views})).expect("vehicle fixture")
    }

    #[test]
    fn test_record_increments_from_row_count() {
        let dir = tempdir().expect("tempdir");
        let tracker = ViewTracker::new(CacheManager::new(dir.path().to_path_buf()).expect("cache"));

        let viewed = tracker.record(vehicle(10, 4));
        assert_eq!(viewed.view_count, 5);
        let viewed = tracker.record(vehicle(10, 4));
        assert_eq!(viewed.view_count, 6);
        assert_eq!(tracker.counts().get(&10), Some(&6));
    }

    #[test]
    fn test_apply_prefers_local_counts() {
        let dir = tempdir().expect("tempdir");
        let tracker = ViewTracker::new(CacheManager::new(dir.path().to_path_buf()).expect("cache"));
        tracker.record(vehicle(1, 0));

        let applied = tracker.apply(vec![vehicle(1, 30), vehicle(2, 8)]);
        assert_eq!(applied[0].view_count, 1);
        assert_eq!(applied[1].view_count, 8);
    }

    #[test]
    fn test_concurrent_records_lose_no_views() {
        let dir = tempdir().expect("tempdir");
        let tracker = ViewTracker::new(CacheManager::new(dir.path().to_path_buf()).expect("cache"));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        tracker.record(vehicle(7, 0));
                        tracker.record(vehicle(100 + t, 0));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread");
        }

        let counts = tracker.counts();
        assert_eq!(counts.get(&7), Some(&200));
        for t in 0..8 {
            assert_eq!(counts.get(&(100 + t)), Some(&25));
        }
        let recent = tracker.recently_viewed();
        assert_eq!(recent.len(), 9);
        assert!(recent.contains(&7));
    }

    #[test]
    fn test_recently_viewed_is_deduplicated_and_capped() {
        let dir = tempdir().expect("tempdir");
        let tracker = ViewTracker::new(CacheManager::new(dir.path().to_path_buf()).expect("cache"));

        for id in 1..=12 {
            tracker.record(vehicle(id, 0));
        }
        tracker.record(vehicle(5, 0));

        let recent = tracker.recently_viewed();
        assert_eq!(recent.len(), RECENTLY_VIEWED_LIMIT);
        assert_eq!(recent[0], 5);
        assert_eq!(recent[1], 12);
        assert_eq!(recent.iter().filter(|id| **id == 5).count(), 1);
        assert!(!recent.contains(&1));
    }
}
