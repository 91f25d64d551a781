use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::api::FavoritesBackend;

#[derive(Debug, Error)]
pub enum FavoritesError {
    #[error("Sign in to save favorites")]
    NotSignedIn,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// A signed-in user's saved vehicles, updated optimistically.
pub struct FavoritesService {
    backend: Arc<dyn FavoritesBackend>,
    favorites: RwLock<BTreeSet<i64>>,
}

impl FavoritesService {
    pub fn new(backend: Arc<dyn FavoritesBackend>) -> Self {
        Self {
            backend,
            favorites: RwLock::new(BTreeSet::new()),
        }
    }

    /// Replace the local set with the user's saved ids. No user clears it.
    pub async fn load(&self, user_id: Option<&str>) -> Result<Vec<i64>, FavoritesError> {
        let ids = match user_id {
            Some(user) => self.backend.favorite_ids(user).await?,
            None => Vec::new(),
        };
        let mut favorites = self.favorites.write().await;
        *favorites = ids.into_iter().collect();
        Ok(favorites.iter().copied().collect())
    }

    pub async fn is_favorite(&self, vehicle_id: i64) -> bool {
        self.favorites.read().await.contains(&vehicle_id)
    }

    pub async fn ids(&self) -> Vec<i64> {
        self.favorites.read().await.iter().copied().collect()
    }

    /// Flip `vehicle_id` and persist it. Returns whether it is now a
    /// favorite. The local flip is undone if the backend rejects it.
    pub async fn toggle(&self, user_id: Option<&str>, vehicle_id: i64) -> Result<bool, FavoritesError> {
        let user = user_id.ok_or(FavoritesError::NotSignedIn)?;

        let now_favorite = {
            let mut favorites = self.favorites.write().await;
            if favorites.remove(&vehicle_id) {
                false
            } else {
                favorites.insert(vehicle_id);
                true
            }
        };

        let result = if now_favorite {
            self.backend.add_favorite(user, vehicle_id).await
        } else {
            self.backend.remove_favorite(user, vehicle_id).await
        };

        match result {
            Ok(()) => {
                debug!(vehicle_id = vehicle_id, favorite = now_favorite, "Favorite updated");
                Ok(now_favorite)
            }
            Err(e) => {
                error!(vehicle_id = vehicle_id, error = %e, "Error toggling favorite");
                let mut favorites = self.favorites.write().await;
                if now_favorite {
                    favorites.remove(&vehicle_id);
                } else {
                    favorites.insert(vehicle_id);
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    #[derive(Default)]
    struct FakeFavorites {
        rows: Mutex<Vec<(String, i64)>>,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl FavoritesBackend for FakeFavorites {
        async fn favorite_ids(&self, user_id: &str) -> Result<Vec<i64>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().filter(|(u, _)| u == user_id).map(|(_, id)| *id).collect())
        }

        async fn add_favorite(&self, user_id: &str, vehicle_id: i64) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(anyhow!("insert rejected"));
            }
            self.rows.lock().unwrap().push((user_id.to_string(), vehicle_id));
            Ok(())
        }

        async fn remove_favorite(&self, user_id: &str, vehicle_id: i64) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(anyhow!("delete rejected"));
            }
            self.rows
                .lock()
                .unwrap()
                .retain(|(u, id)| !(u == user_id && *id == vehicle_id));
            Ok(())
        }
    }

    fn service_with(rows: Vec<(&str, i64)>) -> (FavoritesService, Arc<FakeFavorites>) {
        let backend = Arc::new(FakeFavorites::default());
        *backend.rows.lock().unwrap() = rows.into_iter().map(|(u, id)| (u.to_string(), id)).collect();
        (FavoritesService::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn test_load_only_reads_own_rows() {
        let (service, _) = service_with(vec![("ana", 3), ("ana", 1), ("luis", 9)]);
        assert_eq!(service.load(Some("ana")).await.expect("load"), vec![1, 3]);
        assert!(service.is_favorite(3).await);
        assert!(!service.is_favorite(9).await);

        assert!(service.load(None).await.expect("load").is_empty());
        assert!(!service.is_favorite(3).await);
    }

    #[tokio::test]
    async fn test_toggle_adds_then_removes() {
        let (service, backend) = service_with(vec![]);
        assert!(service.toggle(Some("ana"), 7).await.expect("add"));
        assert_eq!(backend.favorite_ids("ana").await.expect("ids"), vec![7]);

        assert!(!service.toggle(Some("ana"), 7).await.expect("remove"));
        assert!(backend.favorite_ids("ana").await.expect("ids").is_empty());
        assert!(!service.is_favorite(7).await);
    }

    #[tokio::test]
    async fn test_toggle_requires_user() {
        let (service, _) = service_with(vec![]);
        let err = service.toggle(None, 7).await.expect_err("no user");
        assert!(matches!(err, FavoritesError::NotSignedIn));
        assert!(!service.is_favorite(7).await);
    }

    #[tokio::test]
    async fn test_toggle_reverts_on_backend_error() {
        let (service, backend) = service_with(vec![("ana", 4)]);
        service.load(Some("ana")).await.expect("load");
        backend.fail_writes.store(true, Ordering::SeqCst);

        let err = service.toggle(Some("ana"), 4).await.expect_err("delete fails");
        assert!(err.to_string().contains("delete rejected"));
        assert!(service.is_favorite(4).await);

        service.toggle(Some("ana"), 5).await.expect_err("insert fails");
        assert_eq!(service.ids().await, vec![4]);
    }
}
