//! Read-through caching for inventory listings.
//!
//! Two tiers sit in front of the database: an in-process `MemoryCache` and
//! the on-disk `CacheManager`. Pages are fresh for 5 minutes; stale pages
//! are still served when the database cannot be reached.
//!
//! The disk tier also keeps the local view history (`ViewTracker`).

pub mod manager;
pub mod memory;
pub mod views;

pub use manager::{CacheManager, CachedData, DEFAULT_TTL_SECS};
pub use memory::MemoryCache;
pub use views::ViewTracker;
