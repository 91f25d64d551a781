//! Data models for the dealership inventory.
//!
//! - `Vehicle`, `VehiclePage`: normalized listings served to the storefront
//! - `VehicleFilters`: search filters and their editing operations
//! - `AirtableRecord`, `RecordPage`: rows of the source spreadsheet
//! - `InventoryRow`, `ImageSyncUpdate`: rows written to the cache table
//! - `StorageObject`, `ImageField`: storage bucket listing and photo columns

pub mod airtable;
pub mod filters;
pub mod inventory;
pub mod storage;
pub mod vehicle;

pub use airtable::{AirtableRecord, RecordPage};
pub use filters::{FilterKey, VehicleFilters};
pub use inventory::{ImageSyncUpdate, InventoryRow};
pub use storage::{ImageField, StorageObject};
pub use vehicle::{branch_code, branch_name, normalize_vehicles, Vehicle, VehiclePage};
