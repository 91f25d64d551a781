//! Storefront-facing services over the inventory and favorites tables.

pub mod favorites;
pub mod vehicles;

pub use favorites::{FavoritesError, FavoritesService};
pub use vehicles::VehicleService;
