//! Core library for lotecache.
//!
//! Mirrors a dealership's Airtable inventory into Supabase and serves the
//! listings back to the storefront through a cached, normalized view.
//!
//! - `api`: Airtable and Supabase REST clients and the traits over them
//! - `models`: vehicles, filters, source records and written rows
//! - `query`: filter to PostgREST query translation
//! - `cache`: memory and disk tiers, local view history
//! - `service`: `VehicleService`, `FavoritesService`
//! - `sync`: data sync, image mirror, scheduler
//! - `config`, `auth`: settings and API secrets

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod query;
pub mod service;
pub mod sync;
pub mod utils;

pub use api::{AirtableClient, ApiError, SupabaseClient};
pub use config::Config;
pub use models::{Vehicle, VehicleFilters, VehiclePage};
pub use service::{FavoritesError, FavoritesService, VehicleService};
