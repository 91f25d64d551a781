//! REST clients for the external services.
//!
//! - `AirtableClient`: paged reads of the source inventory table
//! - `SupabaseClient`: PostgREST tables, RPC and bucket storage
//!
//! The traits in `backend` are the seams the services and sync jobs use.

pub mod airtable;
pub mod backend;
pub mod error;
pub mod http;
pub mod supabase;

pub use airtable::AirtableClient;
pub use backend::{
    FavoritesBackend, FetchedImage, HttpImageFetcher, ImageFetcher, InventoryBackend, ObjectStore,
    RecordSource, SupabaseFavorites, SupabaseInventory, TableWriter,
};
pub use error::ApiError;
pub use supabase::SupabaseClient;
