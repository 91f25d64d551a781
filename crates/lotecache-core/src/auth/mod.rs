//! API secret storage.
//!
//! Keys come from the environment when set, otherwise from the OS keychain
//! via `CredentialStore`.

pub mod credentials;

pub use credentials::{CredentialStore, Secret};
