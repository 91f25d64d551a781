//! Application configuration.
//!
//! Non-secret settings live in `~/.config/lotecache/config.json`; every field
//! has a default and can be overridden from the environment (a `.env` file is
//! loaded by the CLI). API keys are not stored here, see [`crate::auth`].

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::DEFAULT_TTL_SECS;
use crate::query::LISTED_STATUS;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "lotecache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub airtable_base_id: Option<String>,
    pub airtable_table_id: Option<String>,
    pub supabase_url: Option<String>,
    pub inventory_table: String,
    pub favorites_table: String,
    pub bucket: String,
    /// Airtable `OrdenStatus` value that marks a vehicle as listed.
    pub listed_status: String,
    pub cache_ttl_secs: i64,
    /// Pause between Airtable pages during the data sync.
    pub page_delay_ms: u64,
    pub image_sync_minutes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            airtable_base_id: None,
            airtable_table_id: None,
            supabase_url: None,
            inventory_table: "inventario_cache".to_string(),
            favorites_table: "user_favorites".to_string(),
            bucket: "fotos_airtable".to_string(),
            listed_status: LISTED_STATUS.to_string(),
            cache_ttl_secs: DEFAULT_TTL_SECS,
            page_delay_ms: 250,
            image_sync_minutes: 30,
        }
    }
}

fn parse_or_keep<T: std::str::FromStr + Copy>(name: &str, raw: &str, current: T) -> T {
    raw.trim().parse().unwrap_or_else(|_| {
        warn!(var = name, value = raw, "Ignoring unparseable setting");
        current
    })
}

impl Config {
    /// Load the config file (defaults when missing), then apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Override fields from variables returned by `var`. Blank values are
    /// ignored.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("AIRTABLE_BASE_ID") {
            self.airtable_base_id = Some(v);
        }
        if let Some(v) = get("AIRTABLE_TABLE_ID") {
            self.airtable_table_id = Some(v);
        }
        if let Some(v) = get("SUPABASE_URL") {
            self.supabase_url = Some(v);
        }
        if let Some(v) = get("SUPABASE_INVENTORY_TABLE") {
            self.inventory_table = v;
        }
        if let Some(v) = get("SUPABASE_BUCKET") {
            self.bucket = v;
        }
        if let Some(v) = get("LOTECACHE_CACHE_TTL_SECS") {
            self.cache_ttl_secs = parse_or_keep("LOTECACHE_CACHE_TTL_SECS", &v, self.cache_ttl_secs);
        }
        if let Some(v) = get("LOTECACHE_PAGE_DELAY_MS") {
            self.page_delay_ms = parse_or_keep("LOTECACHE_PAGE_DELAY_MS", &v, self.page_delay_ms);
        }
        if let Some(v) = get("LOTECACHE_SYNC_EVERY_MINUTES") {
            self.image_sync_minutes =
                parse_or_keep("LOTECACHE_SYNC_EVERY_MINUTES", &v, self.image_sync_minutes);
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::seconds(self.cache_ttl_secs.max(0))
    }

    pub fn require_supabase_url(&self) -> Result<&str> {
        required(&self.supabase_url, "SUPABASE_URL")
    }

    pub fn require_airtable_base(&self) -> Result<&str> {
        required(&self.airtable_base_id, "AIRTABLE_BASE_ID")
    }

    pub fn require_airtable_table(&self) -> Result<&str> {
        required(&self.airtable_table_id, "AIRTABLE_TABLE_ID")
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| anyhow!("{} is not configured (set it in the environment or config.json)", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.inventory_table, "inventario_cache");
        assert_eq!(config.bucket, "fotos_airtable");
        assert_eq!(config.listed_status, "Comprado");
        assert_eq!(config.cache_ttl(), Duration::minutes(5));
        assert!(config.require_supabase_url().is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{"bucket": "fotos_qa", "page_delay_ms": 0}"#)
            .expect("parse");
        assert_eq!(config.bucket, "fotos_qa");
        assert_eq!(config.page_delay_ms, 0);
        assert_eq!(config.favorites_table, "user_favorites");
        assert_eq!(config.image_sync_minutes, 30);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("SUPABASE_URL", "https://proj.supabase.co"),
            ("AIRTABLE_BASE_ID", "appXYZ"),
            ("AIRTABLE_TABLE_ID", " "),
            ("LOTECACHE_CACHE_TTL_SECS", "60"),
            ("LOTECACHE_PAGE_DELAY_MS", "soon"),
        ]));

        assert_eq!(config.require_supabase_url().expect("url"), "https://proj.supabase.co");
        assert_eq!(config.require_airtable_base().expect("base"), "appXYZ");
        assert!(config.require_airtable_table().is_err());
        assert_eq!(config.cache_ttl_secs, 60);
        assert_eq!(config.page_delay_ms, 250);
    }
}
