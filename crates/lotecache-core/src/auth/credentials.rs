use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use keyring::Entry;
use tracing::debug;

const SERVICE_NAME: &str = "lotecache";

/// API secrets the jobs need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Secret {
    AirtableApiKey,
    SupabaseServiceKey,
}

impl Secret {
    /// Environment variable that takes precedence over the keychain.
    pub fn env_var(&self) -> &'static str {
        match self {
            Secret::AirtableApiKey => "AIRTABLE_API_KEY",
            Secret::SupabaseServiceKey => "SUPABASE_SERVICE_KEY",
        }
    }

    fn account(&self) -> &'static str {
        match self {
            Secret::AirtableApiKey => "airtable",
            Secret::SupabaseServiceKey => "supabase",
        }
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.account())
    }
}

impl FromStr for Secret {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "airtable" => Ok(Secret::AirtableApiKey),
            "supabase" => Ok(Secret::SupabaseServiceKey),
            other => bail!("Unknown service '{}' (expected airtable or supabase)", other),
        }
    }
}

pub struct CredentialStore;

impl CredentialStore {
    /// Store a secret in the OS keychain
    pub fn store(secret: Secret, value: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, secret.account())
            .context("Failed to create keyring entry")?;
        entry
            .set_password(value)
            .context("Failed to store secret in keychain")?;
        Ok(())
    }

    pub fn get(secret: Secret) -> Result<String> {
        let entry = Entry::new(SERVICE_NAME, secret.account())
            .context("Failed to create keyring entry")?;
        entry
            .get_password()
            .context("Failed to retrieve secret from keychain")
    }

    pub fn delete(secret: Secret) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, secret.account())
            .context("Failed to create keyring entry")?;
        entry
            .delete_credential()
            .context("Failed to delete secret from keychain")?;
        Ok(())
    }

    /// Environment first, then the keychain.
    pub fn resolve(secret: Secret) -> Result<String> {
        Self::resolve_with(secret, |name| std::env::var(name).ok())
    }

    fn resolve_with(secret: Secret, var: impl Fn(&str) -> Option<String>) -> Result<String> {
        if let Some(value) = var(secret.env_var()).filter(|v| !v.trim().is_empty()) {
            return Ok(value.trim().to_string());
        }
        debug!(secret = %secret, "Not set in environment, checking keychain");
        Self::get(secret).map_err(|e| {
            anyhow!(
                "{} is not set and no {} key is stored ({}). Run `lotecache auth store {}`.",
                secret.env_var(),
                secret,
                e,
                secret
            )
        })
    }
}
