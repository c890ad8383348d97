//! TOML configuration parsing.
//!
//! All credentials and endpoints live in one explicit [`Config`] object that
//! is passed into collectors and the store, never read ad hoc at call sites.
//! Keys absent from the file fall back to the conventional environment
//! variables (`SUPABASE_SERVICE_KEY`, `TENSORDOCK_TOKEN`, `RUNPOD_API_KEY`,
//! `LAMBDA_TOKEN`) at load time, which keeps secrets out of checked-in
//! config files while still letting tests inject fake credentials directly.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub collectors: CollectorsConfig,
}

/// The hosted catalog store (a PostgREST-style HTTP data API).
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Base URL, e.g. `https://project.supabase.co`.
    #[serde(default)]
    pub url: String,
    /// Write credential. Env fallback: `SUPABASE_SERVICE_KEY`.
    #[serde(default)]
    pub service_key: Option<String>,
    /// Read credential. Env fallback: `SUPABASE_ANON_KEY`.
    #[serde(default)]
    pub anon_key: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

impl StoreConfig {
    /// Credential for the replace-sync write path.
    pub fn write_key(&self) -> Option<&str> {
        self.service_key.as_deref()
    }

    /// Credential for the read path; falls back to the service key when no
    /// separate anon key exists.
    pub fn read_key(&self) -> Option<&str> {
        self.anon_key.as_deref().or(self.service_key.as_deref())
    }
}

fn default_table() -> String {
    "gpus".to_string()
}
fn default_store_timeout() -> u64 {
    10
}

/// Collection cycle budgets.
#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// Per-collector timeout. Vendor APIs here need 10-30s.
    #[serde(default = "default_scan_timeout")]
    pub timeout_secs: u64,
    /// Bounded retry budget for each store phase (delete, insert).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Page size for the Vast search endpoint.
    #[serde(default = "default_vast_limit")]
    pub vast_limit: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_scan_timeout(),
            max_retries: default_max_retries(),
            vast_limit: default_vast_limit(),
        }
    }
}

fn default_scan_timeout() -> u64 {
    25
}
fn default_max_retries() -> u32 {
    3
}
fn default_vast_limit() -> usize {
    4096
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7332".to_string()
}

/// Per-vendor collector settings.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CollectorsConfig {
    #[serde(default)]
    pub vast: VendorConfig,
    #[serde(default)]
    pub tensordock: VendorConfig,
    #[serde(default)]
    pub runpod: VendorConfig,
    #[serde(default)]
    pub lambda: VendorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VendorConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    apply_env_fallbacks(&mut config);

    if config.store.url.is_empty() {
        anyhow::bail!("store.url must be set (or SUPABASE_URL exported)");
    }
    if config.scan.timeout_secs == 0 {
        anyhow::bail!("scan.timeout_secs must be > 0");
    }
    if config.scan.vast_limit == 0 {
        anyhow::bail!("scan.vast_limit must be > 0");
    }

    Ok(config)
}

fn apply_env_fallbacks(config: &mut Config) {
    if config.store.url.is_empty() {
        if let Some(url) = env_nonempty("SUPABASE_URL") {
            config.store.url = url;
        }
    }
    fallback(&mut config.store.service_key, "SUPABASE_SERVICE_KEY");
    fallback(&mut config.store.anon_key, "SUPABASE_ANON_KEY");
    fallback(&mut config.collectors.tensordock.api_key, "TENSORDOCK_TOKEN");
    fallback(&mut config.collectors.runpod.api_key, "RUNPOD_API_KEY");
    fallback(&mut config.collectors.lambda.api_key, "LAMBDA_TOKEN");
}

/// Fill a credential slot from the environment. A blank value in the file
/// counts as unset, so template placeholders don't mask exported keys.
fn fallback(slot: &mut Option<String>, var: &str) {
    let blank = slot.as_deref().map(|v| v.trim().is_empty()).unwrap_or(true);
    if blank {
        *slot = env_nonempty(var);
    }
}

fn env_nonempty(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
