//! Core data models used throughout gpu-scout.
//!
//! These types represent the offers, queries, and cycle reports that flow
//! through the collection, scoring, and sync pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The vendor tags this pipeline is authoritative for in the shared catalog.
///
/// The sync step only ever deletes rows whose `source` is in this set; rows
/// curated by anything else are left alone.
pub const MANAGED_SOURCES: &[&str] = &["vast", "tensordock", "runpod", "lambda"];

/// One rentable GPU configuration from one vendor at one point in time.
///
/// Field names mirror the hosted table columns. Units are canonical:
/// absolute FLOPS (an RTX 4090 is `82.6e12`), GB/s bandwidth, MB for
/// vram/ram, GB for disk, Mbps for network, USD/hour for all cost fields.
/// `total_flops` is the aggregate across `num_gpus`; `gpu_mem_bw_gbps` is
/// per GPU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuOffer {
    /// Stable identifier, unique within `source`. Vendor-assigned where the
    /// vendor has one, synthesized otherwise.
    pub id: String,
    pub source: String,
    pub location: String,
    /// Fraction in [0, 1].
    pub reliability: f64,
    /// Remaining rental duration, hours. 0 when the vendor does not expose it.
    #[serde(default)]
    pub duration_hours: f64,
    /// Free-text GPU model name as reported by the vendor.
    pub name: String,
    pub num_gpus: u32,
    pub vram_mb: u64,
    pub ram_mb: u64,
    pub disk_space_gb: f64,
    #[serde(default)]
    pub disk_bw_gbps: f64,
    #[serde(default)]
    pub disk_name: String,
    pub total_flops: f64,
    pub gpu_mem_bw_gbps: f64,
    pub cpu_cores: f64,
    #[serde(default)]
    pub cpu_ghz: f64,
    #[serde(default)]
    pub cpu_name: String,
    #[serde(default)]
    pub cpu_arch: String,
    #[serde(default)]
    pub upload_mbps: f64,
    #[serde(default)]
    pub download_mbps: f64,
    pub total_cost_ph: f64,
    #[serde(default)]
    pub gpu_cost_ph: f64,
    #[serde(default)]
    pub disk_cost_ph: f64,
    #[serde(default)]
    pub upload_cost_ph: f64,
    #[serde(default)]
    pub download_cost_ph: f64,
    /// Derived: `total_flops / total_cost_ph`, 0 when cost is 0. Recomputed
    /// every cycle, never trusted from the vendor.
    #[serde(default)]
    pub flops_per_dollar_ph: f64,
    /// Derived capability score in [0, 100]. Recomputed every cycle.
    #[serde(default)]
    pub score: f64,
    /// Derived: `score / total_cost_ph`, 0 when cost is 0.
    #[serde(default)]
    pub score_dollar_ph: f64,
    pub updated_at: DateTime<Utc>,
    /// Best-effort deep link back to the vendor's offer page.
    #[serde(default)]
    pub url: String,
}

impl Default for GpuOffer {
    fn default() -> Self {
        Self {
            id: String::new(),
            source: String::new(),
            location: String::new(),
            reliability: 0.0,
            duration_hours: 0.0,
            name: String::new(),
            num_gpus: 1,
            vram_mb: 0,
            ram_mb: 0,
            disk_space_gb: 0.0,
            disk_bw_gbps: 0.0,
            disk_name: String::new(),
            total_flops: 0.0,
            gpu_mem_bw_gbps: 0.0,
            cpu_cores: 0.0,
            cpu_ghz: 0.0,
            cpu_name: String::new(),
            cpu_arch: String::new(),
            upload_mbps: 0.0,
            download_mbps: 0.0,
            total_cost_ph: 0.0,
            gpu_cost_ph: 0.0,
            disk_cost_ph: 0.0,
            upload_cost_ph: 0.0,
            download_cost_ph: 0.0,
            flops_per_dollar_ph: 0.0,
            score: 0.0,
            score_dollar_ph: 0.0,
            updated_at: Utc::now(),
            url: String::new(),
        }
    }
}

/// Sort direction for catalog queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDir::Asc => "asc",
            SortDir::Desc => "desc",
        }
    }
}

/// Filter and sort parameters for the read side of the catalog.
///
/// Mirrors the query surface of the hosted REST API: exact source match,
/// case-insensitive location substring, price ceiling, flops-per-dollar
/// floor, sort key/direction, limit, offset.
#[derive(Debug, Clone)]
pub struct OfferQuery {
    pub source: Option<String>,
    pub location: Option<String>,
    pub max_price: Option<f64>,
    pub min_flops_per_dollar: Option<f64>,
    pub sort_key: String,
    pub sort_dir: SortDir,
    pub limit: i64,
    pub offset: i64,
}

impl Default for OfferQuery {
    fn default() -> Self {
        Self {
            source: None,
            location: None,
            max_price: None,
            min_flops_per_dollar: None,
            sort_key: "updated_at".to_string(),
            sort_dir: SortDir::Desc,
            limit: 200,
            offset: 0,
        }
    }
}

impl OfferQuery {
    /// Parse a `column.direction` sort spec (e.g. `"score.desc"`).
    /// A missing or unknown direction suffix means descending.
    pub fn with_sort(mut self, spec: &str) -> Self {
        match spec.rsplit_once('.') {
            Some((key, "asc")) => {
                self.sort_key = key.to_string();
                self.sort_dir = SortDir::Asc;
            }
            Some((key, "desc")) => {
                self.sort_key = key.to_string();
                self.sort_dir = SortDir::Desc;
            }
            _ => {
                self.sort_key = spec.to_string();
                self.sort_dir = SortDir::Desc;
            }
        }
        self
    }
}

/// Outcome of one source within a collection cycle.
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub source: String,
    pub status: SourceStatus,
}

/// Per-source status within a [`ScanReport`].
#[derive(Debug, Clone, PartialEq)]
pub enum SourceStatus {
    /// Collected and fully replaced in the store.
    Synced { offers: usize },
    /// Collected, but the sync step was skipped (dry run).
    Collected { offers: usize },
    /// Skipped because the collector had no credential.
    Unconfigured { credential: String },
    /// The collector failed; the source's previous rows were left untouched.
    CollectFailed { reason: String },
    /// The delete phase exhausted its retries; previous rows left intact.
    ReplaceAborted { reason: String },
    /// The insert phase exhausted its retries after a successful delete;
    /// the source is empty in the catalog until the next cycle.
    Degraded { reason: String },
}

/// Summary of one collection cycle, printed by `scout scan`.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub outcomes: Vec<SourceOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScanReport {
    /// Total offers written to the store this cycle.
    pub fn offers_synced(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o.status {
                SourceStatus::Synced { offers } => offers,
                _ => 0,
            })
            .sum()
    }

    /// True when every managed source either synced or was cleanly skipped
    /// for missing credentials.
    pub fn fully_completed(&self) -> bool {
        self.outcomes.iter().all(|o| {
            matches!(
                o.status,
                SourceStatus::Synced { .. }
                    | SourceStatus::Collected { .. }
                    | SourceStatus::Unconfigured { .. }
            )
        })
    }
}
