//! The collector contract and registry.
//!
//! A [`Collector`] owns one vendor's remote API: authentication, request
//! construction, response decoding, and the mapping of the vendor's wire
//! schema into [`GpuOffer`]. Collectors hold no shared mutable state, so the
//! sync step can run them concurrently and a failure in one never corrupts
//! another's output.
//!
//! Failures carry a small taxonomy ([`CollectError`]) so the aggregator can
//! tell "no credential, skip this source" apart from "the vendor broke".
//! Zero matching offers is not an error; collectors return `Ok(vec![])`.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;
use crate::models::GpuOffer;

/// Why a collector produced nothing this cycle.
#[derive(Debug, Error)]
pub enum CollectError {
    /// The vendor credential is absent from configuration. Not fatal to the
    /// cycle; the aggregator skips the source.
    #[error("missing credential: {credential}")]
    Unconfigured { credential: &'static str },

    /// Transport-level failure (connect, timeout, TLS). Transient.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The fetch exceeded the per-source deadline. Transient.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The vendor answered with a non-2xx status.
    #[error("vendor API returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl CollectError {
    /// True when the failure is a clean configuration skip rather than a
    /// vendor-side problem worth alerting on.
    pub fn is_unconfigured(&self) -> bool {
        matches!(self, CollectError::Unconfigured { .. })
    }
}

/// A vendor marketplace collector.
///
/// # Contract
///
/// * `fetch` is self-contained: it must not mutate anything outside its
///   return value.
/// * Offers come back in canonical units (absolute FLOPS, GB/s, MB, GB,
///   Mbps, USD/hour) with `source` set to [`source`](Collector::source) and
///   `id` unique within that source.
/// * Derived fields (`score`, `score_dollar_ph`, `flops_per_dollar_ph`) may
///   be left zeroed; the sync step recomputes them unconditionally.
#[async_trait]
pub trait Collector: Send + Sync {
    /// The managed source tag this collector produces (e.g. `"vast"`).
    fn source(&self) -> &'static str;

    /// One-line description for `scout sources` output.
    fn description(&self) -> &'static str;

    /// Fetch and normalize the vendor's current offers.
    async fn fetch(&self) -> Result<Vec<GpuOffer>, CollectError>;
}

/// All managed-source collectors for one run, built from configuration.
pub struct CollectorRegistry {
    collectors: Vec<Box<dyn Collector>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self {
            collectors: Vec::new(),
        }
    }

    /// Build the registry with every enabled built-in collector.
    pub fn from_config(config: &Config) -> Self {
        use crate::collector_lambda::LambdaCollector;
        use crate::collector_runpod::RunpodCollector;
        use crate::collector_tensordock::TensordockCollector;
        use crate::collector_vast::VastCollector;

        let mut registry = Self::new();
        if config.collectors.vast.enabled {
            registry.register(Box::new(VastCollector::new(config.scan.vast_limit)));
        }
        if config.collectors.tensordock.enabled {
            registry.register(Box::new(TensordockCollector::new(
                config.collectors.tensordock.api_key.clone(),
            )));
        }
        if config.collectors.runpod.enabled {
            registry.register(Box::new(RunpodCollector::new(
                config.collectors.runpod.api_key.clone(),
            )));
        }
        if config.collectors.lambda.enabled {
            registry.register(Box::new(LambdaCollector::new(
                config.collectors.lambda.api_key.clone(),
            )));
        }
        registry
    }

    pub fn register(&mut self, collector: Box<dyn Collector>) {
        self.collectors.push(collector);
    }

    /// Keep only the collector matching a `--source` filter.
    pub fn retain_source(&mut self, source: &str) {
        self.collectors.retain(|c| c.source() == source);
    }

    pub fn collectors(&self) -> &[Box<dyn Collector>] {
        &self.collectors
    }

    pub fn into_collectors(self) -> Vec<Box<dyn Collector>> {
        self.collectors
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }
}

impl Default for CollectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Check a vendor response status, draining the body into the error on
/// failure. Shared by all collectors.
pub(crate) async fn error_for_status(
    resp: reqwest::Response,
) -> Result<reqwest::Response, CollectError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(CollectError::Api {
        status,
        body: body.chars().take(500).collect(),
    })
}
