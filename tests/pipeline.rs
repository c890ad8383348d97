//! End-to-end cycle tests over stub collectors and in-process stores.
//!
//! These exercise the source-isolation guarantees of the sync step: one
//! vendor's failure never disturbs another vendor's rows, and store
//! outages are retried, then surfaced without panicking.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use gpu_scout::collector::{CollectError, Collector};
use gpu_scout::config::ScanConfig;
use gpu_scout::models::{GpuOffer, OfferQuery, SourceStatus};
use gpu_scout::store::{CatalogStore, MemoryStore, StoreError};
use gpu_scout::sync::{run_scan, ScanOptions};

struct StubCollector {
    source: &'static str,
    offers: Option<Vec<GpuOffer>>,
    error: Option<&'static str>,
    unconfigured: Option<&'static str>,
}

impl StubCollector {
    fn ok(source: &'static str, offers: Vec<GpuOffer>) -> Box<dyn Collector> {
        Box::new(Self {
            source,
            offers: Some(offers),
            error: None,
            unconfigured: None,
        })
    }

    fn failing(source: &'static str, reason: &'static str) -> Box<dyn Collector> {
        Box::new(Self {
            source,
            offers: None,
            error: Some(reason),
            unconfigured: None,
        })
    }

    fn unconfigured(source: &'static str, credential: &'static str) -> Box<dyn Collector> {
        Box::new(Self {
            source,
            offers: None,
            error: None,
            unconfigured: Some(credential),
        })
    }
}

#[async_trait]
impl Collector for StubCollector {
    fn source(&self) -> &'static str {
        self.source
    }
    fn description(&self) -> &'static str {
        "stub"
    }
    async fn fetch(&self) -> Result<Vec<GpuOffer>, CollectError> {
        if let Some(credential) = self.unconfigured {
            return Err(CollectError::Unconfigured { credential });
        }
        if let Some(reason) = self.error {
            return Err(CollectError::Decode(reason.to_string()));
        }
        Ok(self.offers.clone().unwrap_or_default())
    }
}

/// Store wrapper that fails a set number of times per phase before
/// delegating to the in-memory store.
struct FlakyStore {
    inner: MemoryStore,
    delete_failures: AtomicU32,
    insert_failures: AtomicU32,
}

impl FlakyStore {
    fn new(inner: MemoryStore, delete_failures: u32, insert_failures: u32) -> Self {
        Self {
            inner,
            delete_failures: AtomicU32::new(delete_failures),
            insert_failures: AtomicU32::new(insert_failures),
        }
    }

    fn outage() -> StoreError {
        StoreError::Api {
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            body: "catalog down".to_string(),
        }
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl CatalogStore for FlakyStore {
    async fn delete_source(&self, source: &str) -> Result<(), StoreError> {
        if Self::take_failure(&self.delete_failures) {
            return Err(Self::outage());
        }
        self.inner.delete_source(source).await
    }

    async fn insert_offers(&self, offers: &[GpuOffer]) -> Result<(), StoreError> {
        if Self::take_failure(&self.insert_failures) {
            return Err(Self::outage());
        }
        self.inner.insert_offers(offers).await
    }

    async fn fetch_offers(&self, query: &OfferQuery) -> Result<Vec<GpuOffer>, StoreError> {
        self.inner.fetch_offers(query).await
    }
}

fn offer(id: &str, source: &str, flops: f64, cost: f64) -> GpuOffer {
    GpuOffer {
        id: id.to_string(),
        source: source.to_string(),
        total_flops: flops,
        gpu_mem_bw_gbps: 1000.0,
        total_cost_ph: cost,
        ..GpuOffer::default()
    }
}

fn scan_config() -> ScanConfig {
    ScanConfig {
        timeout_secs: 5,
        max_retries: 3,
        vast_limit: 64,
    }
}

fn status_for<'a>(
    report: &'a gpu_scout::models::ScanReport,
    source: &str,
) -> &'a SourceStatus {
    &report
        .outcomes
        .iter()
        .find(|o| o.source == source)
        .unwrap_or_else(|| panic!("no outcome for {source}"))
        .status
}

#[tokio::test]
async fn mixed_cycle_isolates_failures_per_source() {
    let store = Arc::new(MemoryStore::with_rows(vec![
        offer("vast-old", "vast", 1e12, 0.5),
        offer("rp-old", "runpod", 1e12, 0.5),
        offer("manual-1", "spot-deals", 1e12, 0.5),
    ]));

    let collectors = vec![
        StubCollector::ok("vast", vec![offer("vast-new", "vast", 82.6e12, 0.74)]),
        StubCollector::failing("runpod", "schema drift"),
        StubCollector::unconfigured("tensordock", "TENSORDOCK_TOKEN"),
        StubCollector::ok("lambda", vec![offer("ll-new", "lambda", 156e12, 10.32)]),
    ];

    let report = run_scan(
        &scan_config(),
        collectors,
        store.clone(),
        &ScanOptions::default(),
    )
    .await;

    assert_eq!(*status_for(&report, "vast"), SourceStatus::Synced { offers: 1 });
    assert!(matches!(
        status_for(&report, "runpod"),
        SourceStatus::CollectFailed { .. }
    ));
    assert!(matches!(
        status_for(&report, "tensordock"),
        SourceStatus::Unconfigured { .. }
    ));
    assert_eq!(*status_for(&report, "lambda"), SourceStatus::Synced { offers: 1 });
    assert!(!report.fully_completed());
    assert_eq!(report.offers_synced(), 2);

    let rows = store.all_rows();
    // vast replaced, runpod retained, lambda inserted, and the row from an
    // unmanaged source is untouched.
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().any(|o| o.id == "vast-new"));
    assert!(!rows.iter().any(|o| o.id == "vast-old"));
    assert!(rows.iter().any(|o| o.id == "rp-old" && o.source == "runpod"));
    assert!(rows.iter().any(|o| o.id == "ll-new"));
    assert!(rows.iter().any(|o| o.id == "manual-1" && o.source == "spot-deals"));
}

#[tokio::test]
async fn transient_store_outage_is_retried() {
    // Two delete failures, then success; within the retry budget of 3.
    let store = Arc::new(FlakyStore::new(
        MemoryStore::with_rows(vec![offer("stale", "vast", 1e12, 0.5)]),
        2,
        0,
    ));
    let collectors = vec![StubCollector::ok("vast", vec![offer("fresh", "vast", 82.6e12, 0.74)])];

    let report = run_scan(
        &scan_config(),
        collectors,
        store.clone(),
        &ScanOptions::default(),
    )
    .await;

    assert_eq!(*status_for(&report, "vast"), SourceStatus::Synced { offers: 1 });
    let rows = store.inner.all_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "fresh");
}

#[tokio::test]
async fn delete_exhaustion_aborts_and_keeps_previous_rows() {
    let store = Arc::new(FlakyStore::new(
        MemoryStore::with_rows(vec![offer("stale", "vast", 1e12, 0.5)]),
        u32::MAX,
        0,
    ));
    let collectors = vec![StubCollector::ok("vast", vec![offer("fresh", "vast", 82.6e12, 0.74)])];

    let report = run_scan(
        &scan_config(),
        collectors,
        store.clone(),
        &ScanOptions::default(),
    )
    .await;

    assert!(matches!(
        status_for(&report, "vast"),
        SourceStatus::ReplaceAborted { .. }
    ));
    assert!(!report.fully_completed());
    let rows = store.inner.all_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "stale");
}

#[tokio::test]
async fn insert_exhaustion_degrades_without_panicking() {
    let store = Arc::new(FlakyStore::new(
        MemoryStore::with_rows(vec![offer("stale", "vast", 1e12, 0.5)]),
        0,
        u32::MAX,
    ));
    let collectors = vec![StubCollector::ok("vast", vec![offer("fresh", "vast", 82.6e12, 0.74)])];

    let report = run_scan(
        &scan_config(),
        collectors,
        store.clone(),
        &ScanOptions::default(),
    )
    .await;

    assert!(matches!(
        status_for(&report, "vast"),
        SourceStatus::Degraded { .. }
    ));
    assert!(!report.fully_completed());
    // The delete went through before the inserts started failing, so the
    // source is empty until the next cycle.
    assert!(store.inner.all_rows().is_empty());
}

#[tokio::test]
async fn synced_offers_carry_recomputed_metrics() {
    let store = Arc::new(MemoryStore::new());
    let mut raw = offer("o1", "vast", 82.6e12, 0.74);
    // Vendors cannot be trusted with derived fields.
    raw.flops_per_dollar_ph = 123.0;
    raw.score = 999.0;
    let collectors = vec![StubCollector::ok("vast", vec![raw])];

    run_scan(
        &scan_config(),
        collectors,
        store.clone(),
        &ScanOptions::default(),
    )
    .await;

    let rows = store.all_rows();
    assert_eq!(rows.len(), 1);
    let o = &rows[0];
    assert!((o.flops_per_dollar_ph - 82.6e12 / 0.74).abs() < 1e3);
    assert!(o.score > 0.0 && o.score <= 100.0);
}
