//! Collection cycle orchestration.
//!
//! One cycle fetches every configured vendor concurrently, normalizes and
//! scores the offers, then replaces each source's rows in the catalog.
//! Sources are strictly isolated: a vendor outage leaves that source's
//! previous snapshot in place and never blocks the others.
//!
//! The replace is two-phase (delete the source's rows, insert the new
//! batch), each phase with bounded retries and exponential backoff. A
//! delete that exhausts its retries aborts that source's replace with the
//! old rows intact. An insert that exhausts its retries after a successful
//! delete leaves the source empty until the next cycle; that is surfaced
//! as a degraded outcome and an error-level log, never a panic.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collector::{CollectError, Collector};
use crate::config::ScanConfig;
use crate::models::{GpuOffer, ScanReport, SourceOutcome, SourceStatus};
use crate::score;
use crate::store::{CatalogStore, StoreError};

/// Per-cycle options from the CLI.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Collect and score but do not touch the store.
    pub dry_run: bool,
    /// Cap the number of offers kept per source.
    pub limit: Option<usize>,
}

/// Run one collection cycle over the given collectors.
pub async fn run_scan(
    scan: &ScanConfig,
    collectors: Vec<Box<dyn Collector>>,
    store: Arc<dyn CatalogStore>,
    opts: &ScanOptions,
) -> ScanReport {
    let started_at = Utc::now();
    let deadline = Duration::from_secs(scan.timeout_secs);
    let timeout_secs = scan.timeout_secs;

    let handles: Vec<_> = collectors
        .into_iter()
        .map(|collector| {
            tokio::spawn(async move {
                let source = collector.source();
                let result = match tokio::time::timeout(deadline, collector.fetch()).await {
                    Ok(result) => result,
                    Err(_) => Err(CollectError::Timeout { secs: timeout_secs }),
                };
                (source, result)
            })
        })
        .collect();

    let mut outcomes = Vec::new();
    for joined in join_all(handles).await {
        let (source, result) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "collector task panicked");
                outcomes.push(SourceOutcome {
                    source: "unknown".to_string(),
                    status: SourceStatus::CollectFailed {
                        reason: format!("task failed: {e}"),
                    },
                });
                continue;
            }
        };

        let status = match result {
            Ok(mut offers) => {
                if let Some(limit) = opts.limit {
                    offers.truncate(limit);
                }
                prepare_offers(source, &mut offers);
                info!(source, offers = offers.len(), "collected");
                if opts.dry_run {
                    SourceStatus::Collected {
                        offers: offers.len(),
                    }
                } else {
                    replace_source(store.as_ref(), source, &offers, scan).await
                }
            }
            Err(CollectError::Unconfigured { credential }) => {
                info!(source, credential, "skipped: credential not configured");
                SourceStatus::Unconfigured {
                    credential: credential.to_string(),
                }
            }
            Err(e) => {
                warn!(source, error = %e, "collect failed; previous rows retained");
                SourceStatus::CollectFailed {
                    reason: e.to_string(),
                }
            }
        };
        outcomes.push(SourceOutcome {
            source: source.to_string(),
            status,
        });
    }

    outcomes.sort_by(|a, b| a.source.cmp(&b.source));
    ScanReport {
        outcomes,
        started_at,
        finished_at: Utc::now(),
    }
}

/// Normalize a collected batch in place: enforce the source tag, make ids
/// unique within the batch, stamp the collection time, and recompute the
/// derived metrics regardless of what the vendor reported.
fn prepare_offers(source: &str, offers: &mut [GpuOffer]) {
    let now = Utc::now();
    let mut seen = HashSet::with_capacity(offers.len());
    for offer in offers.iter_mut() {
        if offer.source != source {
            offer.source = source.to_string();
        }
        if !seen.insert(offer.id.clone()) {
            // Hosts can list several configurations under one machine id.
            let fresh = format!("{}-{}", offer.id, Uuid::new_v4());
            warn!(source, id = %offer.id, "duplicate offer id; synthesized {fresh}");
            offer.id = fresh;
        }
        offer.updated_at = now;
        score::apply_derived_metrics(offer);
    }
}

/// Two-phase replace of one source's rows.
async fn replace_source(
    store: &dyn CatalogStore,
    source: &str,
    offers: &[GpuOffer],
    scan: &ScanConfig,
) -> SourceStatus {
    if let Err(e) = with_retries(scan.max_retries, source, "delete", || {
        store.delete_source(source)
    })
    .await
    {
        warn!(source, error = %e, "delete phase exhausted; previous rows retained");
        return SourceStatus::ReplaceAborted {
            reason: e.to_string(),
        };
    }

    if let Err(e) = with_retries(scan.max_retries, source, "insert", || {
        store.insert_offers(offers)
    })
    .await
    {
        // The delete already went through, so the catalog is missing this
        // source until the next successful cycle.
        error!(source, error = %e, "insert phase exhausted; source is empty until next cycle");
        return SourceStatus::Degraded {
            reason: e.to_string(),
        };
    }

    SourceStatus::Synced {
        offers: offers.len(),
    }
}

/// Run one store operation with up to `max_retries` attempts and
/// exponential backoff between them.
async fn with_retries<F, Fut>(
    max_retries: u32,
    source: &str,
    phase: &str,
    mut op: F,
) -> Result<(), StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), StoreError>>,
{
    let attempts = max_retries.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && attempt < attempts => {
                let delay = Duration::from_millis(250u64 << attempt.min(6));
                warn!(source, phase, attempt, error = %e, "store operation failed; retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// CLI summary of one cycle.
pub fn print_report(report: &ScanReport) {
    println!("scan");
    for outcome in &report.outcomes {
        match &outcome.status {
            SourceStatus::Synced { offers } => {
                println!("  {}: {} offers synced", outcome.source, offers)
            }
            SourceStatus::Collected { offers } => {
                println!("  {}: {} offers collected (dry-run)", outcome.source, offers)
            }
            SourceStatus::Unconfigured { credential } => {
                println!("  {}: skipped (missing {})", outcome.source, credential)
            }
            SourceStatus::CollectFailed { reason } => {
                println!("  {}: collect failed ({})", outcome.source, reason)
            }
            SourceStatus::ReplaceAborted { reason } => {
                println!(
                    "  {}: replace aborted, previous rows retained ({})",
                    outcome.source, reason
                )
            }
            SourceStatus::Degraded { reason } => {
                println!("  {}: degraded, source left empty ({})", outcome.source, reason)
            }
        }
    }
    println!("  total offers synced: {}", report.offers_synced());
    let elapsed = report.finished_at - report.started_at;
    println!("  elapsed: {}ms", elapsed.num_milliseconds());
    if report.fully_completed() {
        println!("ok");
    } else {
        println!("completed with failures");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct StubCollector {
        source: &'static str,
        result: Result<Vec<GpuOffer>, CollectError>,
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
            match &self.result {
                Ok(offers) => Ok(offers.clone()),
                Err(CollectError::Timeout { secs }) => Err(CollectError::Timeout { secs: *secs }),
                Err(CollectError::Unconfigured { credential }) => {
                    Err(CollectError::Unconfigured { credential })
                }
                Err(CollectError::Decode(m)) => Err(CollectError::Decode(m.clone())),
                Err(other) => Err(CollectError::Decode(other.to_string())),
            }
        }
    }

    fn offer(id: &str, flops: f64, cost: f64) -> GpuOffer {
        GpuOffer {
            id: id.to_string(),
            total_flops: flops,
            gpu_mem_bw_gbps: 1000.0,
            total_cost_ph: cost,
            ..GpuOffer::default()
        }
    }

    fn scan_config() -> ScanConfig {
        ScanConfig {
            timeout_secs: 5,
            max_retries: 2,
            vast_limit: 64,
        }
    }

    #[tokio::test]
    async fn failed_source_keeps_previous_rows() {
        let store = Arc::new(MemoryStore::with_rows(vec![GpuOffer {
            id: "old".to_string(),
            source: "vast".to_string(),
            ..GpuOffer::default()
        }]));
        let collectors: Vec<Box<dyn Collector>> = vec![Box::new(StubCollector {
            source: "vast",
            result: Err(CollectError::Decode("boom".to_string())),
        })];

        let report = run_scan(
            &scan_config(),
            collectors,
            store.clone(),
            &ScanOptions::default(),
        )
        .await;

        assert!(matches!(
            report.outcomes[0].status,
            SourceStatus::CollectFailed { .. }
        ));
        assert!(!report.fully_completed());
        let rows = store.all_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "old");
    }

    #[tokio::test]
    async fn successful_source_replaces_its_rows_only() {
        let store = Arc::new(MemoryStore::with_rows(vec![
            GpuOffer {
                id: "stale".to_string(),
                source: "vast".to_string(),
                ..GpuOffer::default()
            },
            GpuOffer {
                id: "other".to_string(),
                source: "lambda".to_string(),
                ..GpuOffer::default()
            },
        ]));
        let collectors: Vec<Box<dyn Collector>> = vec![Box::new(StubCollector {
            source: "vast",
            result: Ok(vec![offer("fresh", 82.6e12, 0.74)]),
        })];

        let report = run_scan(
            &scan_config(),
            collectors,
            store.clone(),
            &ScanOptions::default(),
        )
        .await;

        assert_eq!(
            report.outcomes[0].status,
            SourceStatus::Synced { offers: 1 }
        );
        let rows = store.all_rows();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|o| o.id == "other" && o.source == "lambda"));
        let fresh = rows.iter().find(|o| o.id == "fresh").unwrap();
        assert_eq!(fresh.source, "vast");
        // Derived metrics are recomputed during the cycle.
        assert!(fresh.score > 0.0);
        assert!((fresh.flops_per_dollar_ph - 82.6e12 / 0.74).abs() < 1e3);
    }

    #[tokio::test]
    async fn duplicate_ids_are_made_unique() {
        let store = Arc::new(MemoryStore::new());
        let collectors: Vec<Box<dyn Collector>> = vec![Box::new(StubCollector {
            source: "tensordock",
            result: Ok(vec![
                offer("node-1", 1e12, 0.5),
                offer("node-1", 2e12, 0.9),
            ]),
        })];

        run_scan(
            &scan_config(),
            collectors,
            store.clone(),
            &ScanOptions::default(),
        )
        .await;

        let rows = store.all_rows();
        assert_eq!(rows.len(), 2);
        let ids: HashSet<String> = rows.iter().map(|o| o.id.clone()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("node-1"));
    }

    #[tokio::test]
    async fn dry_run_never_touches_the_store() {
        let store = Arc::new(MemoryStore::with_rows(vec![GpuOffer {
            id: "keep".to_string(),
            source: "vast".to_string(),
            ..GpuOffer::default()
        }]));
        let collectors: Vec<Box<dyn Collector>> = vec![Box::new(StubCollector {
            source: "vast",
            result: Ok(vec![offer("new", 1e12, 0.5)]),
        })];

        let report = run_scan(
            &scan_config(),
            collectors,
            store.clone(),
            &ScanOptions {
                dry_run: true,
                limit: None,
            },
        )
        .await;

        assert_eq!(
            report.outcomes[0].status,
            SourceStatus::Collected { offers: 1 }
        );
        assert_eq!(store.all_rows().len(), 1);
        assert_eq!(store.all_rows()[0].id, "keep");
    }

    #[tokio::test]
    async fn per_source_limit_truncates() {
        let store = Arc::new(MemoryStore::new());
        let collectors: Vec<Box<dyn Collector>> = vec![Box::new(StubCollector {
            source: "vast",
            result: Ok((0..5).map(|i| offer(&format!("o{i}"), 1e12, 0.5)).collect()),
        })];

        let report = run_scan(
            &scan_config(),
            collectors,
            store.clone(),
            &ScanOptions {
                dry_run: false,
                limit: Some(2),
            },
        )
        .await;

        assert_eq!(
            report.outcomes[0].status,
            SourceStatus::Synced { offers: 2 }
        );
        assert_eq!(store.all_rows().len(), 2);
    }

    #[tokio::test]
    async fn unconfigured_source_counts_as_clean_skip() {
        let store = Arc::new(MemoryStore::new());
        let collectors: Vec<Box<dyn Collector>> = vec![Box::new(StubCollector {
            source: "runpod",
            result: Err(CollectError::Unconfigured {
                credential: "RUNPOD_API_KEY",
            }),
        })];

        let report = run_scan(
            &scan_config(),
            collectors,
            store,
            &ScanOptions::default(),
        )
        .await;

        assert!(report.fully_completed());
        assert_eq!(report.offers_synced(), 0);
    }
}
