//! Storage abstraction for the offer catalog.
//!
//! The [`CatalogStore`] trait defines the three operations the pipeline
//! needs: delete one source's rows, insert a batch, and filtered reads.
//! [`RestStore`] talks to a hosted PostgREST endpoint; [`MemoryStore`]
//! implements the same query semantics in process for tests and dry runs.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

use std::sync::RwLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use thiserror::Error;

use crate::config::StoreConfig;
use crate::models::{GpuOffer, OfferQuery, SortDir};

/// A failed catalog operation.
///
/// The sync step treats every variant except [`MissingKey`](StoreError::MissingKey)
/// as transient and retries with backoff.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The operation needs a key the configuration does not provide.
    #[error("store is missing {credential}")]
    MissingKey { credential: &'static str },

    /// Transport-level failure (connect, timeout, TLS).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The catalog endpoint answered with a non-2xx status.
    #[error("catalog API returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
}

impl StoreError {
    /// True when retrying the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StoreError::MissingKey { .. })
    }
}

/// Abstract catalog backend.
///
/// `delete_source` and `insert_offers` are the two phases of the sync
/// step's replace; callers own retry policy. `fetch_offers` powers the
/// CLI listing and the HTTP read API.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Delete every row belonging to one source. Deleting a source with no
    /// rows is a success.
    async fn delete_source(&self, source: &str) -> Result<(), StoreError>;

    /// Insert a batch of offers. An empty batch is a no-op success.
    async fn insert_offers(&self, offers: &[GpuOffer]) -> Result<(), StoreError>;

    /// Fetch offers matching a filter, sorted and paginated.
    async fn fetch_offers(&self, query: &OfferQuery) -> Result<Vec<GpuOffer>, StoreError>;
}

/// Catalog backed by a PostgREST endpoint (Supabase-style).
///
/// Writes authenticate with the service key, reads with the anon key
/// (falling back to the service key when no anon key is configured).
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    table: String,
    service_key: Option<String>,
    anon_key: Option<String>,
}

impl RestStore {
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build catalog HTTP client")?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            table: config.table.clone(),
            service_key: config.service_key.clone(),
            anon_key: config.anon_key.clone(),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn write_key(&self) -> Result<&str, StoreError> {
        self.service_key.as_deref().ok_or(StoreError::MissingKey {
            credential: "service_key",
        })
    }

    fn read_key(&self) -> Result<&str, StoreError> {
        self.anon_key
            .as_deref()
            .or(self.service_key.as_deref())
            .ok_or(StoreError::MissingKey {
                credential: "anon_key",
            })
    }

    fn authed(&self, req: reqwest::RequestBuilder, key: &str) -> reqwest::RequestBuilder {
        req.header("apikey", key).bearer_auth(key)
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Api {
        status,
        body: body.chars().take(500).collect(),
    })
}

#[async_trait]
impl CatalogStore for RestStore {
    async fn delete_source(&self, source: &str) -> Result<(), StoreError> {
        let key = self.write_key()?;
        let req = self
            .client
            .delete(self.table_url())
            .query(&[("source", format!("eq.{source}"))])
            .header("Prefer", "return=minimal");
        let resp = self.authed(req, key).send().await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn insert_offers(&self, offers: &[GpuOffer]) -> Result<(), StoreError> {
        if offers.is_empty() {
            return Ok(());
        }
        let key = self.write_key()?;
        let req = self
            .client
            .post(self.table_url())
            .header("Prefer", "return=minimal")
            .json(offers);
        let resp = self.authed(req, key).send().await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn fetch_offers(&self, query: &OfferQuery) -> Result<Vec<GpuOffer>, StoreError> {
        let key = self.read_key()?;
        let mut params: Vec<(&str, String)> = vec![("select", "*".to_string())];
        if let Some(source) = &query.source {
            params.push(("source", format!("eq.{source}")));
        }
        if let Some(location) = &query.location {
            params.push(("location", format!("ilike.*{location}*")));
        }
        if let Some(max_price) = query.max_price {
            params.push(("total_cost_ph", format!("lt.{max_price}")));
        }
        if let Some(min) = query.min_flops_per_dollar {
            params.push(("flops_per_dollar_ph", format!("gte.{min}")));
        }
        params.push((
            "order",
            format!("{}.{}", query.sort_key, query.sort_dir.as_str()),
        ));
        params.push(("limit", query.limit.to_string()));
        params.push(("offset", query.offset.to_string()));

        let req = self.client.get(self.table_url()).query(&params);
        let resp = self.authed(req, key).send().await?;
        let resp = check_status(resp).await?;
        let offers = resp.json().await?;
        Ok(offers)
    }
}

/// In-memory catalog for tests and dry runs.
///
/// Filtering and sorting follow the same semantics as [`RestStore`]'s
/// PostgREST parameters: exact source match, case-insensitive location
/// substring, strict price ceiling, inclusive flops-per-dollar floor.
pub struct MemoryStore {
    rows: RwLock<Vec<GpuOffer>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }

    pub fn with_rows(rows: Vec<GpuOffer>) -> Self {
        Self {
            rows: RwLock::new(rows),
        }
    }

    /// Snapshot of every stored row, unfiltered.
    pub fn all_rows(&self) -> Vec<GpuOffer> {
        self.rows.read().unwrap().clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches(offer: &GpuOffer, query: &OfferQuery) -> bool {
    if let Some(source) = &query.source {
        if &offer.source != source {
            return false;
        }
    }
    if let Some(location) = &query.location {
        if !offer
            .location
            .to_lowercase()
            .contains(&location.to_lowercase())
        {
            return false;
        }
    }
    if let Some(max_price) = query.max_price {
        if offer.total_cost_ph >= max_price {
            return false;
        }
    }
    if let Some(min) = query.min_flops_per_dollar {
        if offer.flops_per_dollar_ph < min {
            return false;
        }
    }
    true
}

fn sort_field(offer: &GpuOffer, key: &str) -> f64 {
    match key {
        "score" => offer.score,
        "score_dollar_ph" => offer.score_dollar_ph,
        "flops_per_dollar_ph" => offer.flops_per_dollar_ph,
        "total_cost_ph" => offer.total_cost_ph,
        "reliability" => offer.reliability,
        "total_flops" => offer.total_flops,
        "num_gpus" => offer.num_gpus as f64,
        "vram_mb" => offer.vram_mb as f64,
        // Default and unknown keys sort by recency.
        _ => offer.updated_at.timestamp_millis() as f64,
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn delete_source(&self, source: &str) -> Result<(), StoreError> {
        self.rows.write().unwrap().retain(|o| o.source != source);
        Ok(())
    }

    async fn insert_offers(&self, offers: &[GpuOffer]) -> Result<(), StoreError> {
        self.rows.write().unwrap().extend_from_slice(offers);
        Ok(())
    }

    async fn fetch_offers(&self, query: &OfferQuery) -> Result<Vec<GpuOffer>, StoreError> {
        let mut out: Vec<GpuOffer> = self
            .rows
            .read()
            .unwrap()
            .iter()
            .filter(|o| matches(o, query))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            let (fa, fb) = (sort_field(a, &query.sort_key), sort_field(b, &query.sort_key));
            let ord = fa.partial_cmp(&fb).unwrap_or(std::cmp::Ordering::Equal);
            match query.sort_dir {
                SortDir::Asc => ord,
                SortDir::Desc => ord.reverse(),
            }
        });
        let offset = query.offset.max(0) as usize;
        let mut out: Vec<GpuOffer> = out.into_iter().skip(offset).collect();
        if query.limit > 0 {
            out.truncate(query.limit as usize);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(id: &str, source: &str, location: &str, price: f64, score: f64) -> GpuOffer {
        GpuOffer {
            id: id.to_string(),
            source: source.to_string(),
            location: location.to_string(),
            total_cost_ph: price,
            score,
            flops_per_dollar_ph: if price > 0.0 { 1e12 / price } else { 0.0 },
            ..GpuOffer::default()
        }
    }

    #[tokio::test]
    async fn memory_store_filters_and_sorts() {
        let store = MemoryStore::with_rows(vec![
            offer("a", "vast", "Sweden", 0.5, 40.0),
            offer("b", "vast", "Norway", 2.0, 80.0),
            offer("c", "lambda", "us-east-1", 1.0, 60.0),
        ]);

        let by_source = store
            .fetch_offers(&OfferQuery {
                source: Some("vast".to_string()),
                ..OfferQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(by_source.len(), 2);

        let cheap = store
            .fetch_offers(&OfferQuery {
                max_price: Some(1.0),
                ..OfferQuery::default()
            })
            .await
            .unwrap();
        // The ceiling is strict, so the $1.00 offer is excluded.
        assert_eq!(cheap.len(), 1);
        assert_eq!(cheap[0].id, "a");

        let by_score = store
            .fetch_offers(&OfferQuery::default().with_sort("score.desc"))
            .await
            .unwrap();
        let ids: Vec<&str> = by_score.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);
    }

    #[tokio::test]
    async fn memory_store_location_match_is_case_insensitive() {
        let store = MemoryStore::with_rows(vec![offer("a", "vast", "Stockholm, Sweden", 0.5, 1.0)]);
        let hits = store
            .fetch_offers(&OfferQuery {
                location: Some("sweden".to_string()),
                ..OfferQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn memory_store_replace_touches_only_one_source() {
        let store = MemoryStore::with_rows(vec![
            offer("a", "vast", "", 0.5, 1.0),
            offer("b", "lambda", "", 1.0, 2.0),
        ]);
        store.delete_source("vast").await.unwrap();
        store
            .insert_offers(&[offer("a2", "vast", "", 0.6, 1.5)])
            .await
            .unwrap();

        let rows = store.all_rows();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|o| o.id == "b"));
        assert!(rows.iter().any(|o| o.id == "a2"));
    }

    #[tokio::test]
    async fn memory_store_pagination() {
        let store = MemoryStore::with_rows(
            (0..10)
                .map(|i| offer(&format!("o{i}"), "vast", "", 1.0 + i as f64, i as f64))
                .collect(),
        );
        let page = store
            .fetch_offers(&OfferQuery {
                offset: 2,
                limit: 3,
                ..OfferQuery::default().with_sort("score.asc")
            })
            .await
            .unwrap();
        let ids: Vec<&str> = page.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["o2", "o3", "o4"]);
    }

    fn rest_config(url: &str) -> StoreConfig {
        StoreConfig {
            url: url.to_string(),
            service_key: Some("svc-key".to_string()),
            anon_key: Some("anon-key".to_string()),
            table: "gpus".to_string(),
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn rest_store_delete_targets_one_source() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/rest/v1/gpus")
            .match_query(mockito::Matcher::UrlEncoded(
                "source".into(),
                "eq.vast".into(),
            ))
            .match_header("apikey", "svc-key")
            .match_header("authorization", "Bearer svc-key")
            .with_status(204)
            .create_async()
            .await;

        let store = RestStore::from_config(&rest_config(&server.url())).unwrap();
        store.delete_source("vast").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rest_store_insert_posts_batch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/v1/gpus")
            .match_header("apikey", "svc-key")
            .match_header("prefer", "return=minimal")
            .with_status(201)
            .create_async()
            .await;

        let store = RestStore::from_config(&rest_config(&server.url())).unwrap();
        store
            .insert_offers(&[offer("a", "vast", "", 0.5, 1.0)])
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rest_store_fetch_builds_postgrest_params() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/gpus")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("select".into(), "*".into()),
                mockito::Matcher::UrlEncoded("source".into(), "eq.vast".into()),
                mockito::Matcher::UrlEncoded("location".into(), "ilike.*sweden*".into()),
                mockito::Matcher::UrlEncoded("total_cost_ph".into(), "lt.1.5".into()),
                mockito::Matcher::UrlEncoded("order".into(), "score.desc".into()),
                mockito::Matcher::UrlEncoded("limit".into(), "200".into()),
            ]))
            .match_header("apikey", "anon-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;

        let store = RestStore::from_config(&rest_config(&server.url())).unwrap();
        let query = OfferQuery {
            source: Some("vast".to_string()),
            location: Some("sweden".to_string()),
            max_price: Some(1.5),
            ..OfferQuery::default().with_sort("score.desc")
        };
        let offers = store.fetch_offers(&query).await.unwrap();
        assert!(offers.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rest_store_write_without_service_key_fails_fast() {
        let mut config = rest_config("http://unused.invalid");
        config.service_key = None;
        let store = RestStore::from_config(&config).unwrap();
        let err = store.delete_source("vast").await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::MissingKey {
                credential: "service_key"
            }
        ));
        assert!(!err.is_retryable());
    }
}
