//! Lambda Labs collector.
//!
//! Lambda sells fixed instance types rather than a marketplace, so one
//! offer per type with capacity in at least one region. The GPU model is
//! parsed out of the human-readable description ("8x NVIDIA A100 (40 GB)")
//! and compute specs come from the resolver over the type name.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::collector::{error_for_status, CollectError, Collector};
use crate::models::GpuOffer;
use crate::specs;

const DEFAULT_BASE_URL: &str = "https://cloud.lambda.ai";

pub struct LambdaCollector {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstanceTypesResponse {
    // BTreeMap keeps offer order stable across cycles.
    #[serde(default)]
    data: BTreeMap<String, InstanceTypeEntry>,
}

#[derive(Debug, Deserialize)]
struct InstanceTypeEntry {
    instance_type: InstanceType,
    #[serde(default)]
    regions_with_capacity_available: Vec<Region>,
}

#[derive(Debug, Deserialize)]
struct InstanceType {
    #[serde(default)]
    price_cents_per_hour: f64,
    #[serde(default)]
    specs: InstanceSpecs,
    #[serde(default)]
    gpu_description: String,
}

#[derive(Debug, Default, Deserialize)]
struct InstanceSpecs {
    #[serde(default)]
    memory_gib: u64,
    #[serde(default)]
    gpus: u32,
    #[serde(default)]
    storage_gib: f64,
    #[serde(default)]
    vcpus: u32,
}

#[derive(Debug, Deserialize)]
struct Region {
    name: String,
}

impl LambdaCollector {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl Collector for LambdaCollector {
    fn source(&self) -> &'static str {
        "lambda"
    }

    fn description(&self) -> &'static str {
        "Lambda Labs instance types (requires LAMBDA_TOKEN)"
    }

    async fn fetch(&self) -> Result<Vec<GpuOffer>, CollectError> {
        let token = match self.api_key.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => {
                return Err(CollectError::Unconfigured {
                    credential: "LAMBDA_TOKEN",
                })
            }
        };

        let resp = self
            .client
            .get(format!("{}/api/v1/instance-types", self.base_url))
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;
        let resp = error_for_status(resp).await?;
        let types: InstanceTypesResponse = resp
            .json()
            .await
            .map_err(|e| CollectError::Decode(e.to_string()))?;

        let mut out = Vec::new();
        for (type_name, entry) in types.data {
            // No region with capacity means nothing rentable right now.
            let Some(region) = entry.regions_with_capacity_available.first() else {
                continue;
            };
            let it = &entry.instance_type;
            let gpus = it.specs.gpus.max(1);
            let price_per_hour = it.price_cents_per_hour / 100.0;
            // The type name ("gpu_8x_a100_sxm4") carries the form factor
            // and the description ("8x NVIDIA A100 (40 GB)") the capacity;
            // resolve over both so variant rules can see every qualifier.
            let hw = specs::resolve(&format!("{} {}", type_name, it.gpu_description));

            out.push(GpuOffer {
                id: type_name,
                source: "lambda".to_string(),
                location: region.name.clone(),
                reliability: 0.99,
                name: gpu_model_name(&it.gpu_description),
                num_gpus: gpus,
                vram_mb: specs::parse_vram_mb(&it.gpu_description),
                ram_mb: it.specs.memory_gib * 1024,
                disk_space_gb: it.specs.storage_gib,
                disk_bw_gbps: 12_000.0,
                disk_name: "NVMe SSD".to_string(),
                total_flops: hw.flops * gpus as f64,
                gpu_mem_bw_gbps: hw.mem_bw_gbps,
                cpu_cores: it.specs.vcpus as f64,
                upload_mbps: 10000.0,
                download_mbps: 10000.0,
                total_cost_ph: price_per_hour,
                gpu_cost_ph: price_per_hour,
                url: "https://cloud.lambda.ai/instances".to_string(),
                ..GpuOffer::default()
            });
        }
        Ok(out)
    }
}

/// "8x NVIDIA A100 (40 GB)" -> "A100". Falls back to the whole description
/// when it does not follow the usual shape.
fn gpu_model_name(description: &str) -> String {
    let parts: Vec<&str> = description.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if part.to_uppercase().contains("NVIDIA") && i + 1 < parts.len() {
            return parts[i + 1].to_string();
        }
    }
    description.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn model_name_extraction() {
        assert_eq!(gpu_model_name("8x NVIDIA A100 (40 GB)"), "A100");
        assert_eq!(gpu_model_name("1x NVIDIA H100 (80 GB SXM5)"), "H100");
        assert_eq!(gpu_model_name("something else"), "something else");
    }

    fn fixture() -> serde_json::Value {
        json!({
            "data": {
                "gpu_8x_a100_sxm4": {
                    "instance_type": {
                        "price_cents_per_hour": 1032.0,
                        "gpu_description": "8x NVIDIA A100 (40 GB)",
                        "specs": {
                            "memory_gib": 1800,
                            "gpus": 8,
                            "storage_gib": 5900.0,
                            "vcpus": 124
                        }
                    },
                    "regions_with_capacity_available": [
                        { "name": "us-east-1", "description": "Virginia, USA" }
                    ]
                },
                "gpu_1x_h100_pcie": {
                    "instance_type": {
                        "price_cents_per_hour": 249.0,
                        "gpu_description": "1x NVIDIA H100 (80 GB PCIe)",
                        "specs": { "memory_gib": 200, "gpus": 1, "storage_gib": 512.0, "vcpus": 26 }
                    },
                    "regions_with_capacity_available": []
                }
            }
        })
    }

    #[tokio::test]
    async fn fetch_maps_types_with_capacity() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/instance-types")
            .match_header("authorization", "Bearer ll-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(fixture().to_string())
            .create_async()
            .await;

        let collector = LambdaCollector::with_base_url(server.url(), Some("ll-token".to_string()));
        let offers = collector.fetch().await.unwrap();
        mock.assert_async().await;

        // The H100 type has no region with capacity and is skipped.
        assert_eq!(offers.len(), 1);
        let o = &offers[0];
        assert_eq!(o.id, "gpu_8x_a100_sxm4");
        assert_eq!(o.source, "lambda");
        assert_eq!(o.location, "us-east-1");
        assert_eq!(o.name, "A100");
        assert_eq!(o.num_gpus, 8);
        assert_eq!(o.vram_mb, 40 * 1024);
        assert_eq!(o.ram_mb, 1800 * 1024);
        assert!((o.total_cost_ph - 10.32).abs() < 1e-9);
        // A100 SXM4 40GB figures from the resolver, times eight.
        assert!((o.total_flops - 8.0 * 19.5e12).abs() < 1e6);
        assert!((o.gpu_mem_bw_gbps - 1555.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn missing_token_is_unconfigured() {
        let collector = LambdaCollector::with_base_url("http://unused.invalid", None);
        assert!(collector.fetch().await.unwrap_err().is_unconfigured());
    }
}
