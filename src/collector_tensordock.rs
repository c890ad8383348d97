//! TensorDock marketplace collector.
//!
//! One hostnode can expose several GPU models; each (hostnode, model) pair
//! with available stock becomes one offer. The API reports no compute specs,
//! so flops and memory bandwidth come from the resolver over the `v0Name`
//! (e.g. "h100-sxm5-80gb") and VRAM is parsed from its `<n>gb` suffix.

use async_trait::async_trait;
use serde::Deserialize;

use crate::collector::{error_for_status, CollectError, Collector};
use crate::models::GpuOffer;
use crate::specs;

const DEFAULT_BASE_URL: &str = "https://dashboard.tensordock.com";

pub struct TensordockCollector {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HostnodesResponse {
    #[serde(default)]
    data: HostnodesData,
}

#[derive(Debug, Default, Deserialize)]
struct HostnodesData {
    #[serde(default)]
    hostnodes: Vec<Hostnode>,
}

#[derive(Debug, Deserialize)]
struct Hostnode {
    id: String,
    /// Uptime in percent (0..=100); our reliability is a fraction.
    #[serde(default)]
    uptime_percentage: f64,
    #[serde(default)]
    available_resources: AvailableResources,
    #[serde(default)]
    location: HostLocation,
}

#[derive(Debug, Default, Deserialize)]
struct AvailableResources {
    #[serde(default)]
    gpus: Vec<HostGpu>,
    #[serde(default)]
    vcpu_count: u32,
    #[serde(default)]
    ram_gb: u64,
    #[serde(default)]
    storage_gb: f64,
}

#[derive(Debug, Deserialize)]
struct HostGpu {
    #[serde(rename = "v0Name", default)]
    v0_name: String,
    #[serde(rename = "availableCount", default)]
    available_count: i64,
    #[serde(default)]
    price_per_hr: f64,
}

#[derive(Debug, Default, Deserialize)]
struct HostLocation {
    #[serde(default)]
    city: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    network_speed_gbps: f64,
    #[serde(default)]
    network_speed_upload_gbps: f64,
}

impl TensordockCollector {
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
impl Collector for TensordockCollector {
    fn source(&self) -> &'static str {
        "tensordock"
    }

    fn description(&self) -> &'static str {
        "TensorDock hostnode marketplace (requires TENSORDOCK_TOKEN)"
    }

    async fn fetch(&self) -> Result<Vec<GpuOffer>, CollectError> {
        let token = match self.api_key.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => {
                return Err(CollectError::Unconfigured {
                    credential: "TENSORDOCK_TOKEN",
                })
            }
        };

        let resp = self
            .client
            .get(format!("{}/api/v2/hostnodes", self.base_url))
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;
        let resp = error_for_status(resp).await?;
        let hostnodes: HostnodesResponse = resp
            .json()
            .await
            .map_err(|e| CollectError::Decode(e.to_string()))?;

        let mut out = Vec::new();
        for node in hostnodes.data.hostnodes {
            let location = format!("{}, {}", node.location.city, node.location.country)
                .trim_matches([' ', ','])
                .to_string();
            let download_mbps = node.location.network_speed_gbps * 1000.0;
            let upload_mbps = node.location.network_speed_upload_gbps * 1000.0;

            for gpu in &node.available_resources.gpus {
                if gpu.available_count <= 0 {
                    continue;
                }
                let count = gpu.available_count as u32;
                let hw = specs::resolve(&gpu.v0_name);
                // Price and flops are per GPU on the wire; scale both so the
                // row's totals stay aggregate like every other source.
                let total_cost = gpu.price_per_hr * count as f64;
                out.push(GpuOffer {
                    id: node.id.clone(),
                    source: "tensordock".to_string(),
                    location: location.clone(),
                    reliability: node.uptime_percentage / 100.0,
                    name: gpu.v0_name.clone(),
                    num_gpus: count,
                    vram_mb: specs::parse_vram_mb(&gpu.v0_name),
                    ram_mb: node.available_resources.ram_gb * 1024,
                    disk_space_gb: node.available_resources.storage_gb,
                    total_flops: hw.flops * count as f64,
                    gpu_mem_bw_gbps: hw.mem_bw_gbps,
                    cpu_cores: node.available_resources.vcpu_count as f64,
                    upload_mbps,
                    download_mbps,
                    total_cost_ph: total_cost,
                    gpu_cost_ph: total_cost,
                    url: deploy_url(
                        &gpu.v0_name,
                        node.available_resources.ram_gb,
                        node.available_resources.vcpu_count,
                        node.available_resources.storage_gb,
                    ),
                    ..GpuOffer::default()
                });
            }
        }
        Ok(out)
    }
}

fn deploy_url(gpu_name: &str, ram_gb: u64, vcpus: u32, storage_gb: f64) -> String {
    let gpu = gpu_name.to_lowercase().replace(' ', "_");
    format!(
        "https://marketplace.tensordock.com/deploy?gpu={gpu}&ram={ram_gb}&vcpus={vcpus}&storage={}",
        storage_gb as u64
    )
}
