//! RunPod collector.
//!
//! RunPod's public GraphQL schema exposes the GPU type catalog but not
//! prices, so pricing comes from a static table of published on-demand
//! rates (August 2025). Types absent from the table are skipped rather
//! than written with a zero price.
//!
//! The catalog also carries no per-host inventory. For high-end types we
//! synthesize 1x/2x/4x configurations with linearly scaled price, compute
//! and host estimates, which is how the marketplace actually sells them.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::collector::{error_for_status, CollectError, Collector};
use crate::models::GpuOffer;
use crate::specs;

const DEFAULT_BASE_URL: &str = "https://api.runpod.io";

const GPU_TYPES_QUERY: &str = "query { gpuTypes { id displayName memoryInGb } }";

/// Published on-demand rates, USD per GPU-hour. Ordered most specific
/// first; the lookup takes the first substring match, so "RTX 3090 Ti"
/// must not fall through to the "3090" rate.
const PRICES: &[(&str, f64)] = &[
    ("v100 sxm2 32gb", 0.99),
    ("v100 sxm2", 0.89),
    ("v100 fhhl", 0.79),
    ("tesla v100", 0.79),
    ("rtx 3090 ti", 0.49),
    ("rtx 3080 ti", 0.16),
    ("rtx 4070 ti", 0.35),
    ("rtx 6000 ada", 1.33),
    ("rtx 5000 ada", 0.56),
    ("rtx 4000 ada", 0.40),
    ("rtx 2000 ada", 0.40),
    ("6000 ada", 1.33),
    ("5000 ada", 0.56),
    ("4000 ada", 0.40),
    ("2000 ada", 0.40),
    ("a100 sxm", 2.17),
    ("a100 pcie", 2.09),
    ("a100", 2.09),
    ("h100 nvl", 3.89),
    ("h100 sxm", 3.58),
    ("h100 pcie", 3.35),
    ("h100", 3.58),
    ("h200 sxm", 3.99),
    ("h200", 3.99),
    ("rtx a6000", 0.85),
    ("a6000", 0.85),
    ("rtx a5000", 0.48),
    ("a5000", 0.48),
    ("rtx a4500", 0.40),
    ("a4500", 0.40),
    ("rtx a4000", 0.40),
    ("a4000", 0.40),
    ("rtx a2000", 0.11),
    ("a2000", 0.11),
    ("rtx 3070", 0.11),
    ("rtx 3080", 0.14),
    ("rtx 3090", 0.44),
    ("3090", 0.44),
    ("rtx 4080", 0.56),
    ("rtx 4090", 0.74),
    ("4090", 0.74),
    ("rtx 5080", 0.85),
    ("rtx 5090", 1.11),
    ("5090", 1.11),
    ("mi300x", 4.89),
    ("b200", 5.99),
    ("v100", 0.79),
    // Bare short names last: "a40" is inside "a4000", "l4" inside "l40".
    ("a30", 0.69),
    ("a40", 0.85),
    ("l40s", 1.33),
    ("l40", 1.33),
    ("l4", 0.48),
    ("t4", 0.39),
];

pub struct RunpodCollector {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: GpuTypesData,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Default, Deserialize)]
struct GpuTypesData {
    #[serde(rename = "gpuTypes", default)]
    gpu_types: Vec<GpuType>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GpuType {
    id: String,
    #[serde(rename = "displayName", default)]
    display_name: String,
    #[serde(rename = "memoryInGb", default)]
    memory_in_gb: u64,
}

impl RunpodCollector {
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
impl Collector for RunpodCollector {
    fn source(&self) -> &'static str {
        "runpod"
    }

    fn description(&self) -> &'static str {
        "RunPod GPU type catalog with published rates (requires RUNPOD_API_KEY)"
    }

    async fn fetch(&self) -> Result<Vec<GpuOffer>, CollectError> {
        let api_key = match self.api_key.as_deref().map(str::trim) {
            Some(k) if !k.is_empty() => k,
            _ => {
                return Err(CollectError::Unconfigured {
                    credential: "RUNPOD_API_KEY",
                })
            }
        };

        let resp = self
            .client
            .post(format!("{}/graphql", self.base_url))
            .bearer_auth(api_key)
            .json(&json!({ "query": GPU_TYPES_QUERY }))
            .send()
            .await?;
        let resp = error_for_status(resp).await?;
        let gql: GraphqlResponse = resp
            .json()
            .await
            .map_err(|e| CollectError::Decode(e.to_string()))?;
        if let Some(err) = gql.errors.first() {
            return Err(CollectError::Decode(format!(
                "graphql error: {}",
                err.message
            )));
        }

        let mut out = Vec::new();
        for gpu_type in gql.data.gpu_types {
            if gpu_type.display_name == "unknown" || gpu_type.id == "unknown" {
                continue;
            }
            let Some(price) = lookup_price(&gpu_type.display_name)
                .or_else(|| lookup_price(&gpu_type.id))
            else {
                continue;
            };

            let mut vram_mb = gpu_type.memory_in_gb * 1024;
            if vram_mb == 0 {
                vram_mb = specs::parse_vram_mb(&gpu_type.display_name);
                if vram_mb == 0 {
                    vram_mb = specs::parse_vram_mb(&gpu_type.id);
                }
            }
            let hw = specs::resolve(&gpu_type.display_name);

            for count in gpu_counts(&gpu_type.display_name) {
                out.push(synthesize(&gpu_type, vram_mb, &hw, price, *count));
            }
        }
        Ok(out)
    }
}

fn lookup_price(name: &str) -> Option<f64> {
    let n = name.to_lowercase();
    PRICES
        .iter()
        .find(|(key, _)| n.contains(key))
        .map(|(_, price)| *price)
}

/// Multi-GPU configurations only exist for the types the marketplace
/// actually racks in multiples.
fn gpu_counts(display_name: &str) -> &'static [u32] {
    const MULTI: &[&str] = &["a100", "h100", "h200", "4090", "3090"];
    let n = display_name.to_lowercase();
    if MULTI.iter().any(|m| n.contains(m)) {
        &[1, 2, 4]
    } else {
        &[1]
    }
}

fn is_premium(display_name: &str) -> bool {
    const PREMIUM: &[&str] = &["a100", "h100", "h200", "mi300x", "b200"];
    let n = display_name.to_lowercase();
    PREMIUM.iter().any(|p| n.contains(p))
}

fn synthesize(
    gpu_type: &GpuType,
    vram_mb: u64,
    hw: &specs::GpuSpecs,
    unit_price: f64,
    count: u32,
) -> GpuOffer {
    let total_price = unit_price * count as f64;
    // Host-side estimates; RunPod does not expose them per type.
    let (vcpus_per_gpu, ram_gb_per_gpu, disk_gb_per_gpu) = if is_premium(&gpu_type.display_name) {
        (16u32, 64u64, 200.0)
    } else {
        (8, 32, 100.0)
    };

    let (reliability, cloud) = if unit_price > 1.5 {
        (0.99, "Secure Cloud")
    } else {
        (0.95, "Community Cloud")
    };

    GpuOffer {
        id: format!("{}-{}x", gpu_type.id.replace(' ', "-"), count),
        source: "runpod".to_string(),
        location: cloud.to_string(),
        reliability,
        name: gpu_type.display_name.clone(),
        num_gpus: count,
        vram_mb,
        ram_mb: count as u64 * ram_gb_per_gpu * 1024,
        disk_space_gb: count as f64 * disk_gb_per_gpu,
        disk_bw_gbps: 2000.0,
        disk_name: "NVMe SSD".to_string(),
        total_flops: hw.flops * count as f64,
        gpu_mem_bw_gbps: hw.mem_bw_gbps,
        cpu_cores: (count * vcpus_per_gpu) as f64,
        cpu_ghz: 2.5,
        cpu_name: "AMD EPYC".to_string(),
        cpu_arch: "x86_64".to_string(),
        upload_mbps: 10000.0,
        download_mbps: 10000.0,
        total_cost_ph: total_price,
        gpu_cost_ph: total_price,
        url: deploy_url(&gpu_type.display_name, count),
        ..GpuOffer::default()
    }
}

fn deploy_url(display_name: &str, count: u32) -> String {
    let gpu = display_name.to_uppercase().replace(' ', "%20");
    format!("https://www.console.runpod.io/deploy/?gpu={gpu}&count={count}&template=runpod-torch-v280")
}
