//! Vast.ai marketplace collector.
//!
//! Vast's search endpoint is public, so this is the one collector that needs
//! no credential. Offers arrive with compute in TFLOPS; everything else in
//! the wire schema already matches our canonical units.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::collector::{error_for_status, CollectError, Collector};
use crate::models::GpuOffer;

const DEFAULT_BASE_URL: &str = "https://console.vast.ai";

pub struct VastCollector {
    client: reqwest::Client,
    base_url: String,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    offers: Vec<VastOffer>,
}

#[derive(Debug, Default, Deserialize)]
struct VastSearch {
    #[serde(rename = "gpuCostPerHour", default)]
    gpu_cost_per_hour: f64,
    #[serde(rename = "diskHour", default)]
    disk_hour: f64,
}

#[derive(Debug, Deserialize)]
struct VastOffer {
    machine_id: i64,
    #[serde(default)]
    gpu_name: String,
    #[serde(default)]
    cpu_cores_effective: f64,
    #[serde(default)]
    num_gpus: u32,
    #[serde(default)]
    gpu_ram: u64,
    #[serde(default)]
    cpu_ram: u64,
    #[serde(default)]
    discounted_dph_total: f64,
    #[serde(default)]
    verified: bool,
    #[serde(default)]
    rentable: bool,
    #[serde(default)]
    geolocation: String,
    #[serde(default)]
    reliability: f64,
    /// Expected rental duration, in seconds.
    #[serde(default)]
    duration: f64,
    /// Aggregate compute across all GPUs on the machine, in TFLOPS.
    #[serde(default)]
    total_flops: f64,
    #[serde(default)]
    gpu_mem_bw: f64,
    #[serde(default)]
    cpu_name: String,
    #[serde(default)]
    cpu_ghz: f64,
    #[serde(default)]
    cpu_arch: String,
    #[serde(default)]
    disk_space: f64,
    #[serde(default)]
    disk_bw: f64,
    #[serde(default)]
    disk_name: String,
    #[serde(default)]
    inet_up: f64,
    #[serde(default)]
    inet_down: f64,
    #[serde(default)]
    inet_up_cost: f64,
    #[serde(default)]
    inet_down_cost: f64,
    #[serde(default)]
    search: VastSearch,
}

impl VastCollector {
    pub fn new(limit: usize) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, limit)
    }

    pub fn with_base_url(base_url: impl Into<String>, limit: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            limit,
        }
    }
}

#[async_trait]
impl Collector for VastCollector {
    fn source(&self) -> &'static str {
        "vast"
    }

    fn description(&self) -> &'static str {
        "Vast.ai marketplace search (no credential required)"
    }

    async fn fetch(&self) -> Result<Vec<GpuOffer>, CollectError> {
        let body = json!({ "q": { "limit": self.limit, "rentable": "true" } });
        let resp = self
            .client
            .put(format!("{}/api/v0/search/asks/", self.base_url))
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;
        let resp = error_for_status(resp).await?;
        let search: SearchResponse = resp
            .json()
            .await
            .map_err(|e| CollectError::Decode(e.to_string()))?;

        let offers = search
            .offers
            .into_iter()
            .filter(|o| o.rentable)
            .map(map_offer)
            .collect();
        Ok(offers)
    }
}

fn map_offer(o: VastOffer) -> GpuOffer {
    let url = deep_link(&o);
    GpuOffer {
        id: format!("{}v", o.machine_id),
        source: "vast".to_string(),
        location: o.geolocation,
        reliability: o.reliability,
        duration_hours: o.duration / 3600.0,
        name: o.gpu_name,
        num_gpus: o.num_gpus.max(1),
        vram_mb: o.gpu_ram,
        ram_mb: o.cpu_ram,
        disk_space_gb: o.disk_space,
        disk_bw_gbps: o.disk_bw,
        disk_name: o.disk_name,
        total_flops: o.total_flops * 1e12,
        gpu_mem_bw_gbps: o.gpu_mem_bw,
        cpu_cores: o.cpu_cores_effective,
        cpu_ghz: o.cpu_ghz,
        cpu_name: o.cpu_name,
        cpu_arch: o.cpu_arch,
        upload_mbps: o.inet_up,
        download_mbps: o.inet_down,
        total_cost_ph: o.discounted_dph_total,
        gpu_cost_ph: o.search.gpu_cost_per_hour,
        disk_cost_ph: o.search.disk_hour,
        upload_cost_ph: o.inet_up_cost,
        download_cost_ph: o.inet_down_cost,
        url,
        ..GpuOffer::default()
    }
}

/// Build a console deep link that re-finds this exact offer: same model,
/// with narrow reliability and price windows around the observed values.
fn deep_link(o: &VastOffer) -> String {
    let params = format!(
        "gpuModelNames={}&\
         instanceType=onDemand&\
         isOfferAvailable=true&\
         isOfferCompatible=true&\
         isOfferVerified={}&\
         machineCpuCoresMin={:.1}&\
         machineCpuRamMin=8000&\
         instanceDiskSizeMin={:.1}&\
         machineReliabilityMin={:.2}&\
         machineReliabilityMax={:.2}&\
         isHostSecure=false&\
         isMachineIpStatic=false&\
         isAvxSupported=false&\
         isQueryInverted=false&\
         instanceDurationMin=0&\
         machineMegabitDownloadMin=0&\
         machineMegabitUploadMin=0&\
         machineCpuCoresMax=512&\
         machineCpuRamMax=8000000&\
         isOfferCompatible=false&\
         instanceDiskSizeMin=32&\
         sorts=priceInstanceHourly-asc&\
         priceInstanceHourlyMax={:.4}&\
         priceInstanceHourlyMin={:.4}&\
         pageSize=256",
        gpu_url_name(&o.gpu_name),
        o.verified,
        (o.cpu_cores_effective - 0.1).max(0.0),
        (o.disk_space - 0.1).max(0.0),
        (o.reliability - 0.01).max(0.0),
        (o.reliability + 0.01).max(0.0),
        o.discounted_dph_total + 0.01,
        o.discounted_dph_total - 0.01,
    );
    format!("https://cloud.vast.ai/create/?{params}")
}

/// Convert an API model name into the console's camelCase URL token.
/// "RTX 4090" -> "rtx4090", "RTX 4090 D" -> "rtx4090D", "H200 NVL" -> "h200Nvl".
fn gpu_url_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let mut parts: Vec<String> = lower.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() {
        return String::new();
    }

    // The console spells suffixed RTX models with a separate token, so
    // "4090ti" and "4080s" get split before casing. Only digits qualify;
    // this must not fire for workstation names like "l40s".
    if parts.len() > 1 && parts[0] == "rtx" {
        let second = parts[1].clone();
        if let Some(stem) = second.strip_suffix("ti") {
            if !stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit()) {
                parts[1] = stem.to_string();
                parts.push("ti".to_string());
            }
        } else if let Some(stem) = second.strip_suffix('s') {
            if !stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit()) {
                parts[1] = stem.to_string();
                parts.push("s".to_string());
            }
        }
    }

    let mut out = parts[0].clone();
    for part in &parts[1..] {
        match part.as_str() {
            "ti" => out.push_str("Ti"),
            "s" | "super" => out.push_str("Super"),
            "nvl" => out.push_str("Nvl"),
            "sxm" => out.push_str("Sxm"),
            "ada" => out.push_str("Ada"),
            "generation" => out.push_str("Generation"),
            "blackwell" => out.push_str("Blackwell"),
            "workstation" => out.push_str("Workstation"),
            "laptop" => out.push_str("Laptop"),
            "d" => out.push('D'),
            other => {
                let mut chars = other.chars();
                if let Some(first) = chars.next() {
                    out.extend(first.to_uppercase());
                    out.push_str(chars.as_str());
                }
            }
        }
    }

    let out = out.replacen("rtxa", "rtxA", 1);
    out.replacen("rtxpro", "rtxPro", 1)
}
