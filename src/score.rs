//! Capability scoring.
//!
//! Collapses a heterogeneous offer (any vendor, any GPU count, any vram
//! size) onto a single [0, 100] scale so buyers can compare like with like,
//! plus the cost-efficiency derivatives (`score_dollar_ph`,
//! `flops_per_dollar_ph`).
//!
//! Only hardware capability and stability enter the score: per-GPU compute,
//! memory bandwidth, per-GPU vram, GPU count, reliability, CPU cores, and
//! system RAM. Price never does; cost efficiency is a separate derived
//! metric.

use crate::models::GpuOffer;

// Normalization caps, chosen so current-generation top-tier hardware lands
// near 1.0 (H200/MI300X/GB200 saturate, older cards scale below).
const CAP_PER_GPU_TFLOPS: f64 = 3000.0;
const CAP_MEM_BW_GBPS: f64 = 6000.0;
const CAP_VRAM_GB: f64 = 192.0;
const CAP_NUM_GPUS: f64 = 8.0;
const CAP_CPU_CORES: f64 = 128.0;
const CAP_SYS_RAM_GB: f64 = 2048.0;

// Weights, sum = 1.0. Emphasis on raw GPU capability and scale over host
// resources; reliability is meaningful but not dominant.
const W_GPU_CORE: f64 = 0.30;
const W_VRAM: f64 = 0.18;
const W_NUM: f64 = 0.26;
const W_REL: f64 = 0.12;
const W_CPU: f64 = 0.07;
const W_RAM: f64 = 0.07;

/// Score an offer on the [0, 100] capability scale.
///
/// Each sub-metric is normalized by `clamp(value / cap, 0, 1)`; GPU count
/// uses `sqrt` for diminishing returns (saturating by 8); compute and
/// bandwidth combine via geometric mean to reward balanced configurations,
/// falling back to compute alone when bandwidth is unknown.
pub fn calculate_score(offer: &GpuOffer) -> f64 {
    let num = offer.num_gpus.max(1) as f64;

    // total_flops is node-total; reduce to per-GPU TFLOPS for normalization.
    let per_gpu_tflops = safe_div(offer.total_flops, num) / 1e12;
    let per_gpu_vram_gb = offer.vram_mb as f64 / 1024.0;
    let sys_ram_gb = offer.ram_mb as f64 / 1024.0;

    let n_flops = norm_capped(per_gpu_tflops, CAP_PER_GPU_TFLOPS);
    let n_mem_bw = norm_capped(offer.gpu_mem_bw_gbps, CAP_MEM_BW_GBPS);
    let n_vram = norm_capped(per_gpu_vram_gb, CAP_VRAM_GB);
    let n_cpu = norm_capped(offer.cpu_cores, CAP_CPU_CORES);
    let n_ram = norm_capped(sys_ram_gb, CAP_SYS_RAM_GB);
    let n_num = norm_capped(num.sqrt(), CAP_NUM_GPUS.sqrt());
    let rel = offer.reliability.clamp(0.0, 1.0);

    // Geometric mean rewards balance (neither compute- nor bandwidth-starved).
    let n_gpu_core = if n_mem_bw > 0.0 {
        (n_flops * n_mem_bw).sqrt()
    } else {
        n_flops
    };

    let score01 = W_GPU_CORE * n_gpu_core
        + W_VRAM * n_vram
        + W_NUM * n_num
        + W_REL * rel
        + W_CPU * n_cpu
        + W_RAM * n_ram;

    (score01 * 100.0).clamp(0.0, 100.0)
}

/// Fill in all derived fields of an offer: `score`, `score_dollar_ph`, and
/// `flops_per_dollar_ph`. Zero cost yields zero for the per-dollar metrics
/// (unknown price, not infinite value).
pub fn apply_derived_metrics(offer: &mut GpuOffer) {
    offer.score = calculate_score(offer);
    if offer.total_cost_ph > 0.0 {
        offer.flops_per_dollar_ph = offer.total_flops / offer.total_cost_ph;
        offer.score_dollar_ph = offer.score / offer.total_cost_ph;
    } else {
        offer.flops_per_dollar_ph = 0.0;
        offer.score_dollar_ph = 0.0;
    }
}

fn norm_capped(v: f64, cap: f64) -> f64 {
    if cap <= 0.0 {
        return 0.0;
    }
    (v / cap).clamp(0.0, 1.0)
}

fn safe_div(a: f64, b: f64) -> f64 {
    if b == 0.0 {
        0.0
    } else {
        a / b
    }
}
