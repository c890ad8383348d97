//! Hardware spec resolver.
//!
//! Maps free-text GPU model names, as reported by marketplace vendors, to
//! published (or best-estimate) peak compute and memory bandwidth figures.
//! Vendors spell the same card a dozen ways (`"RTX 4090"`, `"rtx4090"`,
//! `"geforcertx4090-pcie-24gb"`), so matching is substring-based over a
//! normalized form of the name.
//!
//! The knowledge base is a static, hand-curated, *ordered* rule list
//! evaluated first-match-wins. Ordering follows a most-specific-first
//! discipline: `"3080 ti"` is checked before `"3080"`, `"l40s"` before
//! `"l40"` before `"l4"`, and the professional A-series (`"a4000"`, ...)
//! before the data-center `"a40"`/`"a10"` whose tags they contain. Memory
//! topology and capacity qualifiers (`"sxm"`, `"80gb"`) are secondary
//! predicates layered onto a primary model match.
//!
//! Resolution is total: every input, including the empty string, returns a
//! defined result. Unknown names yield `(0.0, 0.0)`, which callers must
//! treat as "unknown", not "zero performance" (guard divisions).

/// Resolved hardware figures for one GPU model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuSpecs {
    /// Peak per-GPU compute throughput, absolute FLOPS.
    pub flops: f64,
    /// Per-GPU memory bandwidth, GB/s.
    pub mem_bw_gbps: f64,
    /// Canonical model name, `"unknown"` when unresolved.
    pub canonical_name: &'static str,
}

impl GpuSpecs {
    /// True when the name did not match any rule.
    pub fn is_unknown(&self) -> bool {
        self.flops == 0.0 && self.mem_bw_gbps == 0.0
    }
}

/// One entry of the knowledge base.
///
/// `must` is a conjunction of any-of substring groups: the rule matches when
/// every group has at least one member present in the normalized name. This
/// keeps nested qualifiers ("a100" + "sxm" + "80gb") as plain data rather
/// than branching code.
struct Rule {
    must: &'static [&'static [&'static str]],
    flops: f64,
    mem_bw_gbps: f64,
    name: &'static str,
}

#[rustfmt::skip]
static RULES: &[Rule] = &[
    // GeForce consumer (Blackwell / Ada / Ampere)
    Rule { must: &[&["5090"]], flops: 104.8e12, mem_bw_gbps: 1792.0, name: "RTX 5090" },
    Rule { must: &[&["5080"]], flops: 56.3e12, mem_bw_gbps: 960.0, name: "RTX 5080" },
    Rule { must: &[&["4090"]], flops: 82.6e12, mem_bw_gbps: 1008.0, name: "RTX 4090" },
    Rule { must: &[&["4080"]], flops: 48.7e12, mem_bw_gbps: 716.8, name: "RTX 4080" },
    Rule { must: &[&["4070"]], flops: 29.1e12, mem_bw_gbps: 504.0, name: "RTX 4070" },
    Rule { must: &[&["3090"]], flops: 35.6e12, mem_bw_gbps: 936.0, name: "RTX 3090" },
    Rule { must: &[&["3080 ti", "3080ti"]], flops: 34.1e12, mem_bw_gbps: 912.0, name: "RTX 3080 Ti" },
    // 10 GB model; providers usually list this one.
    Rule { must: &[&["3080"]], flops: 29.8e12, mem_bw_gbps: 760.0, name: "RTX 3080" },
    Rule { must: &[&["3070"]], flops: 20.3e12, mem_bw_gbps: 448.0, name: "RTX 3070" },

    // A100 (Ampere data center): bandwidth depends on form factor and capacity.
    Rule { must: &[&["a100"], &["sxm"], &["80gb", "80g", " 80 "]], flops: 19.5e12, mem_bw_gbps: 2039.0, name: "A100 SXM4 80GB" },
    Rule { must: &[&["a100"], &["sxm"], &["40gb", "40g", " 40 "]], flops: 19.5e12, mem_bw_gbps: 1555.0, name: "A100 SXM4 40GB" },
    Rule { must: &[&["a100"], &["80gb", "80g", " 80 "]], flops: 19.5e12, mem_bw_gbps: 1935.0, name: "A100 PCIe 80GB" },
    Rule { must: &[&["a100"], &["40gb", "40g", " 40 "]], flops: 19.5e12, mem_bw_gbps: 1555.0, name: "A100 PCIe 40GB" },
    // Unknown capacity: assume PCIe 80GB.
    Rule { must: &[&["a100"]], flops: 19.5e12, mem_bw_gbps: 1935.0, name: "A100" },

    // H100 (Hopper). NVL behaves like PCIe per GPU (two bridged PCIe cards).
    Rule { must: &[&["h100"], &["sxm"]], flops: 67.0e12, mem_bw_gbps: 3350.0, name: "H100 SXM" },
    Rule { must: &[&["h100"]], flops: 51.0e12, mem_bw_gbps: 2000.0, name: "H100 PCIe" },
    Rule { must: &[&["h200"]], flops: 67.0e12, mem_bw_gbps: 4800.0, name: "H200" },

    // Blackwell data center. "gb200" contains "b200", so it must come first.
    Rule { must: &[&["gb200"]], flops: 5760.0e12, mem_bw_gbps: 8000.0, name: "GB200" },
    Rule { must: &[&["b200"]], flops: 2200.0e12, mem_bw_gbps: 8000.0, name: "B200" },

    // L40 family (Ada data center / pro). l40s ⊃ l40 ⊃ l4.
    Rule { must: &[&["l40s"]], flops: 91.6e12, mem_bw_gbps: 864.0, name: "L40S" },
    Rule { must: &[&["l40"]], flops: 90.5e12, mem_bw_gbps: 864.0, name: "L40" },

    // Professional / workstation (RTX A-series and Ada Pro). These precede
    // the A10/A30/A40 rules because "a4000" et al. contain those tags.
    Rule { must: &[&["rtx a6000", "rtxa6000", "a6000", "6000ada"]], flops: 38.7e12, mem_bw_gbps: 768.0, name: "RTX A6000" },
    Rule { must: &[&["6000 ada", "pro 6000", "pro6000"]], flops: 91.1e12, mem_bw_gbps: 960.0, name: "RTX 6000 Ada" },
    Rule { must: &[&["rtx a5000", "rtxa5000", "a5000", "5000 ada", "5000ada"], &["ada"]], flops: 65.3e12, mem_bw_gbps: 640.0, name: "RTX 5000 Ada" },
    Rule { must: &[&["rtx a5000", "rtxa5000", "a5000"]], flops: 27.8e12, mem_bw_gbps: 768.0, name: "RTX A5000" },
    Rule { must: &[&["rtx a4500", "rtxa4500", "a4500"]], flops: 23.7e12, mem_bw_gbps: 640.0, name: "RTX A4500" },
    Rule { must: &[&["rtx a4000", "rtxa4000", "a4000"]], flops: 19.2e12, mem_bw_gbps: 448.0, name: "RTX A4000" },
    Rule { must: &[&["rtx a2000", "rtxa2000", "a2000"]], flops: 8.0e12, mem_bw_gbps: 288.0, name: "RTX A2000" },
    Rule { must: &[&["4000 ada"]], flops: 26.7e12, mem_bw_gbps: 360.0, name: "RTX 4000 Ada" },
    Rule { must: &[&["2000 ada"]], flops: 12.0e12, mem_bw_gbps: 288.0, name: "RTX 2000 Ada" },

    // Ampere data center midrange. After A100 and the A-series pro cards
    // whose names contain these tags.
    Rule { must: &[&["a30"]], flops: 10.3e12, mem_bw_gbps: 933.0, name: "A30" },
    Rule { must: &[&["a40"]], flops: 37.4e12, mem_bw_gbps: 696.0, name: "A40" },
    Rule { must: &[&["a10"]], flops: 31.2e12, mem_bw_gbps: 600.0, name: "A10" },

    // Tesla / older data center.
    Rule { must: &[&["v100"], &["32gb", "32g"]], flops: 15.7e12, mem_bw_gbps: 900.0, name: "V100 32GB" },
    Rule { must: &[&["v100"]], flops: 14.0e12, mem_bw_gbps: 900.0, name: "V100" },
    Rule { must: &[&["t4"]], flops: 8.1e12, mem_bw_gbps: 300.0, name: "T4" },

    // AMD Instinct.
    Rule { must: &[&["mi300x"]], flops: 163.4e12, mem_bw_gbps: 5300.0, name: "MI300X" },
    Rule { must: &[&["mi250x"]], flops: 95.7e12, mem_bw_gbps: 3200.0, name: "MI250X" },
    Rule { must: &[&["mi250"]], flops: 90.5e12, mem_bw_gbps: 3200.0, name: "MI250" },

    // L4 last in its family: "l4" is a substring of "l40"/"l40s".
    Rule { must: &[&["l4"]], flops: 30.3e12, mem_bw_gbps: 300.0, name: "L4" },
];

/// Lowercase the name and collapse `_`/`-` separators and parentheses to
/// spaces so that `"h100-sxm5-80gb"`, `"H100 SXM5 80GB"` and
/// `"H100 (80 GB)"` normalize comparably.
fn normalize(name: &str) -> String {
    name.to_lowercase().replace(['_', '-', '(', ')'], " ")
}

/// Resolve a vendor's free-text GPU name to hardware figures.
///
/// Total and deterministic: never fails, unknown names return zeros with
/// canonical name `"unknown"`.
pub fn resolve(name: &str) -> GpuSpecs {
    let n = normalize(name);
    for rule in RULES {
        let matched = rule
            .must
            .iter()
            .all(|group| group.iter().any(|needle| n.contains(needle)));
        if matched {
            return GpuSpecs {
                flops: rule.flops,
                mem_bw_gbps: rule.mem_bw_gbps,
                canonical_name: rule.name,
            };
        }
    }
    GpuSpecs {
        flops: 0.0,
        mem_bw_gbps: 0.0,
        canonical_name: "unknown",
    }
}

/// Parse a VRAM capacity out of a model name carrying a `<n>gb` token
/// (e.g. `"h100-sxm5-80gb"` → `81920`). Returns MB, 0 when absent.
pub fn parse_vram_mb(name: &str) -> u64 {
    let n = normalize(name);
    let bytes = n.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let rest = n[i..].trim_start();
            if rest.starts_with("gb") {
                if let Ok(gb) = n[start..i].parse::<u64>() {
                    return gb * 1024;
                }
            }
        } else {
            i += 1;
        }
    }
    0
}
