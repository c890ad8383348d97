//! CLI read commands: offer listing and source status.

use anyhow::Result;

use crate::collector::CollectorRegistry;
use crate::config::Config;
use crate::models::OfferQuery;
use crate::store::CatalogStore;

/// Print offers matching a query as an aligned table.
pub async fn list_offers(store: &dyn CatalogStore, query: &OfferQuery) -> Result<()> {
    let offers = store.fetch_offers(query).await?;
    if offers.is_empty() {
        println!("no offers match");
        return Ok(());
    }

    println!(
        "{:<12} {:<22} {:>5} {:>9} {:>10} {:>7} {:<20}",
        "SOURCE", "GPU", "COUNT", "VRAM", "$/H", "SCORE", "LOCATION"
    );
    for o in &offers {
        println!(
            "{:<12} {:<22} {:>5} {:>7}GB {:>10.4} {:>7.1} {:<20}",
            o.source,
            truncate(&o.name, 22),
            o.num_gpus,
            o.vram_mb / 1024,
            o.total_cost_ph,
            o.score,
            truncate(&o.location, 20),
        );
    }
    println!("{} offers", offers.len());
    Ok(())
}

/// Print every managed source with its configuration status.
pub fn list_sources(config: &Config) {
    let registry = CollectorRegistry::from_config(config);
    println!("{:<12} {:<10} DESCRIPTION", "SOURCE", "ENABLED");
    for collector in registry.collectors() {
        println!(
            "{:<12} {:<10} {}",
            collector.source(),
            "yes",
            collector.description()
        );
    }
    for (name, vendor) in [
        ("vast", &config.collectors.vast),
        ("tensordock", &config.collectors.tensordock),
        ("runpod", &config.collectors.runpod),
        ("lambda", &config.collectors.lambda),
    ] {
        if !vendor.enabled {
            println!("{:<12} {:<10} (disabled in config)", name, "no");
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}
