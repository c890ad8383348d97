//! # GPU Scout CLI (`scout`)
//!
//! The `scout` binary drives the offer aggregation pipeline: collecting
//! offers from the configured marketplaces, syncing them into the hosted
//! catalog, querying the catalog, and serving the read API.
//!
//! ## Usage
//!
//! ```bash
//! scout --config ./config/scout.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scout scan` | Run one collection cycle across all configured sources |
//! | `scout offers` | List catalog offers with filters and sorting |
//! | `scout sources` | List collectors and their configuration status |
//! | `scout serve` | Start the catalog HTTP read API |
//!
//! ## Examples
//!
//! ```bash
//! # Full cycle: collect, score, replace each source in the catalog
//! scout scan --config ./config/scout.toml
//!
//! # Collect one vendor without writing anything
//! scout scan --source vast --dry-run
//!
//! # Best-value offers under a dollar an hour
//! scout offers --max-price 1.0 --sort score_dollar_ph.desc
//!
//! # Start the read API on [server].bind
//! scout serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use tracing_subscriber::EnvFilter;

use gpu_scout::collector::CollectorRegistry;
use gpu_scout::config;
use gpu_scout::models::{OfferQuery, MANAGED_SOURCES};
use gpu_scout::query;
use gpu_scout::server;
use gpu_scout::store::{CatalogStore, RestStore};
use gpu_scout::sync::{self, ScanOptions};

/// GPU Scout CLI: aggregate GPU rental offers from cloud marketplaces
/// into one scored, queryable catalog.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/scout.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "scout",
    about = "Aggregate and score GPU rental offers from cloud marketplaces",
    version,
    long_about = "GPU Scout polls GPU rental marketplaces (Vast.ai, TensorDock, RunPod, \
    Lambda Labs), normalizes their offers into one schema, scores them for capability and \
    cost efficiency, and keeps a hosted catalog in sync with a per-source replace."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/scout.toml`. Store credentials, scan tuning,
    /// and per-vendor API keys are read from this file, with environment
    /// variable fallbacks for every credential.
    #[arg(long, global = true, default_value = "./config/scout.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Run one collection cycle.
    ///
    /// Fetches every configured source concurrently, resolves hardware
    /// specs, computes scores, and replaces each source's rows in the
    /// catalog. Sources that fail to collect keep their previous rows.
    Scan {
        /// Only scan one source (vast, tensordock, runpod, lambda).
        #[arg(long)]
        source: Option<String>,

        /// Collect and score but do not write to the catalog.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of offers to keep per source.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List offers from the catalog.
    ///
    /// Prints an aligned table of offers matching the given filters,
    /// sorted by the requested column.
    Offers {
        /// Filter to one source (exact match).
        #[arg(long)]
        source: Option<String>,

        /// Filter by location substring (case-insensitive).
        #[arg(long)]
        location: Option<String>,

        /// Only offers strictly cheaper than this (USD per hour).
        #[arg(long)]
        max_price: Option<f64>,

        /// Only offers with at least this many FLOPS per dollar-hour.
        #[arg(long)]
        min_flops_per_dollar: Option<f64>,

        /// Sort spec as `column.direction`, e.g. `score.desc`,
        /// `total_cost_ph.asc`. Defaults to `updated_at.desc`.
        #[arg(long)]
        sort: Option<String>,

        /// Maximum number of offers to return.
        #[arg(long, default_value_t = 50)]
        limit: i64,

        /// Number of offers to skip (for paging).
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },

    /// List collectors and their configuration status.
    Sources,

    /// Start the catalog HTTP read API.
    ///
    /// Binds to the address configured in `[server].bind` and serves
    /// `GET /gpus` and `GET /health`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Scan {
            source,
            dry_run,
            limit,
        } => {
            let mut registry = CollectorRegistry::from_config(&cfg);
            if let Some(source) = &source {
                registry.retain_source(source);
                if registry.is_empty() {
                    bail!(
                        "unknown or disabled source: '{}'. Available: {}",
                        source,
                        MANAGED_SOURCES.join(", ")
                    );
                }
            }

            let store: Arc<dyn CatalogStore> = Arc::new(RestStore::from_config(&cfg.store)?);
            let opts = ScanOptions { dry_run, limit };
            let report =
                sync::run_scan(&cfg.scan, registry.into_collectors(), store, &opts).await;
            sync::print_report(&report);
            if !report.fully_completed() {
                std::process::exit(1);
            }
        }
        Commands::Offers {
            source,
            location,
            max_price,
            min_flops_per_dollar,
            sort,
            limit,
            offset,
        } => {
            let mut q = OfferQuery {
                source,
                location,
                max_price,
                min_flops_per_dollar,
                limit,
                offset,
                ..OfferQuery::default()
            };
            if let Some(sort) = &sort {
                q = q.with_sort(sort);
            }
            let store = RestStore::from_config(&cfg.store)?;
            query::list_offers(&store, &q).await?;
        }
        Commands::Sources => {
            query::list_sources(&cfg);
        }
        Commands::Serve => {
            let store: Arc<dyn CatalogStore> = Arc::new(RestStore::from_config(&cfg.store)?);
            server::run_server(&cfg, store).await?;
        }
    }

    Ok(())
}
