//! # GPU Scout
//!
//! An aggregation pipeline for GPU cloud-rental offers.
//!
//! GPU Scout polls several rental marketplaces (Vast.ai, TensorDock,
//! RunPod, Lambda Labs), normalizes their wildly different wire formats
//! into one offer schema, resolves free-text hardware names into compute
//! figures, scores every offer for capability and cost efficiency, and
//! keeps a hosted catalog in sync with a per-source replace.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌───────────┐
//! │  Collectors  │──▶│ Resolve +   │──▶│  Catalog  │
//! │ vast/td/rp/ll│   │ Score       │   │ PostgREST │
//! └──────────────┘   └─────────────┘   └─────┬─────┘
//!                                            │
//!                        ┌───────────────────┤
//!                        ▼                   ▼
//!                   ┌──────────┐       ┌──────────┐
//!                   │   CLI    │       │   HTTP   │
//!                   │ (scout)  │       │  /gpus   │
//!                   └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! scout scan                        # collect, score, and sync all sources
//! scout scan --source vast --dry-run
//! scout offers --max-price 1.0 --sort score.desc
//! scout sources                     # list collectors and their status
//! scout serve                       # start the catalog read API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Offer schema and query types |
//! | [`specs`] | Free-text GPU name → hardware figures |
//! | [`score`] | Capability score and cost-efficiency metrics |
//! | [`collector`] | Collector trait, error taxonomy, registry |
//! | [`store`] | Catalog backends (PostgREST, in-memory) |
//! | [`sync`] | One collection cycle |
//! | [`server`] | HTTP read API |

pub mod collector;
pub mod collector_lambda;
pub mod collector_runpod;
pub mod collector_tensordock;
pub mod collector_vast;
pub mod config;
pub mod models;
pub mod query;
pub mod score;
pub mod server;
pub mod specs;
pub mod store;
pub mod sync;
