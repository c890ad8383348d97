//! HTTP read API for the offer catalog.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/gpus` | List offers with filters, sort, and pagination |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `/gpus` accepts `source`, `location`, `max_price`,
//! `min_flops_per_dollar`, `sort` (`column.direction`), `limit`, `offset`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "store_error", "message": "catalog API returned 503" } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser dashboards
//! can query the catalog directly.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use crate::config::Config;
use crate::models::{GpuOffer, OfferQuery};
use crate::store::{CatalogStore, StoreError};

/// Shared application state passed to route handlers via Axum's `State`.
#[derive(Clone)]
struct AppState {
    store: Arc<dyn CatalogStore>,
}

/// Starts the catalog read server.
///
/// Binds to `[server].bind` and serves until the process is terminated.
pub async fn run_server(config: &Config, store: Arc<dyn CatalogStore>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(store);

    println!("catalog server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(store: Arc<dyn CatalogStore>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/gpus", get(handle_list_gpus))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { store })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        error!(error = %err, "catalog read failed");
        let status = match &err {
            StoreError::MissingKey { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        };
        AppError {
            status,
            code: "store_error".to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /gpus ============

/// Query parameters for `GET /gpus`.
#[derive(Debug, Default, Deserialize)]
struct GpusParams {
    source: Option<String>,
    location: Option<String>,
    max_price: Option<f64>,
    min_flops_per_dollar: Option<f64>,
    /// `column.direction`, e.g. `score.desc`.
    sort: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl GpusParams {
    fn into_query(self) -> OfferQuery {
        let mut query = OfferQuery {
            source: self.source,
            location: self.location,
            max_price: self.max_price,
            min_flops_per_dollar: self.min_flops_per_dollar,
            ..OfferQuery::default()
        };
        if let Some(sort) = &self.sort {
            query = query.with_sort(sort);
        }
        if let Some(limit) = self.limit {
            query.limit = limit;
        }
        if let Some(offset) = self.offset {
            query.offset = offset;
        }
        query
    }
}

async fn handle_list_gpus(
    State(state): State<AppState>,
    Query(params): Query<GpusParams>,
) -> Result<Json<Vec<GpuOffer>>, AppError> {
    let offers = state.store.fetch_offers(&params.into_query()).await?;
    Ok(Json(offers))
}
