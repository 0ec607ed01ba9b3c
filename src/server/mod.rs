//! HTTP daemon/server mode for `stockroom`.
//!
//! This module exposes a small HTTP+JSON API that mirrors the engine
//! entry points:
//!
//! - `POST /v1/search` – accepts a `LookupRequest` and returns the
//!   `LookupResult` produced by `run_lookup` unchanged.
//! - `POST /v1/items` – bulk item creation, returns a `BatchSummary`.
//! - `POST /v1/stores` – bulk store creation, returns a `BatchSummary`.
//! - `POST /v1/sales` – records a sale with its lines.
//! - `POST /v1/store/info` – accepts a `StoreConfig` and returns a
//!   `StoreSummary`.
//! - `GET /v1/health` – simple health check endpoint.
//!
//! Engine calls are synchronous; handlers run them on the blocking
//! thread pool.

use std::net::SocketAddr;

use anyhow::Result;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::models::{
    BatchSummary, CreateItemsRequest, CreateStoresRequest, Item, LookupRequest, LookupResult,
    RecordSaleRequest, SaleReceipt, Store, StoreConfig, StoreSummary,
};
use crate::service::{engine, ServiceError, ServiceResult};

/// Simple health-check response payload.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// JSON error body returned by the API.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Error type used by HTTP handlers to map service failures into
/// JSON error responses.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else if err.is_not_found() {
            StatusCode::NOT_FOUND
        } else if matches!(err, ServiceError::PostAction { .. }) {
            StatusCode::CONFLICT
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        // `{:#}` keeps the anyhow context chain in the message.
        let message = match &err {
            ServiceError::Backend(inner) => format!("{inner:#}"),
            other => other.to_string(),
        };
        if status.is_server_error() {
            error!(%message, "request failed");
        }

        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Build the Axum router for the stockroom HTTP API.
pub fn router() -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/search", post(search))
        .route("/v1/items", post(create_items))
        .route("/v1/stores", post(create_stores))
        .route("/v1/sales", post(record_sale))
        .route("/v1/store/info", post(store_info))
}

/// Run the HTTP server bound to the provided socket address.
///
/// This is used by the CLI `stockroom serve` subcommand.
pub async fn run(addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_with_listener(listener).await
}

/// Run the HTTP server using an existing `TcpListener`.
///
/// This is primarily used in tests to bind to an ephemeral port.
pub async fn serve_with_listener(listener: TcpListener) -> Result<()> {
    info!(addr = %listener.local_addr()?, "stockroom server listening");
    let app = router();
    axum::serve(listener, app).await?;
    Ok(())
}

async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> ServiceResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ApiError::internal(format!("worker task failed: {err}")))?
        .map_err(ApiError::from)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn search(Json(request): Json<LookupRequest>) -> Result<Json<LookupResult>, ApiError> {
    let result = blocking(move || engine::run_lookup(request)).await?;
    Ok(Json(result))
}

async fn create_items(
    Json(request): Json<CreateItemsRequest>,
) -> Result<Json<BatchSummary<Item>>, ApiError> {
    let summary = blocking(move || engine::run_create_items(request)).await?;
    Ok(Json(summary))
}

async fn create_stores(
    Json(request): Json<CreateStoresRequest>,
) -> Result<Json<BatchSummary<Store>>, ApiError> {
    let summary = blocking(move || engine::run_create_stores(request)).await?;
    Ok(Json(summary))
}

async fn record_sale(
    Json(request): Json<RecordSaleRequest>,
) -> Result<Json<SaleReceipt>, ApiError> {
    let receipt = blocking(move || engine::run_record_sale(request)).await?;
    Ok(Json(receipt))
}

async fn store_info(Json(config): Json<StoreConfig>) -> Result<Json<StoreSummary>, ApiError> {
    let summary = blocking(move || engine::get_store_info(&config)).await?;
    Ok(Json(summary))
}
