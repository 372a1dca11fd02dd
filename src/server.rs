//! HTTP surface consumed by the frontend
//!
//! Exposes the cached list resources and transaction creation under `/api`,
//! and serves the static frontend for every other path.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tower_http::{
    catch_panic::CatchPanicLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer,
};

use crate::cache::{CacheEntries, ConfigStore};
use crate::firefly::client::{MALFORMED_MESSAGE, TRANSPORT_MESSAGE};
use crate::firefly::{build_transaction_payload, Upstream, UpstreamError, ValidationError};
use crate::resources::{Resource, ResourceCache};

/// Account type listed when the frontend does not ask for one
pub const DEFAULT_ACCOUNT_TYPE: &str = "asset";

/// Message returned for failures that are not the caller's business
pub const INTERNAL_ERROR_MESSAGE: &str = "An unexpected error occurred. Please try again later.";

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub resources: ResourceCache,
    pub upstream: Arc<dyn Upstream>,
}

impl AppState {
    pub fn new(store: Arc<ConfigStore>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            resources: ResourceCache::new(CacheEntries::new(store), upstream.clone()),
            upstream,
        }
    }
}

/// Errors returned by API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Upstream(UpstreamError::Configuration(err)) => {
                tracing::warn!(error = %err, "firefly connection not configured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "configuration_error",
                        "message": err.to_string(),
                    })),
                )
                    .into_response()
            }
            ApiError::Upstream(UpstreamError::Transport { details }) => {
                tracing::warn!(%details, "firefly unreachable");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "message": TRANSPORT_MESSAGE, "details": details })),
                )
                    .into_response()
            }
            ApiError::Upstream(UpstreamError::Status { status, body }) => {
                (status, Json(body)).into_response()
            }
            ApiError::Upstream(UpstreamError::Malformed) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "message": MALFORMED_MESSAGE })),
            )
                .into_response(),
            ApiError::Validation(err) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": err.to_string() })),
            )
                .into_response(),
        }
    }
}

/// Routes mounted under `/api`
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/accounts", get(accounts))
        .route("/budgets", get(budgets))
        .route("/categories", get(categories))
        .route("/tags", get(tags))
        .route("/transactions", post(create_transaction))
}

/// The full application: API, static frontend and middleware
pub fn app(state: AppState, frontend_dir: Option<&Path>) -> Router {
    let mut router = Router::new().nest("/api", api_router());
    if let Some(dir) = frontend_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the application until Ctrl-C
pub async fn run_server(bind_addr: &str, app: Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(%detail, "unhandled error while serving request");

    internal_error_response()
}

/// Generic 500 response that hides internal details
pub fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "internal_error",
            "message": INTERNAL_ERROR_MESSAGE,
        })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct AccountsQuery {
    #[serde(rename = "type")]
    account_type: Option<String>,
}

/// Handler for GET /api/accounts
async fn accounts(
    State(state): State<AppState>,
    Query(query): Query<AccountsQuery>,
) -> Result<Json<Value>, ApiError> {
    let account_type = query
        .account_type
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_ACCOUNT_TYPE.to_string());

    let accounts = state
        .resources
        .fetch(Resource::Accounts, &[("type", Some(account_type.as_str()))])
        .await?;
    Ok(Json(accounts))
}

/// Handler for GET /api/budgets
async fn budgets(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.resources.fetch(Resource::Budgets, &[]).await?))
}

/// Handler for GET /api/categories
async fn categories(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.resources.fetch(Resource::Categories, &[]).await?))
}

/// Handler for GET /api/tags
async fn tags(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.resources.fetch(Resource::Tags, &[]).await?))
}

/// Handler for POST /api/transactions
///
/// Not cached. Validation failures never reach Firefly III.
async fn create_transaction(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let form: Value =
        serde_json::from_slice(&body).map_err(|_| ValidationError::MissingPayload)?;
    let payload = build_transaction_payload(&form)?;

    let created = state
        .upstream
        .request(Method::POST, "transactions", &[], Some(&payload))
        .await?;
    Ok(Json(created))
}
