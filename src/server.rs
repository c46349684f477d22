use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::registry::RegistryError;
use crate::service::{
    AnalyzeResponse, AstResponse, ExecuteResponse, Service, ServiceConfig, SymbolTableResponse,
};

/// Settings for `minima serve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub sweep_interval: Duration,
    pub service: ServiceConfig,
}

type SharedService = Arc<Service>;

#[derive(Debug, Deserialize)]
struct CodeRequest {
    #[serde(default)]
    code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteRequest {
    code: Option<String>,
    execution_id: Option<String>,
    user_input: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolTableRequest {
    #[serde(default)]
    code: String,
    #[serde(default)]
    include_builtins: bool,
}

/// `{success: false, error}` with a non-200 status.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(error: RegistryError) -> Self {
        let status = match error {
            RegistryError::NotFound { .. } | RegistryError::Poisoned { .. } => {
                StatusCode::NOT_FOUND
            }
            RegistryError::Busy { .. } => StatusCode::CONFLICT,
        };
        Self::new(status, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ExecuteResponse::failure(self.message))).into_response()
    }
}

/// Runs CPU-bound request work off the async workers.
async fn blocking<T: Send + 'static>(
    work: impl FnOnce() -> T + Send + 'static,
) -> Result<T, ApiError> {
    tokio::task::spawn_blocking(work).await.map_err(|join_error| {
        error!(%join_error, "request worker panicked");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal error while handling the request")
    })
}

pub fn router(service: SharedService) -> Router {
    Router::new()
        .route("/analyzeFull", post(analyze_full))
        .route("/executeCode", post(execute_code))
        .route("/getAST", post(get_ast))
        .route("/getSymbolTable", post(get_symbol_table))
        .route("/api/builtin-functions", get(builtin_functions))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn analyze_full(
    State(service): State<SharedService>,
    Json(request): Json<CodeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let response = blocking(move || service.analyze(&request.code)).await?;
    Ok(Json(response))
}

async fn execute_code(
    State(service): State<SharedService>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let response = match request {
        ExecuteRequest {
            execution_id: Some(id),
            user_input,
            ..
        } => {
            let input = user_input.unwrap_or_default();
            blocking(move || service.resume(&id, &input)).await??
        }
        ExecuteRequest {
            code: Some(code), ..
        } => blocking(move || service.execute(&code)).await?,
        _ => {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "Request must carry either 'code' or 'executionId'",
            ));
        }
    };
    Ok(Json(response))
}

async fn get_ast(
    State(service): State<SharedService>,
    Json(request): Json<CodeRequest>,
) -> Result<Json<AstResponse>, ApiError> {
    let response = blocking(move || service.ast(&request.code)).await?;
    Ok(Json(response))
}

async fn get_symbol_table(
    State(service): State<SharedService>,
    Json(request): Json<SymbolTableRequest>,
) -> Result<Json<SymbolTableResponse>, ApiError> {
    let response =
        blocking(move || service.symbol_table(&request.code, request.include_builtins)).await?;
    Ok(Json(response))
}

async fn builtin_functions(State(service): State<SharedService>) -> Json<Vec<&'static str>> {
    Json(service.builtin_functions())
}

/// Periodically expires abandoned executions until the process stops.
async fn sweep_registry(service: SharedService, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        let removed = service.registry().sweep();
        if removed > 0 {
            info!(removed, "expired idle executions");
        }
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}

pub async fn serve(config: ServerConfig) -> Result<()> {
    let service = Arc::new(Service::new(config.service));
    let sweeper = tokio::spawn(sweep_registry(Arc::clone(&service), config.sweep_interval));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!(
        address = %listener.local_addr().context("listener has no local address")?,
        max_steps = config.service.max_steps,
        execution_ttl = ?config.service.execution_ttl,
        "minima service listening"
    );

    let result = axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed");
    sweeper.abort();
    result
}
