use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, Request, State, rejection::BytesRejection},
    http::{HeaderMap, HeaderValue, Method, Response, StatusCode, Uri, header::CONTENT_TYPE},
    middleware::{self, Next},
    response::IntoResponse,
    routing::{any, get, post},
};
use script_host::SharedScriptRuntime;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    arguments::InboundRequest,
    config::{PublisherConfig, ResponseMode},
    dispatcher::{DispatchOutcome, EndpointDispatcher},
    logging::{category_access, category_openapi, category_runtime, method_label, status_label},
    openapi::generate_specification,
    result::ApiResult,
    store::MemoryScriptStore,
};

mod handlers;

use handlers::{
    health_handler, index_default_handler, index_handler, metrics_handler, reload_handler,
    restart_handler, specification_handler,
};

#[derive(Clone)]
pub struct PublisherState {
    dispatcher: EndpointDispatcher,
    store: Arc<MemoryScriptStore>,
    config: Arc<PublisherConfig>,
    metrics: Arc<ServerMetrics>,
}

struct ServerMetrics {
    started_at: Instant,
    specification_requests_total: AtomicU64,
    specification_errors_total: AtomicU64,
    payload_too_large_total: AtomicU64,
    store_reload_success_total: AtomicU64,
    store_reload_failure_total: AtomicU64,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            specification_requests_total: AtomicU64::new(0),
            specification_errors_total: AtomicU64::new(0),
            payload_too_large_total: AtomicU64::new(0),
            store_reload_success_total: AtomicU64::new(0),
            store_reload_failure_total: AtomicU64::new(0),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub records: usize,
}

impl PublisherState {
    pub fn new(
        config: PublisherConfig,
        store: Arc<MemoryScriptStore>,
        runtime: SharedScriptRuntime,
    ) -> Self {
        Self {
            dispatcher: EndpointDispatcher::new(store.clone(), runtime),
            store,
            config: Arc::new(config),
            metrics: Arc::new(ServerMetrics::default()),
        }
    }

    pub fn metrics_text(&self) -> String {
        let dispatch = self.dispatcher.metrics();
        let runtime = self.dispatcher.runtime().stats();

        format!(
            concat!(
                "publisher_uptime_seconds {}\n",
                "publisher_endpoint_requests_total {}\n",
                "publisher_endpoint_not_found_total {}\n",
                "publisher_executions_ok_total {}\n",
                "publisher_executions_error_total {}\n",
                "publisher_dispatch_errors_total {}\n",
                "publisher_specification_requests_total {}\n",
                "publisher_specification_errors_total {}\n",
                "publisher_payload_too_large_total {}\n",
                "publisher_store_reload_success_total {}\n",
                "publisher_store_reload_failure_total {}\n",
                "publisher_runtime_compilations_total {}\n",
                "publisher_runtime_cache_hits_total {}\n",
                "publisher_runtime_cached_scripts {}\n",
                "publisher_runtime_restarts_total {}\n"
            ),
            self.metrics.started_at.elapsed().as_secs(),
            dispatch.requests_total,
            dispatch.not_found_total,
            dispatch.executions_ok_total,
            dispatch.executions_error_total,
            dispatch.dispatch_errors_total,
            self.metrics
                .specification_requests_total
                .load(Ordering::Relaxed),
            self.metrics
                .specification_errors_total
                .load(Ordering::Relaxed),
            self.metrics.payload_too_large_total.load(Ordering::Relaxed),
            self.metrics
                .store_reload_success_total
                .load(Ordering::Relaxed),
            self.metrics
                .store_reload_failure_total
                .load(Ordering::Relaxed),
            runtime.compilations_total,
            runtime.cache_hits_total,
            runtime.cached_scripts,
            runtime.restarts_total,
        )
    }
}

pub fn build_publisher_app(state: PublisherState) -> Router {
    let body_limit = state.config.max_body_bytes;
    Router::new()
        .route("/api/Index", any(index_default_handler))
        .route("/api/Index/", any(index_default_handler))
        .route("/api/Index/{endpoint_id}", any(index_handler))
        .route("/api/Specification", get(specification_handler))
        .route("/healthz", get(health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(access_log_middleware))
        .with_state(state)
}

pub fn build_admin_app(state: PublisherState) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/runtime/restart", post(restart_handler))
        .route("/scripts/reload", post(reload_handler))
        .layer(middleware::from_fn(access_log_middleware))
        .with_state(state)
}

/// Maps a dispatch outcome onto the wire according to `mode`.
fn outcome_response(outcome: DispatchOutcome, mode: ResponseMode) -> Response<Body> {
    match outcome {
        DispatchOutcome::Default => StatusCode::NO_CONTENT.into_response(),
        DispatchOutcome::NotFound => not_found("endpoint not found").into_response(),
        DispatchOutcome::Envelope(result) => envelope_response(result, mode),
    }
}

fn envelope_response(result: ApiResult, mode: ResponseMode) -> Response<Body> {
    match mode {
        ResponseMode::Bare if result.is_success && result.return_data.is_empty() => {
            StatusCode::OK.into_response()
        }
        ResponseMode::Bare if result.is_success => {
            (StatusCode::OK, Json(result.return_data)).into_response()
        }
        _ => (StatusCode::OK, Json(result)).into_response(),
    }
}

fn not_found(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

fn payload_too_large(limit: usize) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        Json(ErrorResponse {
            error: format!("payload too large (limit {limit} bytes)"),
        }),
    )
}

fn bad_request(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

/// Only a body over the configured limit is a 413; any other read failure
/// is the client's malformed request.
fn body_rejection_response(
    status: StatusCode,
    limit: usize,
) -> (StatusCode, Json<ErrorResponse>) {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        payload_too_large(limit)
    } else {
        bad_request("failed to read request body")
    }
}

fn internal_error(message: String) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: message }),
    )
}

async fn access_log_middleware(request: Request, next: Next) -> Response<Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_millis();
    let status = response.status();

    info!(
        "{} {} {} {} {}ms",
        category_access(),
        method_label(method.as_str()),
        status_label(status.as_u16()),
        uri,
        elapsed_ms
    );

    response
}
