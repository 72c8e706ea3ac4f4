use super::*;

pub(super) async fn index_handler(
    State(state): State<PublisherState>,
    Path(endpoint_id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response<Body> {
    let body = match body {
        Ok(bytes) => bytes,
        Err(rejection) => {
            let status = rejection.status();
            if status == StatusCode::PAYLOAD_TOO_LARGE {
                state
                    .metrics
                    .payload_too_large_total
                    .fetch_add(1, Ordering::Relaxed);
            }
            warn!("failed reading body for endpoint={endpoint_id}: {rejection}");
            return body_rejection_response(status, state.config.max_body_bytes).into_response();
        }
    };

    let inbound = InboundRequest {
        method,
        headers,
        query: uri.query().map(str::to_string),
        body,
    };
    let outcome = state.dispatcher.handle(&endpoint_id, &inbound).await;
    outcome_response(outcome, state.config.response_mode)
}

pub(super) async fn index_default_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub(super) async fn specification_handler(State(state): State<PublisherState>) -> Response<Body> {
    state
        .metrics
        .specification_requests_total
        .fetch_add(1, Ordering::Relaxed);

    match generate_specification(
        state.dispatcher.store().as_ref(),
        &state.config.specification,
    )
    .await
    {
        Ok(document) => (StatusCode::OK, Json(document)).into_response(),
        Err(err) => {
            state
                .metrics
                .specification_errors_total
                .fetch_add(1, Ordering::Relaxed);
            error!("{} failed to generate document: {err}", category_openapi());
            internal_error(err.to_string()).into_response()
        }
    }
}

pub(super) async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(StatusResponse { status: "ok" }))
}

pub(super) async fn metrics_handler(State(state): State<PublisherState>) -> Response<Body> {
    let mut response = state.metrics_text().into_response();
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}

pub(super) async fn restart_handler(State(state): State<PublisherState>) -> impl IntoResponse {
    let runtime = state.dispatcher.runtime();
    runtime.restart();
    let stats = runtime.stats();
    info!(
        "{} runtime restarted via admin endpoint restarts_total={}",
        category_runtime(),
        stats.restarts_total
    );
    (StatusCode::OK, Json(stats))
}

pub(super) async fn reload_handler(
    State(state): State<PublisherState>,
) -> Result<Json<ReloadResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.store.reload().await {
        Ok(records) => {
            state
                .metrics
                .store_reload_success_total
                .fetch_add(1, Ordering::Relaxed);
            info!("script store reloaded records={records}");
            Ok(Json(ReloadResponse { records }))
        }
        Err(err) => {
            state
                .metrics
                .store_reload_failure_total
                .fetch_add(1, Ordering::Relaxed);
            warn!("script store reload failed: {err}");
            Err(internal_error(err.to_string()))
        }
    }
}
