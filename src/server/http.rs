use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::{DispatchError, ProviderError};
use crate::metrics::METRICS;
use crate::tts::{TtsError, TtsProxy, TtsRequest};
use crate::types::{ProviderOutput, ProviderRequest, StreamingExecution};
use anyhow::Result;
use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::{convert::Infallible, sync::Arc};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{error, info};

/// HTTP server state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
    pub tts: Arc<TtsProxy>,
}

/// Assemble the application router
pub fn build_router(state: AppState) -> Router {
    let uploads = ServeDir::new(&state.config.storage.upload_dir);
    let serve_prefix = state.config.storage.serve_prefix.clone();

    let mut router = Router::new()
        // Health check
        .route("/health", get(health_handler));

    // Metrics (Prometheus)
    if state.config.metrics.enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        // Provider and model catalog
        .route("/v1/providers", get(providers_handler))
        .route("/v1/models", get(models_handler))
        // Dispatch
        .route("/v1/providers/:id/execute", post(execute_handler))
        // Text-to-speech proxy
        .route("/api/proxy/tts", post(tts_handler))
        // Stored artifacts
        .nest_service(&serve_prefix, uploads)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start HTTP server
pub async fn serve(bind: &str, state: AppState) -> Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("HTTP server listening on {}", bind);

    axum::serve(listener, app).await?;

    Ok(())
}

fn record_request(endpoint: &str, status: StatusCode) {
    METRICS
        .requests_total
        .with_label_values(&[endpoint, status.as_str()])
        .inc();
}

/// Map a dispatch failure to the status returned to the caller
pub fn dispatch_status(err: &DispatchError) -> StatusCode {
    match err {
        DispatchError::ProviderNotFound(_) => StatusCode::NOT_FOUND,
        DispatchError::ExecutorMissing(_) => StatusCode::NOT_IMPLEMENTED,
        DispatchError::Provider(provider_err) => match provider_err {
            ProviderError::MissingCredentials { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ProviderError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ProviderError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ProviderError::Transport(_) | ProviderError::InvalidResponse(_) => {
                StatusCode::BAD_GATEWAY
            }
            ProviderError::EmptyPayload => StatusCode::UNPROCESSABLE_ENTITY,
            ProviderError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        },
    }
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": crate::VERSION,
        "providers": state
            .dispatcher
            .registry()
            .descriptors()
            .map(|d| d.id.clone())
            .collect::<Vec<_>>(),
    }))
}

/// GET /metrics (Prometheus format)
pub async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    METRICS.render().map_err(|e| {
        error!("Failed to render metrics: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

/// GET /v1/providers - List registered providers
pub async fn providers_handler(State(state): State<AppState>) -> Json<Value> {
    let providers: Vec<Value> = state
        .dispatcher
        .registry()
        .descriptors()
        .map(|d| json!(d))
        .collect();

    Json(json!({
        "object": "list",
        "data": providers,
        "count": providers.len(),
    }))
}

/// GET /v1/models
pub async fn models_handler(State(state): State<AppState>) -> Json<Value> {
    let data: Vec<Value> = state
        .dispatcher
        .registry()
        .descriptors()
        .flat_map(|d| {
            d.models.iter().map(move |model| {
                json!({
                    "id": model,
                    "object": "model",
                    "owned_by": d.id,
                    "default": *model == d.default_model,
                })
            })
        })
        .collect();

    Json(json!({
        "object": "list",
        "count": data.len(),
        "data": data,
    }))
}

/// POST /v1/providers/:id/execute
pub async fn execute_handler(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
    Json(request): Json<ProviderRequest>,
) -> Result<Response, (StatusCode, String)> {
    match state.dispatcher.execute(&provider_id, request).await {
        Ok(output) => {
            record_request("execute", StatusCode::OK);
            Ok(match output {
                ProviderOutput::Response(response) => Json(response).into_response(),
                ProviderOutput::Bytes(bytes) => (
                    [(header::CONTENT_TYPE, bytes.content_type)],
                    Body::from_stream(bytes.stream),
                )
                    .into_response(),
                ProviderOutput::Streaming(streaming) => sse_response(streaming).into_response(),
            })
        }
        Err(e) => {
            let status = dispatch_status(&e);
            error!(provider = %provider_id, status = %status, "Dispatch failed: {}", e);
            record_request("execute", status);
            Err((status, e.to_string()))
        }
    }
}

/// Content deltas as SSE `data:` events, then an `execution` event and `[DONE]`
fn sse_response(
    streaming: StreamingExecution,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let StreamingExecution {
        mut stream,
        execution,
    } = streaming;

    let events = async_stream::stream! {
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    let data = json!({ "content": String::from_utf8_lossy(&bytes) });
                    yield Ok::<_, Infallible>(Event::default().data(data.to_string()));
                }
                Err(e) => {
                    error!("Stream error: {}", e);
                    yield Ok::<_, Infallible>(Event::default().event("error").data(e.to_string()));
                    break;
                }
            }
        }

        let duration_ms = (chrono::Utc::now() - execution.started_at).num_milliseconds();
        let mut metadata = serde_json::to_value(&execution).unwrap_or_default();
        metadata["durationMs"] = json!(duration_ms);
        yield Ok::<_, Infallible>(Event::default().event("execution").data(metadata.to_string()));

        yield Ok::<_, Infallible>(Event::default().data("[DONE]"));
    };

    Sse::new(events)
}

/// POST /api/proxy/tts
pub async fn tts_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let result = match serde_json::from_slice::<TtsRequest>(&body) {
        Ok(request) => state.tts.generate(request).await,
        Err(e) => Err(TtsError::Internal(e.into())),
    };

    match result {
        Ok(response) => {
            METRICS.tts_requests_total.with_label_values(&["200"]).inc();
            record_request("tts", StatusCode::OK);
            Json(response).into_response()
        }
        Err(e) => {
            let status = StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if let TtsError::Internal(inner) = &e {
                error!("Error proxying TTS: {:#}", inner);
            }
            METRICS
                .tts_requests_total
                .with_label_values(&[status.as_str()])
                .inc();
            record_request("tts", status);
            (status, e.to_string()).into_response()
        }
    }
}
