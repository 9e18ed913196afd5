//! Purpose: Provide the HTTP/JSON server for cardfile.
//! Exports: `ServeConfig`, `serve`.
//! Role: Axum-based REST API plus the line-delimited update event stream.
//! Invariants: Every successful mutation broadcasts one payload-free update.
//! Invariants: A store failure at startup is fatal; per-request store failures are not.
//! Invariants: Error envelopes expose kind and message only; no stack traces.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path as AxumPath, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Serialize;
use serde_json::json;
use std::future::IntoFuture;
use tokio::time::Duration;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use cardfile::api::{Error, ErrorKind, ItemDraft, ItemService, JsonStore, UpdateBus};

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub store_path: PathBuf,
    pub cors_origins: Vec<String>,
}

struct AppState {
    service: ItemService,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    init_tracing();

    // No data layer, no server: an unreachable store at startup is fatal.
    let store = JsonStore::open(&config.store_path)?;
    tracing::info!(store = %store.path().display(), "store opened");

    let service = ItemService::new(Arc::new(store), UpdateBus::new(64));
    let state = Arc::new(AppState { service });
    let app = router(state, &config.cors_origins)?;

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "listening");
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

fn router(state: Arc<AppState>, cors_origins: &[String]) -> Result<Router, Error> {
    Ok(Router::new()
        .route("/healthz", get(healthz))
        .route("/api/items", get(list_items).post(create_item))
        .route("/api/items/:id", put(update_item).delete(delete_item))
        .route("/api/events", get(subscribe_events).post(emit_update))
        .layer(cors_layer(cors_origins)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if config.store_path.as_os_str().is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("--store must not be empty"));
    }
    // Parse origins up front so a bad flag fails before the store is touched.
    cors_layer(&config.cors_origins)?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer, Error> {
    if origins.is_empty() {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }
    let mut values = Vec::with_capacity(origins.len());
    for origin in origins {
        let value = HeaderValue::from_str(origin).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid cors origin: {origin}"))
                .with_hint("Use an origin like https://app.example.com.")
                .with_source(err)
        })?;
        values.push(value);
    }
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(values))
        .allow_methods(Any)
        .allow_headers(Any))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        signal.recv().await;
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

async fn healthz() -> Response {
    json_response(json!({ "ok": true }))
}

async fn list_items(State(state): State<Arc<AppState>>) -> Response {
    match state.service.list() {
        Ok(items) => json_response_of(&items),
        Err(err) => error_response(err),
    }
}

async fn create_item(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<ItemDraft>,
) -> Response {
    match state.service.create(&draft) {
        Ok(item) => json_response_of(&item),
        Err(err) => error_response(err),
    }
}

async fn update_item(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    Json(draft): Json<ItemDraft>,
) -> Response {
    match state.service.update(&id, &draft) {
        Ok(item) => json_response_of(&item),
        Err(err) => error_response(err),
    }
}

async fn delete_item(State(state): State<Arc<AppState>>, AxumPath(id): AxumPath<String>) -> Response {
    // Idempotent: a missing id still confirms.
    match state.service.delete(&id) {
        Ok(_existed) => json_response(json!({ "ok": true })),
        Err(err) => error_response(err),
    }
}

async fn emit_update(State(state): State<Arc<AppState>>) -> Response {
    state.service.bus().notify();
    json_response(json!({ "ok": true }))
}

async fn subscribe_events(State(state): State<Arc<AppState>>) -> Response {
    let receiver = state.service.bus().subscribe();
    // A lagged receiver only collapses duplicate signals; the line still
    // tells the client to re-fetch, so both cases map to the same event.
    let updates =
        BroadcastStream::new(receiver).map(|_signal| Ok::<_, Infallible>(event_line("update")));
    let stream = tokio_stream::once(Ok::<_, Infallible>(event_line("hello"))).chain(updates);

    let mut response = Response::new(Body::from_stream(stream));
    response
        .headers_mut()
        .insert("content-type", HeaderValue::from_static("application/jsonl"));
    response
}

fn event_line(name: &str) -> Bytes {
    let mut line = serde_json::to_vec(&json!({ "event": name })).unwrap_or_default();
    line.push(b'\n');
    Bytes::from(line)
}

fn json_response_of<T: Serialize>(value: &T) -> Response {
    match serde_json::to_value(value) {
        Ok(value) => json_response(value),
        Err(err) => error_response(
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode response")
                .with_source(err),
        ),
    }
}

fn json_response(payload: serde_json::Value) -> Response {
    let mut response = Json(payload).into_response();
    response
        .headers_mut()
        .insert("cardfile-version", HeaderValue::from_static("0"));
    response
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

fn error_response(err: Error) -> Response {
    let status = match err.kind() {
        ErrorKind::Usage | ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Connectivity => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Io | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = ErrorEnvelope {
        error: ErrorBody {
            kind: format!("{:?}", err.kind()),
            message: err.message().unwrap_or("error").to_string(),
            hint: err.hint().map(str::to_string),
            id: err.id().map(str::to_string),
        },
    };
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert("cardfile-version", HeaderValue::from_static("0"));
    response
}
