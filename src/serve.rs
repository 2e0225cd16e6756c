//! Purpose: Serve the MCP tool set over HTTP.
//! Exports: `ServeConfig`, `serve`.
//! Role: Axum-based loopback server; `POST /mcp` carries one JSON-RPC message per request.
//! Invariants: Loopback-only unless explicitly allowed.
//! Invariants: Engine calls run on the blocking pool; the async runtime never touches LMDB.
//! Invariants: Notifications are acknowledged with 202 and an empty body.

use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::time::Duration;
use tower_http::trace::TraceLayer;

use docstore::api::{Error, ErrorKind, Store};
use docstore::mcp::{
    DispatchOutcome, DocstoreMcpHandler, JsonRpcError, JsonRpcId, JsonRpcResponse, McpDispatcher,
    parse_jsonrpc_line,
};

pub const DEFAULT_BIND: &str = "127.0.0.1:9800";
pub const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub allow_non_loopback: bool,
    pub max_body_bytes: u64,
}

#[derive(Clone)]
struct AppState {
    store: Store,
}

pub async fn serve(config: ServeConfig, store: Store) -> Result<(), Error> {
    validate_config(&config)?;

    let max_body_bytes: usize = config
        .max_body_bytes
        .try_into()
        .map_err(|_| Error::new(ErrorKind::Usage).with_message("--max-body-bytes is too large"))?;

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    tracing::info!(bind = %config.bind, path = %store.path().display(), "mcp http server listening");

    let app = router(store, max_body_bytes);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(server_error)?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown requested");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(server_error)?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

fn router(store: Store, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/mcp", post(mcp_message))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { store })
}

fn server_error(err: std::io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("server failed")
        .with_source(err)
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 1048576."));
    }

    if config.max_body_bytes > usize::MAX as u64 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes exceeds platform limits")
            .with_hint("Use a smaller value that fits in memory."));
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
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
    Json(json!({ "ok": true })).into_response()
}

async fn mcp_message(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match std::str::from_utf8(&body)
        .map_err(|_| JsonRpcError::parse_error("request body is not UTF-8"))
        .and_then(parse_jsonrpc_line)
    {
        Ok(request) => request,
        Err(error) => return rpc_response(JsonRpcResponse::failure(JsonRpcId::Null, error)),
    };

    let store = state.store.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        McpDispatcher::new(DocstoreMcpHandler::new(store)).dispatch_value(request)
    })
    .await;

    match outcome {
        Ok(DispatchOutcome::Response(response)) => rpc_response(response),
        Ok(DispatchOutcome::NoResponse) => StatusCode::ACCEPTED.into_response(),
        Err(err) => {
            tracing::error!(error = %err, "mcp worker failed");
            rpc_response(JsonRpcResponse::failure(
                JsonRpcId::Null,
                JsonRpcError::internal_error("request handler failed"),
            ))
        }
    }
}

fn rpc_response(response: JsonRpcResponse) -> Response {
    (StatusCode::OK, Json(response)).into_response()
}
