//! Streamable-HTTP style transport: one JSON-RPC message per `POST /mcp`.

use super::protocol::{parse_request, JsonRpcResponse};
use super::{McpServer, MAX_MESSAGE_BYTES};
use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info, warn};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct HttpState {
    server: Arc<McpServer>,
    auth_token: Option<Arc<str>>,
}

pub fn router(server: Arc<McpServer>, auth_token: Option<String>) -> Router {
    let state = HttpState {
        server,
        auth_token: auth_token.map(Arc::from),
    };

    let rpc = Router::new()
        .route("/mcp", post(handle_rpc))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(health))
        .merge(rpc)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_MESSAGE_BYTES)),
        )
        .with_state(state)
}

pub async fn serve(
    server: Arc<McpServer>,
    host: &str,
    port: u16,
    auth_token: Option<String>,
) -> Result<()> {
    if auth_token.is_none() {
        warn!("HTTP transport is running without an auth token");
    }

    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;
    info!("Serving MCP over HTTP on {}", listener.local_addr()?);

    axum::serve(listener, router(server, auth_token))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

async fn health() -> &'static str {
    "ok"
}

async fn require_token(State(state): State<HttpState>, req: Request<Body>, next: Next) -> Response {
    if let Some(expected) = &state.auth_token {
        let presented = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(&**expected) {
            return (StatusCode::UNAUTHORIZED, "missing or invalid bearer token").into_response();
        }
    }
    next.run(req).await
}

async fn handle_rpc(State(state): State<HttpState>, body: Bytes) -> Response {
    let req = match parse_request(&body) {
        Ok(req) => req,
        Err(resp) => return (StatusCode::BAD_REQUEST, Json(resp)).into_response(),
    };

    let id = req.id.clone();
    let result = state.server.handle_request(req).await;
    match id {
        Some(id) => Json(JsonRpcResponse::from_result(id, result)).into_response(),
        None => {
            if let Err(e) = result {
                warn!("Error handling notification: {}", e.message);
            }
            StatusCode::ACCEPTED.into_response()
        }
    }
}
