// Copyright 2026 Feed Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP surface of the relay.
//!
//! `GET /data` serves the cached payload verbatim with `Cache-Control:
//! no-store`. On a cold cache the request performs the fetch inline and
//! answers 500 with `{"error": ...}` if it fails. `GET /health` reports
//! cache state and refresh counters.

use crate::cache::CachedPayload;
use crate::refresher::Refresher;
use anyhow::Context;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the axum Router with all endpoints.
pub fn router(refresher: Arc<Refresher>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/data", get(handle_data))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(refresher)
}

/// Serve on `addr` until `shutdown` resolves.
pub async fn serve<F>(addr: &str, refresher: Arc<Refresher>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("feed relay listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(refresher))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")?;
    Ok(())
}

// ── Handlers ────────────────────────────────────────────────────

async fn handle_data(State(refresher): State<Arc<Refresher>>) -> Response {
    if let Some(payload) = refresher.cache().snapshot().await {
        return payload_response(&payload);
    }

    tracing::info!("cache is cold, fetching inline");
    match refresher.cold_fetch().await {
        Ok(payload) => payload_response(&payload),
        Err(e) => {
            tracing::error!("cold fetch failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CACHE_CONTROL, "no-store")],
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

fn payload_response(payload: &CachedPayload) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        payload.body(),
    )
        .into_response()
}

async fn health(State(refresher): State<Arc<Refresher>>) -> Json<Value> {
    let status = refresher.cache().status().await;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "state": status.state,
        "generation": status.generation,
        "refreshed_at": status.refreshed_at.map(|t| t.to_rfc3339()),
        "refreshing": refresher.is_refreshing(),
        "refresh": refresher.stats(),
    }))
}
