// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

async fn metrics(State(registry): State<Registry>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    match encoder.encode(&registry.gather(), &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain".to_string())],
            format!("unable to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Serves `registry` on `/metrics` until `cancel` fires.
pub async fn start_metrics_server(
    addr: SocketAddr,
    registry: Registry,
    cancel: CancellationToken,
) -> anyhow::Result<JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(metrics))
        .with_state(registry);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on {}", addr);

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
        {
            tracing::error!("Metrics server error: {:?}", e);
        }
    }))
}
