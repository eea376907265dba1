//! `/healthz` and `/metrics` endpoints (SPEC_FULL.md §A.2, §A.4).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;

use super::ControllerMetrics;

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics(State(metrics): State<Arc<ControllerMetrics>>) -> String {
    metrics.encode()
}

pub async fn serve(addr: &str, shutdown: CancellationToken, metrics: Arc<ControllerMetrics>) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(metrics);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "metrics/health server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            tracing::info!("metrics/health server shutting down");
        })
        .await?;

    // Give the last request a moment to flush before returning.
    tokio::time::sleep(Duration::from_millis(10)).await;
    Ok(())
}
