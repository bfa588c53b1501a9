//! Admin HTTP surface
//!
//! Serves liveness/readiness probes, the build version and the Prometheus
//! metrics exposition. CORS is wide open so dashboards can scrape from
//! anywhere; preflight OPTIONS requests are answered by the CORS layer.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::metrics::CrawlerMetrics;

/// Build the admin router.
pub fn router(metrics: Arc<CrawlerMetrics>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/livez", get(livez))
        .route("/readyz", get(readyz))
        .route("/version", get(version))
        .route("/metrics", get(prometheus_metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(metrics)
}

/// Serve the admin surface until the shutdown signal fires.
pub async fn run(
    addr: String,
    metrics: Arc<CrawlerMetrics>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr: SocketAddr = addr.parse().context("Invalid admin listen address")?;
    let app = router(metrics);

    let listener = TcpListener::bind(&addr)
        .await
        .context("Failed to bind admin server")?;
    info!("Admin server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            info!("Admin server shutting down");
        })
        .await
        .context("Admin server error")?;

    Ok(())
}

async fn livez() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn readyz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn version() -> impl IntoResponse {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

async fn prometheus_metrics(State(metrics): State<Arc<CrawlerMetrics>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics.to_prometheus(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listen_addr() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        assert_eq!(addr.port(), 8080);

        let addr: SocketAddr = "0.0.0.0:9000".parse().unwrap();
        assert_eq!(addr.port(), 9000);
    }

    #[test]
    fn test_router_builds() {
        let _ = router(CrawlerMetrics::shared(false));
    }

    #[tokio::test]
    async fn test_endpoints_respond() {
        let metrics = CrawlerMetrics::shared(true);
        metrics.requests_total.inc();

        let app = router(Arc::clone(&metrics));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let base = format!("http://{}", addr);
        let client = reqwest::Client::new();

        let live: serde_json::Value = client
            .get(format!("{}/livez", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(live["status"], "ok");

        let version: serde_json::Value = client
            .get(format!("{}/version", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(version["version"], env!("CARGO_PKG_VERSION"));

        let metrics_body = client
            .get(format!("{}/metrics", base))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(metrics_body.contains("crawler_requests_total 1"));
        assert!(metrics_body.contains("crawler_full_content_enabled 1"));
    }
}
