use crate::metrics::store::PodNetworkMetrics;
use crate::Result;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

pub struct PrometheusExporter {
    metrics: PodNetworkMetrics,
    addr: SocketAddr,
}

impl PrometheusExporter {
    pub fn new(metrics: PodNetworkMetrics, addr: SocketAddr) -> Self {
        Self { metrics, addr }
    }

    pub fn router(&self) -> Router {
        router(self.metrics.clone())
    }

    /// Serve `/metrics` and `/healthz` until `shutdown` is cancelled.
    pub async fn start(self, shutdown: CancellationToken) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("Serving network metrics on {}", self.addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Received stop signal, closed the network metrics endpoint");
        Ok(())
    }
}

pub fn router(metrics: PodNetworkMetrics) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .route("/healthz", get(health))
        .with_state(metrics)
}

async fn render_metrics(State(metrics): State<PodNetworkMetrics>) -> Response {
    match metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn health() -> &'static str {
    "OK"
}
