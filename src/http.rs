//! HTTP plumbing shared by the service binaries: the RPC listener and the
//! optional Prometheus metrics endpoint.

use axum::{Router, routing::get};
use std::net::SocketAddr;
use tracing::{error, info};

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Run the HTTP server for Prometheus metrics.
///
/// Binds to `0.0.0.0:port` and serves the `/metrics` endpoint. This is a
/// long-running task that should be spawned in the background.
pub async fn run_metrics_server(port: u16) {
    let app = Router::new().route("/metrics", get(metrics_handler));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("prometheus http server listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind metrics server on {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("metrics server error: {}", e);
    }
}

/// Serve a service's RPC router on `0.0.0.0:port` until the process ends.
pub async fn serve_rpc(router: Router, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("rpc listener bound on {}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}
