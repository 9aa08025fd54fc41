//! HTTP scrape surface
//!
//! - `GET <metrics_path>`: Prometheus text exposition
//! - `GET /`: landing page linking to the metrics path
//! - `GET /health`: liveness check

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use dovecot_exporter_common::Result;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Path of the liveness endpoint
pub const HEALTH_PATH: &str = "/health";

#[derive(Clone)]
struct AppState {
    metrics: Registry,
    metrics_path: Arc<str>,
}

/// Build the exporter router
pub fn router(metrics: Registry, metrics_path: &str) -> Router {
    let state = AppState {
        metrics,
        metrics_path: Arc::from(metrics_path),
    };

    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/", get(index_handler))
        .route(
            HEALTH_PATH,
            get(|| async { Json(serde_json::json!({"status": "healthy"})) }),
        )
        .with_state(state)
}

/// Serve `app` on `listener` until `shutdown` is cancelled
pub async fn serve(listener: TcpListener, app: Router, shutdown: CancellationToken) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Metrics listener started");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Listener closed");
    Ok(())
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    let encoder = TextEncoder::new();
    let families = state.metrics.gather();
    let mut buf = Vec::new();

    match encoder.encode(&families, &mut buf) {
        Ok(()) => (
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buf,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn index_handler(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n\
         <head><title>Dovecot Exporter</title></head>\n\
         <body>\n\
         <h1>Dovecot Quota Exporter</h1>\n\
         <p><a href='{}'>Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        state.metrics_path
    ))
}
