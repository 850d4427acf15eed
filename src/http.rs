use std::time::Duration;
use tracing::Span;

use axum::extract::DefaultBodyLimit;
use axum::http::{self, Response};
use axum::{
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::trace::TraceLayer;

use crate::app::{ControlState, ReceiverState};
use crate::{control, ingest, metrics};

/// Webhook listener. The reader may post batches of any size, so the body
/// limit is lifted on this router.
pub fn receiver_router(state: ReceiverState) -> Router {
    Router::new()
        .route("/", post(ingest::handler::ingest))
        .layer(DefaultBodyLimit::disable())
        .route("/healthz", get(healthz))
        .route("/metrics", get(|| async { metrics::render() }))
        .with_state(state)
}

pub fn control_router(state: ControlState) -> Router {
    use control::handler;

    Router::new()
        .route("/api/start", post(handler::start))
        .route("/api/stop", post(handler::stop))
        .route("/api/status", get(handler::status))
        .route("/api/logs", get(handler::logs))
        .route("/api/openapi.json", get(handler::openapi))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Serves `app` on `listener` until SIGTERM or Ctrl+C.
pub async fn serve(listener: TcpListener, app: Router) -> anyhow::Result<()> {
    let app = app.layer(
        TraceLayer::new_for_http()
            .make_span_with(|req: &http::Request<_>| {
                tracing::info_span!(
                  "http_request",
                  method = %req.method(),
                  path = %req.uri().path(),
                )
            })
            .on_response(|res: &Response<_>, latency: Duration, _span: &Span| {
                tracing::info!(
                  status = %res.status(),
                  latency_ms = %latency.as_millis(),
                  "response"
                )
            })
            .on_failure(|error: ServerErrorsFailureClass, latency: Duration, _span: &Span| {
                tracing::warn!(%error, latency_ms = %latency.as_millis(), "request_failed");
            }),
    );

    println!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("listener drained");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl_c handler unavailable");
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

async fn healthz() -> impl IntoResponse {
    "ok"
}
