use std::fmt::Display;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use utoipa::OpenApi;

use crate::app::ControlState;
use crate::control::types::{ControlResult, LogsBody, LogsQuery, StatusBody};
use crate::logbook::{LogKind, NO_LOG};
use crate::supervisor::{Supervisor, SupervisorError};

#[derive(OpenApi)]
#[openapi(
    paths(start, stop, status, logs),
    components(schemas(ControlResult, StatusBody, LogsBody))
)]
pub struct ApiDoc;

#[utoipa::path(
    post,
    path = "/api/start",
    responses((status = 200, description = "Start outcome", body = ControlResult))
)]
pub async fn start(State(st): State<ControlState>) -> Json<ControlResult> {
    Json(supervise(&st, "start", Supervisor::start).await)
}

#[utoipa::path(
    post,
    path = "/api/stop",
    responses((status = 200, description = "Stop outcome", body = ControlResult))
)]
pub async fn stop(State(st): State<ControlState>) -> Json<ControlResult> {
    Json(supervise(&st, "stop", Supervisor::stop).await)
}

/// Supervisor actions fork, fsync and touch the PID file synchronously, so
/// they run on the blocking pool.
async fn supervise<T, F>(st: &ControlState, action: &'static str, f: F) -> ControlResult
where
    T: Display + Send + 'static,
    F: FnOnce(&Supervisor) -> Result<T, SupervisorError> + Send + 'static,
{
    let supervisor = Arc::clone(&st.supervisor);
    match tokio::task::spawn_blocking(move || f(&supervisor)).await {
        Ok(res) => {
            if let Err(e) = &res {
                tracing::warn!(action, error = %e, "request rejected");
            }
            res.into()
        }
        Err(e) => {
            tracing::error!(action, error = %e, "supervisor task failed");
            ControlResult {
                success: false,
                message: format!("Error: {e}"),
            }
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/status",
    responses((status = 200, description = "Receiver liveness", body = StatusBody))
)]
pub async fn status(State(st): State<ControlState>) -> Json<StatusBody> {
    let supervisor = Arc::clone(&st.supervisor);
    let running = tokio::task::spawn_blocking(move || supervisor.is_running())
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "liveness task failed");
            false
        });
    Json(StatusBody { running, events: 0 })
}

#[utoipa::path(
    get,
    path = "/api/logs",
    params(LogsQuery),
    responses((status = 200, description = "Tail of the selected log", body = LogsBody))
)]
pub async fn logs(State(st): State<ControlState>, Query(q): Query<LogsQuery>) -> Json<LogsBody> {
    let requested = q.kind.as_deref().unwrap_or("receiver");
    let content = match requested.parse::<LogKind>() {
        Ok(kind) => st.logs.tail(kind, st.tail_lines).await,
        Err(()) => {
            tracing::debug!(requested, "unknown log type");
            NO_LOG.to_string()
        }
    };
    Json(LogsBody { content })
}

pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
