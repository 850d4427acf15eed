use crate::app::ReceiverState;
use crate::ingest::types::{event_list, normalize, AckBody};
use crate::logbook::{stamp, LogKind};
use crate::metrics;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::Json;

/// Webhook entry point for the reader. Always answers 200: a failure status
/// sends the appliance into its own retry loop.
pub async fn ingest(
    State(st): State<ReceiverState>,
    body: Result<Bytes, BytesRejection>,
) -> Json<AckBody> {
    metrics::WEBHOOKS_RECEIVED.inc();
    let ts = stamp();

    let body = body.unwrap_or_else(|rejection| {
        tracing::warn!(error = %rejection, "webhook body unreadable");
        Bytes::new()
    });
    let raw = String::from_utf8_lossy(&body);

    st.logs.append(LogKind::Raw, &format!("[{ts}]\n{raw}\n")).await;

    let doc: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(doc) => doc,
        Err(e) => {
            metrics::INVALID_PAYLOADS.inc();
            tracing::info!(error = %e, bytes = body.len(), "invalid webhook json");
            return Json(AckBody::INVALID_JSON);
        }
    };

    let events = normalize(event_list(doc));

    if events.is_empty() {
        st.logs
            .append(LogKind::Receiver, &format!("[{ts}] no tagInventory event"))
            .await;
    } else {
        let count = events.len();
        st.forwarder.forward(events).await;
        st.logs
            .append(LogKind::Receiver, &format!("[{ts}] sent {count} events"))
            .await;
    }

    Json(AckBody::OK)
}
