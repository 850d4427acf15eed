use std::sync::Arc;

use crate::domain::{EventBatch, InventoryEvent};
use crate::logbook::{stamp, LogBook, LogKind};
use crate::metrics;
use crate::sink::Sink;

/// Fire-and-forget delivery of normalized events. Every outcome lands in
/// `sender.log`; nothing is returned to the caller.
pub struct Forwarder {
    sink: Arc<dyn Sink>,
    source: String,
    logs: LogBook,
}

impl Forwarder {
    pub fn new(sink: Arc<dyn Sink>, source: impl Into<String>, logs: LogBook) -> Self {
        Self {
            sink,
            source: source.into(),
            logs,
        }
    }

    pub async fn forward(&self, events: Vec<InventoryEvent>) {
        let count = events.len();
        let batch = EventBatch::new(self.source.clone(), stamp(), events);

        let line = match self.sink.send(&batch).await {
            Ok(status) => {
                if (200..300).contains(&status) {
                    metrics::EVENTS_FORWARDED.inc_by(count as u64);
                    tracing::debug!(status, count, "forwarded");
                } else {
                    metrics::FORWARD_FAILURES.inc();
                    tracing::warn!(status, count, "collector rejected batch");
                }
                format!("{} HTTP:{}", stamp(), status)
            }
            Err(e) => {
                metrics::FORWARD_FAILURES.inc();
                tracing::warn!(error = %e, count, "forward_failed");
                format!("{} ERROR:{}", stamp(), e)
            }
        };
        self.logs.append(LogKind::Sender, &line).await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sink::SinkError;
    use axum::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Records batches and answers with a canned outcome.
    pub(crate) struct RecordingSink {
        pub batches: Mutex<Vec<EventBatch>>,
        outcome: fn() -> Result<u16, SinkError>,
    }

    impl RecordingSink {
        pub fn replying(outcome: fn() -> Result<u16, SinkError>) -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(Vec::new()),
                outcome,
            })
        }
    }

    #[async_trait]
    impl Sink for RecordingSink {
        async fn send(&self, batch: &EventBatch) -> Result<u16, SinkError> {
            self.batches.lock().unwrap().push(batch.clone());
            (self.outcome)()
        }
    }

    fn event(epc: &str) -> InventoryEvent {
        InventoryEvent {
            epc: Some(epc.into()),
            antenna_port: Some(1),
            rssi: Some((-4500).into()),
            phase: Some(120.into()),
            reader_time: None,
            raw: Default::default(),
        }
    }

    #[tokio::test]
    async fn sends_one_batch_and_logs_status() {
        let dir = tempdir().unwrap();
        let logs = LogBook::open(dir.path()).unwrap();
        let sink = RecordingSink::replying(|| Ok(200));
        let fwd = Forwarder::new(sink.clone(), "chiptime-localhost", logs.clone());

        fwd.forward(vec![event("A"), event("B")]).await;

        let batches = sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].source, "chiptime-localhost");
        assert_eq!(batches[0].events.len(), 2);
        let log = std::fs::read_to_string(logs.path(LogKind::Sender)).unwrap();
        assert!(log.trim_end().ends_with("HTTP:200"), "{log}");
    }

    #[tokio::test]
    async fn transport_failure_is_logged_not_raised() {
        let dir = tempdir().unwrap();
        let logs = LogBook::open(dir.path()).unwrap();
        let sink = RecordingSink::replying(|| Err(SinkError::Timeout("deadline".into())));
        let fwd = Forwarder::new(sink, "chiptime-localhost", logs.clone());

        fwd.forward(vec![event("A")]).await;

        let log = std::fs::read_to_string(logs.path(LogKind::Sender)).unwrap();
        assert!(log.contains("ERROR:timeout: deadline"), "{log}");
    }

    #[tokio::test]
    async fn rejected_batch_logs_status_code() {
        let dir = tempdir().unwrap();
        let logs = LogBook::open(dir.path()).unwrap();
        let fwd = Forwarder::new(RecordingSink::replying(|| Ok(500)), "src", logs.clone());

        fwd.forward(vec![event("A")]).await;

        let log = std::fs::read_to_string(logs.path(LogKind::Sender)).unwrap();
        assert!(log.contains("HTTP:500"), "{log}");
    }
}
