use axum::async_trait;

use crate::config::ForwardCfg;
use crate::domain::EventBatch;

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("transport: {0}")]
    Transport(String),
}

/// Delivers one batch to the collector and reports the HTTP status it
/// answered with. Any status, including 4xx/5xx, is an `Ok`.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn send(&self, batch: &EventBatch) -> Result<u16, SinkError>;
}

pub struct HttpSink {
    client: reqwest::Client,
    url: String,
    source: String,
}

impl HttpSink {
    pub fn new(cfg: &ForwardCfg) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(cfg.timeout()).build()?;
        Ok(Self {
            client,
            url: cfg.url.clone(),
            source: cfg.source.clone(),
        })
    }
}

#[async_trait]
impl Sink for HttpSink {
    async fn send(&self, batch: &EventBatch) -> Result<u16, SinkError> {
        // .json() sets Content-Type: application/json
        let res = self
            .client
            .post(&self.url)
            .header("X-Source", &self.source)
            .json(batch)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SinkError::Timeout(e.to_string())
                } else {
                    SinkError::Transport(e.to_string())
                }
            })?;
        Ok(res.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    type Seen = Arc<Mutex<Vec<(HeaderMap, serde_json::Value)>>>;

    async fn collector(status: u16) -> (String, Seen) {
        let seen: Seen = Arc::default();
        let app = Router::new().route(
            "/collect",
            post({
                let seen = seen.clone();
                move |headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                    seen.lock().unwrap().push((headers, body));
                    axum::http::StatusCode::from_u16(status).unwrap()
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        (format!("http://{addr}/collect"), seen)
    }

    fn cfg(url: String) -> ForwardCfg {
        ForwardCfg {
            url,
            source: "test-source".into(),
            timeout_ms: 2000,
        }
    }

    #[tokio::test]
    async fn posts_batch_with_source_header() {
        let (url, seen) = collector(200).await;
        let sink = HttpSink::new(&cfg(url)).unwrap();
        let batch = EventBatch::new("test-source", "2024-01-01 00:00:00", Vec::new());

        let status = sink.send(&batch).await.expect("collector reachable");

        assert_eq!(status, 200);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (headers, body) = &seen[0];
        assert_eq!(headers["x-source"], "test-source");
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(body["source"], "test-source");
        assert_eq!(body["sent_at"], "2024-01-01 00:00:00");
    }

    #[tokio::test]
    async fn error_status_is_reported_not_raised() {
        let (url, _seen) = collector(503).await;
        let sink = HttpSink::new(&cfg(url)).unwrap();
        let batch = EventBatch::new("test-source", "now", Vec::new());

        assert_eq!(sink.send(&batch).await.unwrap(), 503);
    }

    #[tokio::test]
    async fn unreachable_collector_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let sink = HttpSink::new(&cfg(format!("http://{addr}/collect"))).unwrap();
        let batch = EventBatch::new("test-source", "now", Vec::new());

        assert!(sink.send(&batch).await.is_err());
    }
}
