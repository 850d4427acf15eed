use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn counter(name: &str, help: &str) -> IntCounter {
    let c = IntCounter::new(name, help).expect("metric name and help are valid");
    REGISTRY
        .register(Box::new(c.clone()))
        .expect("metric registered once");
    c
}

pub static WEBHOOKS_RECEIVED: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "relay_webhooks_received_total",
        "Number of webhook requests received from the reader",
    )
});

pub static INVALID_PAYLOADS: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "relay_invalid_payloads_total",
        "Number of webhook bodies that were not valid JSON",
    )
});

pub static EVENTS_FORWARDED: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "relay_events_forwarded_total",
        "Number of inventory events accepted by the collector",
    )
});

pub static FORWARD_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "relay_forward_failures_total",
        "Number of batches that failed or were rejected by the collector",
    )
});

/// Prometheus text exposition of every registered counter.
pub fn render() -> String {
    // Touch the counters so they are exported before their first increment.
    Lazy::force(&WEBHOOKS_RECEIVED);
    Lazy::force(&INVALID_PAYLOADS);
    Lazy::force(&EVENTS_FORWARDED);
    Lazy::force(&FORWARD_FAILURES);

    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buf) {
        tracing::warn!(error = %e, "metrics_encode_failed");
    }
    String::from_utf8_lossy(&buf).into_owned()
}
