use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the static `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE
        .get_or_init(|| async {
            info!("Initializing Metrics ...");
            Metrics::new()
        })
        .await
}

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Request pipeline
    pub requests: IntCounterVec,
    pub retries: IntCounterVec,

    // Refresh coordinator
    pub refresh_calls: IntCounter,
    pub refresh_failures: IntCounterVec,
    pub refresh_duration: HistogramVec,
    pub refresh_waiters: IntCounter,

    // Session lifecycle
    pub session_teardowns: IntCounter,
    pub logins: IntCounterVec,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("sessionguard".into()), None)
            .expect("valid registry prefix");

        let metrics: Arc<Metrics> = Arc::new(Self {
            requests: IntCounterVec::new(Opts::new("requests_total", "Completed requests by classification"), &["classification"]).expect("valid metric"),
            retries: IntCounterVec::new(Opts::new("request_retries_total", "Requests replayed after a refresh, by result"), &["result"]).expect("valid metric"),

            refresh_calls: IntCounter::new("refresh_calls_total", "Refresh endpoint calls").expect("valid metric"),
            refresh_failures: IntCounterVec::new(Opts::new("refresh_failures_total", "Refresh failures by reason"), &["reason"]).expect("valid metric"),
            refresh_duration: HistogramVec::new(HistogramOpts::new("refresh_duration_seconds", "Refresh call duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0]), &["outcome"]).expect("valid metric"),
            refresh_waiters: IntCounter::new("refresh_waiters_total", "Callers queued behind an in-flight refresh").expect("valid metric"),

            session_teardowns: IntCounter::new("session_teardowns_total", "Sessions ended by unrecoverable refresh failure").expect("valid metric"),
            logins: IntCounterVec::new(Opts::new("logins_total", "Login attempts by result"), &["result"]).expect("valid metric"),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        let _ = reg.register(Box::new(metrics.requests.clone()));
        let _ = reg.register(Box::new(metrics.retries.clone()));
        let _ = reg.register(Box::new(metrics.refresh_calls.clone()));
        let _ = reg.register(Box::new(metrics.refresh_failures.clone()));
        let _ = reg.register(Box::new(metrics.refresh_duration.clone()));
        let _ = reg.register(Box::new(metrics.refresh_waiters.clone()));
        let _ = reg.register(Box::new(metrics.session_teardowns.clone()));
        let _ = reg.register(Box::new(metrics.logins.clone()));

        metrics
    }

    /// Prometheus text exposition of everything registered
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
