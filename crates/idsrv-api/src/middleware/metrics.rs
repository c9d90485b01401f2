//! # Prometheus Metrics
//!
//! HTTP-level metrics (request counts, latency) are recorded in middleware.
//! Lookup outcomes are recorded by the lookup handlers. The signing key gauge
//! is refreshed on each `/metrics` scrape (pull model).

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use prometheus::{
    core::Collector, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder,
};

/// Shared metrics state backed by a Prometheus registry.
#[derive(Clone)]
pub struct ApiMetrics {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    lookups_total: IntCounterVec,
    signing_key_ephemeral: prometheus::Gauge,
}

impl std::fmt::Debug for ApiMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiMetrics")
            .field("requests", &self.requests())
            .field("lookups", &self.lookups())
            .finish()
    }
}

impl ApiMetrics {
    /// Create a new metrics instance with a fresh Prometheus registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("idsrv_http_requests_total", "Total HTTP requests"),
            &["method", "path", "status"],
        )?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "idsrv_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["method", "path"],
        )?;

        let lookups_total = IntCounterVec::new(
            Opts::new("idsrv_lookups_total", "Lookups by kind and outcome"),
            &["kind", "outcome"],
        )?;

        let signing_key_ephemeral = prometheus::Gauge::new(
            "idsrv_signing_key_ephemeral",
            "Whether the signing key is ephemeral (1=ephemeral, 0=configured)",
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(lookups_total.clone()))?;
        registry.register(Box::new(signing_key_ephemeral.clone()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                http_requests_total,
                http_request_duration_seconds,
                lookups_total,
                signing_key_ephemeral,
            }),
        })
    }

    /// Total request count across all labels.
    pub fn requests(&self) -> u64 {
        sum_counters(&self.inner.http_requests_total)
    }

    /// Total lookup count across all labels.
    pub fn lookups(&self) -> u64 {
        sum_counters(&self.inner.lookups_total)
    }

    /// Count of lookups with the given labels.
    pub fn lookup_count(&self, kind: &str, outcome: &str) -> u64 {
        self.inner
            .lookups_total
            .with_label_values(&[kind, outcome])
            .get()
    }

    fn record_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.inner
            .http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.inner
            .http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record one lookup. `kind` is `single` or `bulk`; `outcome` is `hit`,
    /// `miss`, `ok` or `error`.
    pub fn record_lookup(&self, kind: &str, outcome: &str) {
        self.inner
            .lookups_total
            .with_label_values(&[kind, outcome])
            .inc();
    }

    pub fn signing_key_ephemeral(&self) -> &prometheus::Gauge {
        &self.inner.signing_key_ephemeral
    }

    /// Gather all metrics and encode in Prometheus text exposition format.
    pub fn gather_and_encode(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| format!("failed to encode metrics: {e}"))?;
        String::from_utf8(buffer).map_err(|e| format!("metrics are not UTF-8: {e}"))
    }
}

fn sum_counters(counter: &IntCounterVec) -> u64 {
    counter
        .collect()
        .iter()
        .flat_map(|mf| mf.get_metric())
        .map(|m| m.get_counter().get_value() as u64)
        .sum()
}

/// Collapse per-key path segments so label cardinality stays bounded.
fn normalize_path(path: &str) -> String {
    let mut out = Vec::new();
    let mut after_pubkey = false;
    for segment in path.split('/') {
        if after_pubkey && segment != "isvalid" {
            out.push("{key_id}");
        } else {
            out.push(segment);
        }
        after_pubkey = segment == "pubkey";
    }
    out.join("/")
}

/// Middleware that records HTTP request metrics via Prometheus.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let metrics = request.extensions().get::<ApiMetrics>().cloned();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());
    let start = Instant::now();

    let response = next.run(request).await;

    if let Some(m) = metrics {
        let duration = start.elapsed().as_secs_f64();
        m.record_request(&method, &path, response.status().as_u16(), duration);
    }

    response
}
