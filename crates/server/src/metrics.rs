//! Prometheus registry for the HTTP surface.
//!
//! The registry holds the request metrics defined here together with the
//! matching metrics exported by `trialmatch_core::metrics`. It is rendered
//! on `GET /metrics`.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use regex_lite::Regex;
use tracing::{error, warn};

const HTTP_LABELS: &[&str] = &["method", "path", "status"];

/// Request latency buckets. The match endpoint can wait on the oracle, hence the long tail.
const LATENCY_BUCKETS: &[f64] = &[
    0.002, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 15.0, 30.0, 60.0,
];

pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    let opts = HistogramOpts::new(
        "trialmatch_http_request_duration_seconds",
        "Time spent answering an HTTP request",
    )
    .buckets(LATENCY_BUCKETS.to_vec());
    HistogramVec::new(opts, HTTP_LABELS).expect("static histogram definition")
});

pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trialmatch_http_requests_total", "HTTP requests answered"),
        HTTP_LABELS,
    )
    .expect("static counter definition")
});

pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "trialmatch_http_requests_in_flight",
        "HTTP requests currently being handled",
    )
    .expect("static gauge definition")
});

pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();

    let http: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUEST_DURATION.clone()),
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()),
    ];
    for collector in http.into_iter().chain(trialmatch_core::metrics::all_metrics()) {
        if let Err(e) = registry.register(collector) {
            warn!(error = %e, "Skipping metric registration");
        }
    }

    registry
});

static NUMERIC_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\d+(/|$)").expect("static regex"));

/// Render every registered metric in the Prometheus text exposition format.
pub fn encode_metrics() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collapse numeric path segments to `{id}` so labels stay low-cardinality.
pub fn normalize_path(path: &str) -> String {
    // Two passes: the regex consumes the slash shared by adjacent ids.
    let first = NUMERIC_SEGMENT.replace_all(path, "/{id}$1");
    NUMERIC_SEGMENT.replace_all(&first, "/{id}$1").into_owned()
}
