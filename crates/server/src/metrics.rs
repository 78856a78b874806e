//! Prometheus metrics for observability.
//!
//! HTTP and WebSocket metrics are recorded here. Conversion counters live in
//! the core crate and are registered alongside; engine and result gauges are
//! refreshed from the orchestrator on every scrape.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use makeitmp4_core::TranscoderState;
use tracing::warn;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "makeitmp4_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("makeitmp4_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "makeitmp4_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "makeitmp4_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "makeitmp4_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// WebSocket messages sent by type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("makeitmp4_ws_messages_sent_total", "WebSocket messages sent"),
        &["type"],
    )
    .unwrap()
});

// =============================================================================
// Conversion State (collected dynamically)
// =============================================================================

/// Engine loaded (1) or not (0).
pub static ENGINE_LOADED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "makeitmp4_engine_loaded",
        "Whether the conversion engine is loaded (1) or not (0)",
    )
    .unwrap()
});

/// A conversion is in flight (1) or not (0).
pub static CONVERSION_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "makeitmp4_conversion_active",
        "Whether a conversion is currently running",
    )
    .unwrap()
});

/// Size of the held result in bytes, 0 when none.
pub static RESULT_BYTES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "makeitmp4_result_bytes",
        "Size of the converted file waiting for download",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();

    // Conversion state
    registry.register(Box::new(ENGINE_LOADED.clone())).unwrap();
    registry
        .register(Box::new(CONVERSION_ACTIVE.clone()))
        .unwrap();
    registry.register(Box::new(RESULT_BYTES.clone())).unwrap();

    // Core metrics (conversions, engine loading)
    for metric in makeitmp4_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let orchestrator = state.orchestrator();
    let status = orchestrator.status();

    ENGINE_LOADED.set(if status.engine == TranscoderState::Loaded { 1 } else { 0 });
    CONVERSION_ACTIVE.set(if status.phase.is_active() { 1 } else { 0 });

    let held = orchestrator
        .result()
        .await
        .map(|result| result.data.len() as i64)
        .unwrap_or(0);
    RESULT_BYTES.set(held);
}

/// Paths served by the router, as they appear in metric labels.
const ROUTE_LABELS: &[&str] = &[
    "/api/v1/health",
    "/api/v1/config",
    "/api/v1/environment",
    "/api/v1/conversion",
    "/api/v1/conversion/result",
    "/api/v1/conversion/reset",
    "/api/v1/ws",
    "/metrics",
];

/// Normalize a path for metric labels.
///
/// Routed paths keep their own label. Unknown API paths share `/api/other`
/// and everything else is served from the web directory as `/static`.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if let Some(route) = ROUTE_LABELS.iter().find(|route| **route == trimmed) {
        route.to_string()
    } else if trimmed == "/api" || path.starts_with("/api/") {
        "/api/other".to_string()
    } else {
        "/static".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_api() {
        assert_eq!(
            normalize_path("/api/v1/conversion/result"),
            "/api/v1/conversion/result"
        );
        assert_eq!(normalize_path("/api/v1/health/"), "/api/v1/health");
    }

    #[test]
    fn test_normalize_path_unknown_api_paths_share_a_label() {
        assert_eq!(normalize_path("/api/v1/does-not-exist/123"), "/api/other");
        assert_eq!(normalize_path("/api/v1/conversion/result/extra"), "/api/other");
        assert_eq!(normalize_path("/api/v2/health"), "/api/other");
        assert_eq!(normalize_path("/api"), "/api/other");
    }

    #[test]
    fn test_normalize_path_static() {
        assert_eq!(normalize_path("/"), "/static");
        assert_eq!(normalize_path("/index.html"), "/static");
        assert_eq!(normalize_path("/assets/app.js"), "/static");
    }

    #[test]
    fn test_normalize_path_metrics() {
        assert_eq!(normalize_path("/metrics"), "/metrics");
    }

    #[test]
    fn test_encode_metrics_includes_core_metrics() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/api/v1/health", "200"])
            .inc();
        makeitmp4_core::metrics::CONVERSIONS_TOTAL
            .with_label_values(&["success"])
            .inc();

        let text = encode_metrics();
        assert!(text.contains("makeitmp4_http_requests_total"));
        assert!(text.contains("makeitmp4_conversions_total"));
    }
}
