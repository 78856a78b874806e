//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Conversions (outcomes, duration)
//! - Engine loading (attempts per source kind)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Conversion Metrics
// =============================================================================

/// Conversions total by outcome.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("makeitmp4_conversions_total", "Total conversions by outcome"),
        &["outcome"], // "success", "invalid_input", "load_failed", "execution_failed", "not_found"
    )
    .unwrap()
});

/// Duration of a conversion from validation to stored result.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "makeitmp4_conversion_duration_seconds",
            "Duration of a conversion attempt",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 900.0]),
        &["outcome"],
    )
    .unwrap()
});

// =============================================================================
// Engine Metrics
// =============================================================================

/// Engine source attempts by source kind and result.
pub static ENGINE_LOAD_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "makeitmp4_engine_load_attempts_total",
            "Engine source initialization attempts",
        ),
        &["kind", "result"], // result: "success" or a failure class
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(CONVERSIONS_TOTAL.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(ENGINE_LOAD_ATTEMPTS.clone()),
    ]
}
