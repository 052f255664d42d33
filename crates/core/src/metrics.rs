//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Semantic oracle calls and latency
//! - Semantic cache traffic
//! - Criterion evaluation and trial verdicts

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Semantic Oracle Metrics
// =============================================================================

/// Oracle calls total by result.
pub static ORACLE_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trialmatch_oracle_calls_total", "Total semantic oracle calls"),
        &["result"], // "ok", "transport_error", "api_error", "parse_error"
    )
    .unwrap()
});

/// Oracle call duration in seconds.
pub static ORACLE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "trialmatch_oracle_duration_seconds",
            "Duration of semantic oracle calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &[],
    )
    .unwrap()
});

/// Tokens billed by the oracle, by direction.
pub static ORACLE_TOKENS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trialmatch_oracle_tokens_total", "Tokens used by semantic oracle calls"),
        &["kind"], // "input", "output"
    )
    .unwrap()
});

// =============================================================================
// Cache Metrics
// =============================================================================

/// Semantic cache lookups by result.
pub static CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "trialmatch_cache_lookups_total",
            "Total semantic cache lookups",
        ),
        &["result"], // "hit", "miss"
    )
    .unwrap()
});

// =============================================================================
// Engine Metrics
// =============================================================================

/// Criterion evaluations by the method that decided them.
pub static CRITERIA_EVALUATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "trialmatch_criteria_evaluated_total",
            "Total criterion evaluations",
        ),
        &["method"], // "lexical", "semantic", "none"
    )
    .unwrap()
});

/// Trial verdicts by status.
pub static TRIAL_VERDICTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trialmatch_trial_verdicts_total", "Total trial verdicts"),
        &["status"], // "eligible", "ineligible", "needsReview"
    )
    .unwrap()
});

/// Trials evaluated per patient run.
pub static TRIALS_PER_RUN: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "trialmatch_trials_per_run",
            "Number of trials evaluated per patient run",
        )
        .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Oracle
        Box::new(ORACLE_CALLS.clone()),
        Box::new(ORACLE_DURATION.clone()),
        Box::new(ORACLE_TOKENS.clone()),
        // Cache
        Box::new(CACHE_LOOKUPS.clone()),
        // Engine
        Box::new(CRITERIA_EVALUATED.clone()),
        Box::new(TRIAL_VERDICTS.clone()),
        Box::new(TRIALS_PER_RUN.clone()),
    ]
}
