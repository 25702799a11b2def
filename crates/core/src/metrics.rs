//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Scheduler (jobs per queue and outcome, job duration)
//! - Release matching (ranking outcomes)
//! - Auto-download setup and stall detection
//! - External services (AniList, Nyaa, qBittorrent)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Scheduler Metrics
// =============================================================================

/// Jobs executed by queue and outcome.
pub static SCHEDULER_JOBS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("anidl_scheduler_jobs_total", "Total scheduler jobs executed"),
        &["queue", "outcome"], // outcome: "ok", "error", "panic"
    )
    .unwrap()
});

/// Job run time in seconds, excluding the inter-job delay.
pub static SCHEDULER_JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "anidl_scheduler_job_duration_seconds",
            "Duration of a single scheduler job",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["queue"],
    )
    .unwrap()
});

// =============================================================================
// Release Matching Metrics
// =============================================================================

/// Ranking passes by outcome.
pub static RANKING_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("anidl_ranking_outcomes_total", "Total ranking passes"),
        &["outcome"], // "picked", "zero_seeders", "empty"
    )
    .unwrap()
});

// =============================================================================
// Auto-download Metrics
// =============================================================================

/// Auto-download setup attempts by outcome.
pub static SETUP_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "anidl_setup_outcomes_total",
            "Total auto-download setup attempts",
        ),
        &["outcome"], // "feed", "batch", "manual", "fallback", "no_results", "deferred", "rejected"
    )
    .unwrap()
});

/// Watch items newly flagged as stalled.
pub static STALL_DETECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "anidl_stall_detections_total",
        "Total watch items flagged as stalled",
    )
    .unwrap()
});

// =============================================================================
// External Service Metrics
// =============================================================================

/// External service requests total.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "anidl_external_service_requests_total",
            "Total external service requests",
        ),
        &["service", "operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

/// Record the outcome of an external call.
pub fn record_external<T, E>(service: &str, operation: &str, result: &Result<T, E>) {
    let status = if result.is_ok() { "success" } else { "error" };
    EXTERNAL_SERVICE_REQUESTS
        .with_label_values(&[service, operation, status])
        .inc();
}

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Scheduler
        Box::new(SCHEDULER_JOBS.clone()),
        Box::new(SCHEDULER_JOB_DURATION.clone()),
        // Matching
        Box::new(RANKING_OUTCOMES.clone()),
        // Auto-download
        Box::new(SETUP_OUTCOMES.clone()),
        Box::new(STALL_DETECTIONS.clone()),
        // External services
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
    ]
}
