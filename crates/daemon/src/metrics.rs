//! Prometheus metrics for the daemon.
//!
//! Core counters are registered alongside gauges describing the tracking
//! state, which are refreshed from the store before every export.

use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use anidl_core::AutoDownloader;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Tracked watch-list items by status.
pub static WATCH_ITEMS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("anidl_watch_items", "Tracked watch-list items by status"),
        &["status"], // "setup", "waiting", "no_results", "stalled", "blacklisted"
    )
    .unwrap()
});

/// Users whose watch lists are tracked.
pub static TRACKED_USERS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("anidl_tracked_users", "Number of tracked users").unwrap()
});

/// Jobs running or waiting across all scheduler queues.
pub static PENDING_JOBS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "anidl_scheduler_pending_jobs",
        "Jobs running or waiting across all queues",
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    registry.register(Box::new(WATCH_ITEMS.clone())).unwrap();
    registry.register(Box::new(TRACKED_USERS.clone())).unwrap();
    registry.register(Box::new(PENDING_JOBS.clone())).unwrap();

    // Core metrics (scheduler, matching, setup, external services)
    for metric in anidl_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Refresh the state gauges from the tracking store.
pub async fn collect_dynamic_metrics(downloader: &AutoDownloader) {
    let items = downloader.store().items().await;

    let mut setup = 0;
    let mut waiting = 0;
    let mut no_results = 0;
    let mut stalled = 0;
    let mut blacklisted = 0;
    for item in &items {
        if item.is_blacklisted {
            blacklisted += 1;
        } else if item.is_setup {
            setup += 1;
        } else {
            waiting += 1;
        }
        if item.no_results {
            no_results += 1;
        }
        if item.is_stalled {
            stalled += 1;
        }
    }

    WATCH_ITEMS.with_label_values(&["setup"]).set(setup);
    WATCH_ITEMS.with_label_values(&["waiting"]).set(waiting);
    WATCH_ITEMS.with_label_values(&["no_results"]).set(no_results);
    WATCH_ITEMS.with_label_values(&["stalled"]).set(stalled);
    WATCH_ITEMS.with_label_values(&["blacklisted"]).set(blacklisted);

    TRACKED_USERS.set(downloader.store().users().await.len() as i64);
    PENDING_JOBS.set(downloader.scheduler().pending_jobs() as i64);
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics are not valid UTF-8")
}

/// Write the text exposition to `path` for a node exporter textfile collector.
///
/// Written to a sibling temp file first so readers never see a partial file.
pub fn write_textfile(path: &Path) -> Result<()> {
    let body = encode_metrics()?;
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, body).with_context(|| format!("Failed to write {:?}", tmp))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to move metrics to {:?}", path))
}
