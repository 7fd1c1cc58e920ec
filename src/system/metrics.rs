//! Metrics collection using Prometheus
//!
//! Counters for lifecycle operations and request rejections, plus a
//! histogram for layout resolution time. All metrics live in a private
//! registry served at `/metrics`.

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::time::Instant;

/// Global metrics registry
static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Process-wide metric handles
pub struct Metrics {
    /// Draft saves
    pub drafts_saved: IntCounter,
    /// Draft promotions to live
    pub blocks_published: IntCounter,
    /// Direct writes to live props
    pub direct_saves: IntCounter,
    /// Rows written by import
    pub rows_imported: IntCounter,
    /// Rows returned by export
    pub rows_exported: IntCounter,
    /// Layout resolutions served
    pub layouts_resolved: IntCounter,
    /// Requests rejected for missing or invalid sessions
    pub auth_failures: IntCounter,
    /// Requests rejected by the rate limiter
    pub rate_limited: IntCounter,
    /// Backend write failures
    pub store_errors: IntCounter,
    /// Layout resolution duration in seconds
    pub resolve_duration: Histogram,
}

fn counter(name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let counter = IntCounter::new(name, help)?;
    REGISTRY.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl Metrics {
    /// Create and register all metrics
    fn new() -> prometheus::Result<Self> {
        let resolve_duration = Histogram::with_opts(
            HistogramOpts::new(
                "sb_layout_resolve_seconds",
                "Duration of layout resolution in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        REGISTRY.register(Box::new(resolve_duration.clone()))?;

        Ok(Self {
            drafts_saved: counter("sb_drafts_saved_total", "Total draft saves")?,
            blocks_published: counter("sb_blocks_published_total", "Total block publishes")?,
            direct_saves: counter("sb_direct_saves_total", "Total direct saves to live props")?,
            rows_imported: counter("sb_rows_imported_total", "Total rows written by import")?,
            rows_exported: counter("sb_rows_exported_total", "Total rows returned by export")?,
            layouts_resolved: counter("sb_layouts_resolved_total", "Total layouts resolved")?,
            auth_failures: counter("sb_auth_failures_total", "Total rejected admin requests")?,
            rate_limited: counter("sb_rate_limited_total", "Total rate limited requests")?,
            store_errors: counter("sb_store_errors_total", "Total storage write failures")?,
            resolve_duration,
        })
    }

    /// Get the global metrics instance
    pub fn global() -> &'static Metrics {
        static INSTANCE: Lazy<Metrics> =
            Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
        &INSTANCE
    }
}

/// Timer for measuring operation duration with automatic histogram recording
pub struct Timer {
    start: Instant,
    histogram: Histogram,
}

impl Timer {
    /// Start a new timer
    pub fn start(histogram: &Histogram) -> Self {
        Self {
            start: Instant::now(),
            histogram: histogram.clone(),
        }
    }

    /// Record the elapsed time and consume the timer
    pub fn finish(self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Register all metrics up front so `/metrics` lists them before first use
pub fn init_registry() {
    let _ = Metrics::global();
}

/// Collect and return all metrics as a Prometheus-formatted string
pub fn collect_metrics() -> String {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
