//! Prometheus metrics registration and export.
//!
//! All news_forge metrics live in one registry that is created by
//! [`init_metrics`]. Recording before initialization is a no-op.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all news_forge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Jobs that reached an outcome, labeled by status.
pub static JOBS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Wall time of a job attempt in seconds.
pub static JOB_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Jobs waiting for a worker.
pub static QUEUE_DEPTH: OnceLock<Gauge> = OnceLock::new();

/// Jobs currently held by a worker.
pub static JOBS_IN_PROGRESS: OnceLock<Gauge> = OnceLock::new();

/// Worker tasks currently running.
pub static ACTIVE_WORKERS: OnceLock<Gauge> = OnceLock::new();

/// Scheduled retries, labeled by failure class.
pub static JOB_RETRIES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Distribution of composite quality scores.
pub static QUALITY_SCORE: OnceLock<Histogram> = OnceLock::new();

/// Correction rounds run by the quality gate.
pub static CORRECTIONS_TOTAL: OnceLock<Counter> = OnceLock::new();

/// Recurring trigger firings, labeled by category and outcome.
pub static SCHEDULER_FIRINGS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Publish pushes, labeled by outcome.
pub static PUBLISH_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. A second call builds a fresh registry but the
/// statics keep the first one.
///
/// # Errors
///
/// Returns a `prometheus::Error` if a metric definition is invalid.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    // Job metrics
    let jobs_total = CounterVec::new(
        Opts::new("news_forge_jobs_total", "Jobs that reached an outcome"),
        &["status"],
    )?;

    let job_duration = Histogram::with_opts(
        HistogramOpts::new(
            "news_forge_job_duration_seconds",
            "Job attempt duration in seconds",
        )
        .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
    )?;

    let job_retries_total = CounterVec::new(
        Opts::new("news_forge_job_retries_total", "Scheduled job retries"),
        &["class"],
    )?;

    // Queue metrics
    let queue_depth = Gauge::new("news_forge_queue_depth", "Jobs waiting for a worker")?;

    let jobs_in_progress = Gauge::new(
        "news_forge_jobs_in_progress",
        "Jobs currently being processed",
    )?;

    let active_workers = Gauge::new("news_forge_active_workers", "Running worker tasks")?;

    // Quality metrics
    let quality_score = Histogram::with_opts(
        HistogramOpts::new(
            "news_forge_quality_score",
            "Distribution of composite quality scores",
        )
        .buckets(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]),
    )?;

    let corrections_total = Counter::new(
        "news_forge_corrections_total",
        "Correction rounds run by the quality gate",
    )?;

    // Scheduler and publish metrics
    let scheduler_firings_total = CounterVec::new(
        Opts::new(
            "news_forge_scheduler_firings_total",
            "Recurring trigger firings",
        ),
        &["category", "outcome"],
    )?;

    let publish_total = CounterVec::new(
        Opts::new("news_forge_publish_total", "Publish pushes by outcome"),
        &["outcome"],
    )?;

    registry.register(Box::new(jobs_total.clone()))?;
    registry.register(Box::new(job_duration.clone()))?;
    registry.register(Box::new(job_retries_total.clone()))?;
    registry.register(Box::new(queue_depth.clone()))?;
    registry.register(Box::new(jobs_in_progress.clone()))?;
    registry.register(Box::new(active_workers.clone()))?;
    registry.register(Box::new(quality_score.clone()))?;
    registry.register(Box::new(corrections_total.clone()))?;
    registry.register(Box::new(scheduler_firings_total.clone()))?;
    registry.register(Box::new(publish_total.clone()))?;

    // Already-set statics mean an earlier init won.
    let _ = REGISTRY.set(registry);
    let _ = JOBS_TOTAL.set(jobs_total);
    let _ = JOB_DURATION.set(job_duration);
    let _ = JOB_RETRIES_TOTAL.set(job_retries_total);
    let _ = QUEUE_DEPTH.set(queue_depth);
    let _ = JOBS_IN_PROGRESS.set(jobs_in_progress);
    let _ = ACTIVE_WORKERS.set(active_workers);
    let _ = QUALITY_SCORE.set(quality_score);
    let _ = CORRECTIONS_TOTAL.set(corrections_total);
    let _ = SCHEDULER_FIRINGS_TOTAL.set(scheduler_firings_total);
    let _ = PUBLISH_TOTAL.set(publish_total);

    tracing::info!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        let result = init_metrics();
        assert!(result.is_ok() || REGISTRY.get().is_some());
    }

    #[test]
    fn test_export_after_init() {
        let _ = init_metrics();
        if let Some(jobs) = JOBS_TOTAL.get() {
            jobs.with_label_values(&["completed"]).inc();
        }

        let metrics = export_metrics();
        assert!(!metrics.starts_with("# Error"));
        assert!(metrics.contains("news_forge_jobs_total"));
    }
}
