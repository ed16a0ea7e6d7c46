//! High-level recording interface over the raw Prometheus metrics.

use super::prometheus::{
    ACTIVE_WORKERS, CORRECTIONS_TOTAL, JOBS_IN_PROGRESS, JOBS_TOTAL, JOB_DURATION,
    JOB_RETRIES_TOTAL, PUBLISH_TOTAL, QUALITY_SCORE, QUEUE_DEPTH, SCHEDULER_FIRINGS_TOTAL,
};

/// Records queue, quality, scheduler and publish metrics.
///
/// Every method is a no-op until [`init_metrics`](super::init_metrics) has
/// run, so library code can record unconditionally.
///
/// # Example
///
/// ```ignore
/// use news_forge::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics().expect("Failed to init metrics");
/// let collector = MetricsCollector::new();
/// collector.record_job("completed", Some(12.5));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record a job outcome.
    ///
    /// `status` is one of "completed", "failed", "rejected" or "cancelled".
    /// The duration is observed only when the job actually ran.
    pub fn record_job(&self, status: &str, duration_secs: Option<f64>) {
        if let Some(jobs_total) = JOBS_TOTAL.get() {
            jobs_total.with_label_values(&[status]).inc();
        }

        if let (Some(job_duration), Some(secs)) = (JOB_DURATION.get(), duration_secs) {
            job_duration.observe(secs);
        }

        tracing::trace!(status = status, duration_secs = ?duration_secs, "Recorded job metric");
    }

    /// Record a scheduled retry for the given failure class.
    pub fn record_retry(&self, class: &str) {
        if let Some(retries) = JOB_RETRIES_TOTAL.get() {
            retries.with_label_values(&[class]).inc();
        }

        tracing::trace!(class = class, "Recorded retry metric");
    }

    pub fn set_queue_depth(&self, depth: u64) {
        if let Some(queue_depth) = QUEUE_DEPTH.get() {
            queue_depth.set(depth as f64);
        }
    }

    pub fn set_jobs_in_progress(&self, count: u64) {
        if let Some(jobs_in_progress) = JOBS_IN_PROGRESS.get() {
            jobs_in_progress.set(count as f64);
        }
    }

    pub fn set_active_workers(&self, count: usize) {
        if let Some(active_workers) = ACTIVE_WORKERS.get() {
            active_workers.set(count as f64);
        }

        tracing::trace!(count = count, "Updated active workers metric");
    }

    /// Record a composite quality score in [0, 1].
    pub fn record_quality_score(&self, score: f64) {
        if let Some(quality_score) = QUALITY_SCORE.get() {
            quality_score.observe(score);
        }

        tracing::trace!(score = score, "Recorded quality metric");
    }

    pub fn record_correction(&self) {
        if let Some(corrections) = CORRECTIONS_TOTAL.get() {
            corrections.inc();
        }
    }

    /// Record one recurring trigger firing.
    ///
    /// `accepted` is false when the queue refused the submission.
    pub fn record_scheduler_firing(&self, category: &str, accepted: bool) {
        let outcome = if accepted { "submitted" } else { "rejected" };

        if let Some(firings) = SCHEDULER_FIRINGS_TOTAL.get() {
            firings.with_label_values(&[category, outcome]).inc();
        }

        tracing::trace!(
            category = category,
            outcome = outcome,
            "Recorded scheduler firing metric"
        );
    }

    pub fn record_publish(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };

        if let Some(publish) = PUBLISH_TOTAL.get() {
            publish.with_label_values(&[outcome]).inc();
        }
    }
}
