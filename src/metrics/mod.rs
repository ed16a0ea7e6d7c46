//! Prometheus-based monitoring for the queue, quality gate, scheduler and
//! publisher.
//!
//! # Example
//!
//! ```ignore
//! use news_forge::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//!
//! let collector = MetricsCollector::new();
//! collector.record_job("completed", Some(4.2));
//!
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    ACTIVE_WORKERS, CORRECTIONS_TOTAL, JOBS_IN_PROGRESS, JOBS_TOTAL, JOB_DURATION,
    JOB_RETRIES_TOTAL, PUBLISH_TOTAL, QUALITY_SCORE, QUEUE_DEPTH, REGISTRY,
    SCHEDULER_FIRINGS_TOTAL,
};
