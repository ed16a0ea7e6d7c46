//! Priority job queue, worker pool and recurring category scheduler.
//!
//! This module provides the execution engine for content processing:
//!
//! - **PriorityJobQueue**: Bounded in-memory queue, highest priority first, FIFO on ties
//! - **WorkerPool**: Fixed set of workers pulling from the shared heap
//! - **RetryPolicy**: Failure classification with a backoff ladder
//! - **RecurringScheduler**: Per-category cadence with staggered triggers
//!
//! # Architecture
//!
//! ```text
//!    ┌────────────────────┐      ┌──────────────┐
//!    │ RecurringScheduler │      │ Manual/API   │
//!    │  (category cadence)│      │  submission  │
//!    └─────────┬──────────┘      └──────┬───────┘
//!              │                        │
//!              └───────────┬────────────┘
//!                          │ submit(payload, priority)
//!                   ┌──────▼───────┐
//!                   │ Priority heap│◄─────────────┐
//!                   │  + registry  │              │ re-push after backoff
//!                   └──────┬───────┘              │
//!         ┌────────────────┼────────────────┐     │
//!         ▼                ▼                ▼     │
//!    ┌─────────┐      ┌─────────┐      ┌─────────┐│
//!    │ Worker 1│      │ Worker 2│      │ Worker N├┘
//!    └─────────┘      └─────────┘      └─────────┘
//!         │ JobHandler (content pipeline)
//!         ▼
//!   Completed / Retrying / Failed
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use news_forge::scheduler::{
//!     CategoryCatalog, PriorityJobQueue, QueueConfig, RecurringScheduler, SchedulerConfig,
//! };
//!
//! let queue = PriorityJobQueue::new(QueueConfig::default(), handler);
//! queue.start(5).await;
//!
//! let scheduler = RecurringScheduler::new(
//!     queue.clone(),
//!     CategoryCatalog::default(),
//!     SchedulerConfig::default(),
//! );
//! scheduler.start().await;
//!
//! // Graceful shutdown
//! scheduler.stop().await;
//! queue.stop().await?;
//! ```
//!
//! # Guarantees
//!
//! - **Exclusive extraction**: pops happen under the queue lock, so one job has one holder
//! - **Bounded retries**: each failure class has a ceiling; content-semantic failures never retry
//! - **Non-blocking backoff**: retry delays run on detached timers
//! - **Graceful shutdown**: workers finish their current job before stopping

pub mod catalog;
pub mod job;
pub mod queue;
pub mod recurring;
pub mod retry;
pub mod worker_pool;

// Re-export main types for convenience
pub use catalog::{Cadence, Category, CategoryCatalog, DEFAULT_CATEGORY_PRIORITY};
pub use job::{
    ContentOptions, ContentRequest, Job, JobId, JobKind, JobOutput, JobPayload, JobStatus,
    JobView, DEFAULT_MAX_RETRIES,
};
pub use queue::{
    PriorityJobQueue, QueueConfig, QueueError, QueueStats, DEFAULT_CAPACITY,
    DEFAULT_MAX_RETAINED_TERMINAL,
};
pub use recurring::{
    next_fire_after, RecurringScheduler, SchedulerConfig, SchedulerError, SchedulerStats,
    TriggerReport, TriggerSubmission,
};
pub use retry::{classify, FailureClass, RetryDecision, RetryPolicy};
pub use worker_pool::JobHandler;
