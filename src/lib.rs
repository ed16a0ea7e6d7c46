//! news_forge: scheduled content processing.
//!
//! Source URLs are turned into video scripts by a staged pipeline with a
//! quality-gated correction loop. Jobs run on a bounded priority queue with
//! failure-class-aware retries, fed by per-category recurring triggers.

pub mod cli;
pub mod collaborators;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod quality;
pub mod scheduler;

pub use error::{CollaboratorError, JobError, Service};
pub use pipeline::{ContentJobHandler, ContentPipeline, PipelineConfig, ProcessedContent};
pub use quality::{QualityGate, ScoreReport};
pub use scheduler::{
    CategoryCatalog, ContentRequest, JobPayload, JobStatus, PriorityJobQueue, QueueConfig,
    QueueError, RecurringScheduler,
};
