//! Content pipeline: the per-job stage state machine.
//!
//! # Architecture
//!
//! - **Config**: thresholds, correction budget and fallbacks ([`PipelineConfig`])
//! - **State**: stages, allowed transitions and the per-run record ([`PipelineRun`])
//! - **Orchestrator**: drives collaborators and the quality gate ([`ContentPipeline`])
//! - **Handler**: adapts the pipeline to the job queue and publishes results
//!   ([`ContentJobHandler`])
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use news_forge::collaborators::{Collaborators, HttpFetcher};
//! use news_forge::pipeline::{ContentPipeline, PipelineConfig};
//! use news_forge::scheduler::ContentRequest;
//!
//! let config = PipelineConfig::from_env()?;
//! let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout)?);
//! let pipeline = ContentPipeline::new(config, Collaborators::local(fetcher));
//!
//! let outcome = pipeline.run(&ContentRequest::new("https://news.example/story")).await;
//! println!("finished in stage {}", outcome.run.stage);
//! ```

pub mod config;
pub mod handler;
pub mod orchestrator;
pub mod state;

pub use config::{ConfigError, PipelineConfig};
pub use handler::ContentJobHandler;
pub use orchestrator::{ContentPipeline, PipelineOutcome, ProcessedContent, ProcessingMetrics};
pub use state::{PipelineRun, Stage, StageOutput, TransitionError};
