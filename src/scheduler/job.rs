//! Job definitions for the scheduler.
//!
//! This module defines the core job types used by the queue:
//!
//! - `Job`: A unit of work owned by the queue until it reaches a terminal state
//! - `JobPayload`: Typed input, one variant per job kind
//! - `JobView`: Read-only snapshot handed to callers
//! - `JobStatus`: Lifecycle state of a job

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::collaborators::MatrixReport;
use crate::pipeline::ProcessedContent;

/// Identifier assigned to a job at submission.
pub type JobId = Uuid;

/// Default maximum number of retries for a job.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Which pipeline a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    ContentProcessing,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::ContentProcessing => write!(f, "content_processing"),
        }
    }
}

/// Per-request switches and routing for content processing.
///
/// `extra` carries collaborator-specific fields the core never interprets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContentOptions {
    pub channels: Vec<String>,
    pub avatars: Vec<String>,
    pub voice: Option<String>,
    pub enable_publish: bool,
    pub enable_audio: bool,
    pub force_correction: bool,
    pub skip_verification: bool,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for ContentOptions {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            avatars: Vec::new(),
            voice: None,
            enable_publish: true,
            enable_audio: true,
            force_correction: false,
            skip_verification: false,
            extra: serde_json::Map::new(),
        }
    }
}

impl ContentOptions {
    /// Sets the publish channels.
    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the publish avatars.
    pub fn with_avatars<I, S>(mut self, avatars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.avatars = avatars.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the voice used for audio rendering.
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    /// Enables or disables the publish fan-out.
    pub fn with_publish(mut self, enabled: bool) -> Self {
        self.enable_publish = enabled;
        self
    }

    /// Enables or disables audio rendering.
    pub fn with_audio(mut self, enabled: bool) -> Self {
        self.enable_audio = enabled;
        self
    }

    /// Forces one correction cycle even when the first evaluation passes.
    pub fn with_force_correction(mut self, force: bool) -> Self {
        self.force_correction = force;
        self
    }

    /// Skips the authenticity collaborator.
    pub fn with_skip_verification(mut self, skip: bool) -> Self {
        self.skip_verification = skip;
        self
    }
}

/// Input for a content-processing job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentRequest {
    pub url: String,
    #[serde(default)]
    pub options: ContentOptions,
}

impl ContentRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: ContentOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ContentOptions) -> Self {
        self.options = options;
        self
    }

    /// Checks that the URL parses as an http(s) URL with a host.
    pub fn validate(&self) -> Result<(), String> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err("url is required".to_string());
        }

        let parsed = Url::parse(url).map_err(|e| format!("invalid url '{}': {}", url, e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!("url must use http or https: '{}'", url));
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(format!("url has no host: '{}'", url));
        }

        Ok(())
    }
}

/// Typed job input, one variant per kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    ContentProcessing(ContentRequest),
}

impl JobPayload {
    /// Shorthand for a content-processing payload with default options.
    pub fn content(url: impl Into<String>) -> Self {
        JobPayload::ContentProcessing(ContentRequest::new(url))
    }

    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::ContentProcessing(_) => JobKind::ContentProcessing,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            JobPayload::ContentProcessing(request) => &request.url,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            JobPayload::ContentProcessing(request) => request.validate(),
        }
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Retrying,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Retrying => write!(f, "retrying"),
        }
    }
}

/// What a successful job produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobOutput {
    pub content: ProcessedContent,
    /// Present when the publish fan-out ran.
    pub publish: Option<MatrixReport>,
}

/// A unit of work owned by the queue.
///
/// Only the worker currently holding a job mutates it; the queue registry
/// applies those mutations under its lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub payload: JobPayload,
    /// Higher values are served first. Never changes after submission.
    pub priority: i32,
    pub status: JobStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub result: Option<JobOutput>,
}

impl Job {
    pub fn new(payload: JobPayload, priority: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            priority,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            next_retry_at: None,
            last_error: None,
            result: None,
        }
    }

    /// Retry budget for failures the queue cannot classify. Classified
    /// failures (gateway, transient, service) use their own fixed ceilings.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn kind(&self) -> JobKind {
        self.payload.kind()
    }

    /// Clears run state so the job enters the queue as new.
    pub(crate) fn reset_for_submit(&mut self) {
        self.status = JobStatus::Pending;
        self.retry_count = 0;
        self.started_at = None;
        self.completed_at = None;
        self.next_retry_at = None;
        self.last_error = None;
        self.result = None;
    }

    pub(crate) fn mark_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
        self.next_retry_at = None;
    }

    pub(crate) fn mark_completed(&mut self, output: JobOutput) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.last_error = None;
        self.result = Some(output);
    }

    pub(crate) fn mark_retrying(&mut self, error: String, retry_at: DateTime<Utc>) {
        self.status = JobStatus::Retrying;
        self.retry_count += 1;
        self.next_retry_at = Some(retry_at);
        self.last_error = Some(error);
    }

    pub(crate) fn mark_pending(&mut self) {
        self.status = JobStatus::Pending;
        self.next_retry_at = None;
    }

    pub(crate) fn mark_failed(&mut self, error: String) {
        self.status = JobStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.next_retry_at = None;
        self.last_error = Some(error);
    }

    pub fn view(&self) -> JobView {
        JobView {
            id: self.id,
            kind: self.kind(),
            url: self.payload.url().to_string(),
            priority: self.priority,
            status: self.status,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            next_retry_at: self.next_retry_at,
            last_error: self.last_error.clone(),
            result: self.result.clone(),
        }
    }
}

/// Snapshot of a job returned by status lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub kind: JobKind,
    pub url: String,
    pub priority: i32,
    pub status: JobStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub result: Option<JobOutput>,
}

impl JobView {
    /// Time from submission to the terminal state.
    pub fn latency(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.created_at)
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }
}
