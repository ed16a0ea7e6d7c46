//! Failure classification and retry backoff.
//!
//! A failed attempt is classified into a [`FailureClass`], which fixes how many
//! retries the job may use. Delays come from a backoff ladder indexed by the
//! job's current retry count; past the end of the ladder the last step doubles
//! for every further retry.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{mentions_gateway, CollaboratorError, JobError, Service};

/// Default backoff ladder in seconds.
pub const DEFAULT_BACKOFF_LADDER_SECS: [u64; 3] = [30, 60, 300];

const GATEWAY_RETRY_CEILING: u32 = 3;
const TRANSIENT_RETRY_CEILING: u32 = 2;
const ANALYSIS_RETRY_CEILING: u32 = 2;
const PUBLISH_RETRY_CEILING: u32 = 5;

/// Retry class of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// 502/503/504 or an explicit gateway timeout.
    Gateway,
    /// Timeouts and connection failures.
    Transient,
    AnalysisService,
    PublishService,
    /// Irrelevant content or a malformed payload.
    ContentSemantic,
    Unknown,
}

impl FailureClass {
    /// Maximum retries for this class.
    ///
    /// Only `Unknown` uses the job's own budget. Every other class has a
    /// fixed ceiling that applies whatever `max_retries` the job carries, so
    /// a publish failure gets 5 retries even on a job with the default of 3,
    /// and a gateway failure gets 3 even on a job built with a budget of 0.
    pub fn retry_ceiling(&self, job_max_retries: u32) -> u32 {
        match self {
            FailureClass::Gateway => GATEWAY_RETRY_CEILING,
            FailureClass::Transient => TRANSIENT_RETRY_CEILING,
            FailureClass::AnalysisService => ANALYSIS_RETRY_CEILING,
            FailureClass::PublishService => PUBLISH_RETRY_CEILING,
            FailureClass::ContentSemantic => 0,
            FailureClass::Unknown => job_max_retries,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Gateway => "gateway",
            FailureClass::Transient => "transient",
            FailureClass::AnalysisService => "analysis_service",
            FailureClass::PublishService => "publish_service",
            FailureClass::ContentSemantic => "content_semantic",
            FailureClass::Unknown => "unknown",
        }
    }
}

/// Classifies a job failure. Rules apply in order: gateway, service-specific,
/// transient, content-semantic, unknown.
pub fn classify(error: &JobError) -> FailureClass {
    match error {
        JobError::NotRelevant { .. } | JobError::InvalidPayload(_) => {
            FailureClass::ContentSemantic
        }
        JobError::Timeout(_) => FailureClass::Transient,
        JobError::FetchFailed(source) => classify_collaborator(Service::Fetch, source),
        JobError::Collaborator { service, source } => classify_collaborator(*service, source),
        JobError::Other(message) => classify_message(message),
    }
}

fn classify_collaborator(service: Service, error: &CollaboratorError) -> FailureClass {
    if error.is_gateway() {
        return FailureClass::Gateway;
    }

    match service {
        Service::Analysis => return FailureClass::AnalysisService,
        Service::Publish => return FailureClass::PublishService,
        _ => {}
    }

    match error {
        CollaboratorError::Timeout(_) | CollaboratorError::Connection(_) => {
            FailureClass::Transient
        }
        CollaboratorError::Upstream { status, .. } if *status >= 500 => FailureClass::Transient,
        CollaboratorError::Upstream { .. } => FailureClass::Unknown,
        CollaboratorError::NoContent(message) | CollaboratorError::Other(message) => {
            classify_message(message)
        }
    }
}

fn classify_message(message: &str) -> FailureClass {
    if mentions_gateway(message) {
        return FailureClass::Gateway;
    }

    let lower = message.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") || lower.contains("connection") {
        FailureClass::Transient
    } else {
        FailureClass::Unknown
    }
}

/// Outcome of applying the retry policy to one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration, class: FailureClass },
    GiveUp { class: FailureClass },
}

/// Backoff ladder plus classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    ladder: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_BACKOFF_LADDER_SECS
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
        )
    }
}

impl RetryPolicy {
    pub fn new(ladder: Vec<Duration>) -> Self {
        Self { ladder }
    }

    pub fn ladder(&self) -> &[Duration] {
        &self.ladder
    }

    /// Delay before retry number `retry_count + 1`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let Some(last) = self.ladder.last() else {
            return Duration::ZERO;
        };

        let index = retry_count as usize;
        if let Some(delay) = self.ladder.get(index) {
            return *delay;
        }

        let doublings = (index - self.ladder.len() + 1).min(16) as u32;
        last.checked_mul(1u32 << doublings).unwrap_or(Duration::MAX)
    }

    /// Decides whether a job that has already used `retry_count` retries gets another.
    pub fn decide(&self, error: &JobError, retry_count: u32, max_retries: u32) -> RetryDecision {
        let class = classify(error);
        if retry_count < class.retry_ceiling(max_retries) {
            RetryDecision::Retry {
                delay: self.delay_for(retry_count),
                class,
            }
        } else {
            RetryDecision::GiveUp { class }
        }
    }
}
