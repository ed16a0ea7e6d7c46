//! Error types for news_forge operations.
//!
//! Defines the failure vocabulary shared by the pipeline and the job queue:
//! - Collaborator failures (fetch, analysis, publish and the other stage services)
//! - Job-level failures that feed the retry policy

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// External service a stage talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Fetch,
    Relevance,
    Authenticity,
    Script,
    Analysis,
    Improve,
    Publish,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Fetch => "fetch",
            Service::Relevance => "relevance",
            Service::Authenticity => "authenticity",
            Service::Script => "script",
            Service::Analysis => "analysis",
            Service::Improve => "improve",
            Service::Publish => "publish",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by stage collaborators.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CollaboratorError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("No content: {0}")]
    NoContent(String),

    #[error("{0}")]
    Other(String),
}

impl CollaboratorError {
    /// Returns true for 502/503/504 responses or messages naming a gateway timeout.
    pub fn is_gateway(&self) -> bool {
        match self {
            CollaboratorError::Upstream { status, .. } => matches!(status, 502..=504),
            other => mentions_gateway(&other.to_string()),
        }
    }
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CollaboratorError::Timeout(e.to_string())
        } else if e.is_connect() {
            CollaboratorError::Connection(e.to_string())
        } else if let Some(status) = e.status() {
            CollaboratorError::Upstream {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            CollaboratorError::Other(e.to_string())
        }
    }
}

pub(crate) fn mentions_gateway(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("504") || lower.contains("gateway timeout")
}

/// Failure of one job attempt.
///
/// The queue's retry policy classifies these; content-semantic variants are
/// terminal, everything else is retried within a class-specific ceiling.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error("fetch failed: {0}")]
    FetchFailed(#[source] CollaboratorError),

    #[error("{service} service failed: {source}")]
    Collaborator {
        service: Service,
        #[source]
        source: CollaboratorError,
    },

    #[error("content not relevant (relevance score {score:.1})")]
    NotRelevant { score: f64 },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("job timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

impl JobError {
    /// Builds a collaborator failure for the given service.
    pub fn service(service: Service, source: CollaboratorError) -> Self {
        JobError::Collaborator { service, source }
    }

    /// Deliberate exclusions and malformed input. Never retried.
    pub fn is_content_semantic(&self) -> bool {
        matches!(
            self,
            JobError::NotRelevant { .. } | JobError::InvalidPayload(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_detection() {
        let err = CollaboratorError::Upstream {
            status: 504,
            message: "bad gateway".to_string(),
        };
        assert!(err.is_gateway());

        let err = CollaboratorError::Upstream {
            status: 404,
            message: "missing".to_string(),
        };
        assert!(!err.is_gateway());

        let err = CollaboratorError::Other("upstream said Gateway Timeout".to_string());
        assert!(err.is_gateway());

        let err = CollaboratorError::Connection("refused".to_string());
        assert!(!err.is_gateway());
    }

    #[test]
    fn test_job_error_display() {
        let err = JobError::FetchFailed(CollaboratorError::NoContent("empty body".to_string()));
        assert!(err.to_string().starts_with("fetch failed"));

        let err = JobError::NotRelevant { score: 20.0 };
        assert!(err.to_string().contains("not relevant"));
        assert!(err.to_string().contains("20.0"));

        let err = JobError::service(
            Service::Publish,
            CollaboratorError::Other("rejected".to_string()),
        );
        assert_eq!(err.to_string(), "publish service failed: rejected");
    }

    #[test]
    fn test_content_semantic() {
        assert!(JobError::NotRelevant { score: 10.0 }.is_content_semantic());
        assert!(JobError::InvalidPayload("no url".to_string()).is_content_semantic());
        assert!(!JobError::Timeout(Duration::from_secs(1)).is_content_semantic());
        assert!(!JobError::Other("boom".to_string()).is_content_semantic());
    }
}
