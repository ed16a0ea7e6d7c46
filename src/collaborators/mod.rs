//! Stage collaborators used by the content pipeline.
//!
//! Every external step the pipeline takes goes through one of the traits in
//! this module. The crate ships deterministic local implementations
//! ([`local`]), an HTTP fetcher ([`fetch`]) and the publish matrix fan-out
//! ([`publish`]). Remote services plug in by implementing the same traits.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use news_forge::collaborators::{Collaborators, HttpFetcher};
//!
//! let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(30))?);
//! let collaborators = Collaborators::local(fetcher);
//! ```

pub mod fetch;
pub mod local;
pub mod publish;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;

pub use fetch::{extract_article, HttpFetcher};
pub use local::{
    HeuristicVerifier, KeywordRelevanceFilter, LocalAnalyzer, LogPublisher, SummaryImprover,
    TemplateScriptWriter,
};
pub use publish::{publish_matrix, MatrixReport, PublishArtifact, PushOutcome};

/// Article text returned by a fetcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchedContent {
    pub url: String,
    pub title: String,
    pub content: String,
    pub fetched_at: DateTime<Utc>,
}

impl FetchedContent {
    pub fn new(url: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content: content.into(),
            fetched_at: Utc::now(),
        }
    }

    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

/// Relevance decision for fetched content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RelevanceVerdict {
    pub is_relevant: bool,
    /// Relevance score on a 0-100 scale.
    pub score: f64,
}

/// Credibility band derived from an authenticity score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credibility {
    High,
    Medium,
    #[default]
    Low,
}

impl Credibility {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Credibility::High
        } else if score >= 60.0 {
            Credibility::Medium
        } else {
            Credibility::Low
        }
    }
}

/// Authenticity result on a 0-100 scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub authenticity_score: f64,
    pub credibility: Credibility,
}

impl Verification {
    pub fn new(authenticity_score: f64) -> Self {
        Self {
            authenticity_score,
            credibility: Credibility::from_score(authenticity_score),
        }
    }
}

/// Input to script generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptRequest {
    pub title: String,
    pub content: String,
    pub authenticity_score: f64,
    /// Condensed guidance from a correction round, preferred over raw content.
    pub summary: Option<String>,
}

/// A generated video script.
///
/// A script produced after a generation error carries the error text in both
/// `text` and `error`, so downstream stages still have something to work with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub text: String,
    pub word_count: usize,
    pub error: Option<String>,
}

impl Script {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            word_count: text.split_whitespace().count(),
            text,
            error: None,
        }
    }

    pub fn degraded(error: &CollaboratorError) -> Self {
        Self {
            text: format!("Script generation error: {}", error),
            word_count: 0,
            error: Some(error.to_string()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Sentiment polarity label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    #[default]
    Neutral,
    Negative,
}

/// Sentiment with polarity in [-1, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    pub polarity: f64,
}

/// Guidance produced by a correction round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Improvement {
    pub summary: String,
}

/// Fetches article text for a URL.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedContent, CollaboratorError>;
}

/// Decides whether fetched content is worth processing.
#[async_trait]
pub trait RelevanceFilter: Send + Sync {
    async fn filter_relevance(
        &self,
        content: &str,
        title: &str,
    ) -> Result<RelevanceVerdict, CollaboratorError>;
}

/// Scores how trustworthy content looks.
#[async_trait]
pub trait AuthenticityVerifier: Send + Sync {
    async fn verify_authenticity(
        &self,
        content: &str,
        title: &str,
        url: &str,
    ) -> Result<Verification, CollaboratorError>;
}

/// Turns content into a video script.
#[async_trait]
pub trait ScriptWriter: Send + Sync {
    async fn generate_script(&self, request: &ScriptRequest) -> Result<Script, CollaboratorError>;
}

/// Classification, sentiment and summarization used when assembling results.
///
/// Callers fall back to [`LocalAnalyzer`] when a call fails.
#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    async fn classify(&self, content: &str) -> Result<Vec<String>, CollaboratorError>;

    async fn analyze_sentiment(&self, content: &str) -> Result<Sentiment, CollaboratorError>;

    async fn summarize(&self, content: &str, max_length: usize)
        -> Result<String, CollaboratorError>;
}

/// Produces guidance for regenerating a low-scoring script.
#[async_trait]
pub trait ScriptImprover: Send + Sync {
    async fn improve(
        &self,
        content: &str,
        script: &Script,
        max_length: usize,
    ) -> Result<Improvement, CollaboratorError>;
}

/// Pushes an artifact to one (channel, avatar) pair.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    async fn push_artifact(
        &self,
        channel: &str,
        avatar: &str,
        artifact: &PublishArtifact,
    ) -> Result<String, CollaboratorError>;
}

/// Every collaborator the pipeline needs.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn ContentFetcher>,
    pub relevance: Arc<dyn RelevanceFilter>,
    pub verifier: Arc<dyn AuthenticityVerifier>,
    pub script_writer: Arc<dyn ScriptWriter>,
    pub analyzer: Arc<dyn ContentAnalyzer>,
    pub improver: Arc<dyn ScriptImprover>,
    pub publisher: Arc<dyn ArtifactPublisher>,
}

impl Collaborators {
    /// Local heuristic collaborators around the given fetcher.
    pub fn local(fetcher: Arc<dyn ContentFetcher>) -> Self {
        Self {
            fetcher,
            relevance: Arc::new(KeywordRelevanceFilter::default()),
            verifier: Arc::new(HeuristicVerifier),
            script_writer: Arc::new(TemplateScriptWriter),
            analyzer: Arc::new(LocalAnalyzer),
            improver: Arc::new(SummaryImprover),
            publisher: Arc::new(LogPublisher),
        }
    }

    pub fn with_relevance(mut self, relevance: Arc<dyn RelevanceFilter>) -> Self {
        self.relevance = relevance;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn AuthenticityVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_script_writer(mut self, script_writer: Arc<dyn ScriptWriter>) -> Self {
        self.script_writer = script_writer;
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn ContentAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_improver(mut self, improver: Arc<dyn ScriptImprover>) -> Self {
        self.improver = improver;
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn ArtifactPublisher>) -> Self {
        self.publisher = publisher;
        self
    }
}
