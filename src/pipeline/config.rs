//! Configuration for the content pipeline and its quality gate.

use std::time::Duration;
use thiserror::Error;

use crate::quality::{
    ScoreWeights, Weighting, DEFAULT_HISTORY_WINDOW, DEFAULT_MAX_CORRECTION_ATTEMPTS,
    DEFAULT_QUALITY_THRESHOLD,
};

/// Upper bound accepted for `max_correction_attempts`.
pub const MAX_CORRECTION_ATTEMPTS_LIMIT: u32 = 10;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for [`ContentPipeline`](super::ContentPipeline).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Quality gate
    /// Composite score below which a correction round is requested.
    pub quality_threshold: f64,
    /// Bound on correction rounds per run.
    pub max_correction_attempts: u32,
    /// Base sub-score weights.
    pub weights: ScoreWeights,
    /// Shift weights with the trailing mean of recent composites.
    pub adaptive_weighting: bool,
    /// Number of composites kept for adaptive weighting.
    pub history_window: usize,

    // Stage settings
    /// Word budget for the final summary.
    pub summary_max_length: usize,
    /// Word budget for the summary produced by a correction round.
    pub correction_summary_length: usize,
    /// Authenticity used when verification is skipped or fails (0-100).
    pub fallback_authenticity: f64,
    /// Relevance cut-off for the local keyword filter (0-100).
    pub relevance_threshold: f64,
    /// Substitute local analysis when the analyzer fails, instead of failing the run.
    pub analysis_fallback: bool,
    /// Timeout for a single page fetch.
    pub fetch_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            max_correction_attempts: DEFAULT_MAX_CORRECTION_ATTEMPTS,
            weights: ScoreWeights::default(),
            adaptive_weighting: false,
            history_window: DEFAULT_HISTORY_WINDOW,

            summary_max_length: 150,
            correction_summary_length: 200,
            fallback_authenticity: 50.0,
            relevance_threshold: 50.0,
            analysis_fallback: true,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PIPELINE_QUALITY_THRESHOLD`: Composite threshold (default: 0.6)
    /// - `PIPELINE_MAX_CORRECTIONS`: Correction rounds per run (default: 3)
    /// - `PIPELINE_WEIGHTS`: Comma-separated tone,engagement,quality weights (default: 0.3,0.4,0.3)
    /// - `PIPELINE_ADAPTIVE_WEIGHTING`: Enable adaptive weighting (default: false)
    /// - `PIPELINE_HISTORY_WINDOW`: Composite history size (default: 20)
    /// - `PIPELINE_SUMMARY_MAX_LENGTH`: Final summary word budget (default: 150)
    /// - `PIPELINE_CORRECTION_SUMMARY_LENGTH`: Correction summary word budget (default: 200)
    /// - `PIPELINE_FALLBACK_AUTHENTICITY`: Authenticity when verification is unavailable (default: 50)
    /// - `PIPELINE_RELEVANCE_THRESHOLD`: Local relevance cut-off (default: 50)
    /// - `PIPELINE_ANALYSIS_FALLBACK`: Use local analysis on analyzer failure (default: true)
    /// - `PIPELINE_FETCH_TIMEOUT_SECS`: Page fetch timeout (default: 30)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable cannot be parsed or the result is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Quality gate
        if let Ok(val) = std::env::var("PIPELINE_QUALITY_THRESHOLD") {
            config.quality_threshold = parse_env_value(&val, "PIPELINE_QUALITY_THRESHOLD")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_MAX_CORRECTIONS") {
            config.max_correction_attempts = parse_env_value(&val, "PIPELINE_MAX_CORRECTIONS")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_WEIGHTS") {
            config.weights = parse_weights(&val, "PIPELINE_WEIGHTS")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_ADAPTIVE_WEIGHTING") {
            config.adaptive_weighting = parse_env_bool(&val, "PIPELINE_ADAPTIVE_WEIGHTING")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_HISTORY_WINDOW") {
            config.history_window = parse_env_value(&val, "PIPELINE_HISTORY_WINDOW")?;
        }

        // Stage settings
        if let Ok(val) = std::env::var("PIPELINE_SUMMARY_MAX_LENGTH") {
            config.summary_max_length = parse_env_value(&val, "PIPELINE_SUMMARY_MAX_LENGTH")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_CORRECTION_SUMMARY_LENGTH") {
            config.correction_summary_length =
                parse_env_value(&val, "PIPELINE_CORRECTION_SUMMARY_LENGTH")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_FALLBACK_AUTHENTICITY") {
            config.fallback_authenticity = parse_env_value(&val, "PIPELINE_FALLBACK_AUTHENTICITY")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_RELEVANCE_THRESHOLD") {
            config.relevance_threshold = parse_env_value(&val, "PIPELINE_RELEVANCE_THRESHOLD")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_ANALYSIS_FALLBACK") {
            config.analysis_fallback = parse_env_bool(&val, "PIPELINE_ANALYSIS_FALLBACK")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_FETCH_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "PIPELINE_FETCH_TIMEOUT_SECS")?;
            config.fetch_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(ConfigError::ValidationFailed(
                "quality_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.max_correction_attempts > MAX_CORRECTION_ATTEMPTS_LIMIT {
            return Err(ConfigError::ValidationFailed(format!(
                "max_correction_attempts cannot exceed {}",
                MAX_CORRECTION_ATTEMPTS_LIMIT
            )));
        }

        self.weights
            .validate()
            .map_err(ConfigError::ValidationFailed)?;

        if self.history_window == 0 {
            return Err(ConfigError::ValidationFailed(
                "history_window must be greater than 0".to_string(),
            ));
        }

        if self.summary_max_length == 0 || self.correction_summary_length == 0 {
            return Err(ConfigError::ValidationFailed(
                "summary lengths must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=100.0).contains(&self.fallback_authenticity) {
            return Err(ConfigError::ValidationFailed(
                "fallback_authenticity must be between 0 and 100".to_string(),
            ));
        }

        if !(0.0..=100.0).contains(&self.relevance_threshold) {
            return Err(ConfigError::ValidationFailed(
                "relevance_threshold must be between 0 and 100".to_string(),
            ));
        }

        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "fetch_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Weighting mode implied by `adaptive_weighting`.
    pub fn weighting(&self) -> Weighting {
        if self.adaptive_weighting {
            Weighting::Adaptive
        } else {
            Weighting::Fixed
        }
    }

    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    pub fn with_max_correction_attempts(mut self, max: u32) -> Self {
        self.max_correction_attempts = max;
        self
    }

    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_adaptive_weighting(mut self, enabled: bool) -> Self {
        self.adaptive_weighting = enabled;
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_summary_max_length(mut self, length: usize) -> Self {
        self.summary_max_length = length;
        self
    }

    pub fn with_correction_summary_length(mut self, length: usize) -> Self {
        self.correction_summary_length = length;
        self
    }

    pub fn with_fallback_authenticity(mut self, score: f64) -> Self {
        self.fallback_authenticity = score;
        self
    }

    pub fn with_relevance_threshold(mut self, threshold: f64) -> Self {
        self.relevance_threshold = threshold;
        self
    }

    pub fn with_analysis_fallback(mut self, enabled: bool) -> Self {
        self.analysis_fallback = enabled;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

/// Parse an environment variable value into a type.
pub(crate) fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
pub(crate) fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

fn parse_weights(value: &str, key: &str) -> Result<ScoreWeights, ConfigError> {
    let parts = value
        .split(',')
        .map(|part| parse_env_value::<f64>(part, key))
        .collect::<Result<Vec<_>, _>>()?;

    match parts.as_slice() {
        [tone, engagement, quality] => Ok(ScoreWeights::new(*tone, *engagement, *quality)),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected three comma-separated weights, got '{}'", value),
        }),
    }
}
