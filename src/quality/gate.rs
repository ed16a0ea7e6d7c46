//! The quality gate: composite scoring and the correction decision.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::metrics::MetricsCollector;

use super::scorer::{HeuristicScorer, Scorer, ScoringInput, SubScores};
use super::weights::{ScoreHistory, ScoreWeights, Weighting, DEFAULT_HISTORY_WINDOW};

/// Default composite threshold below which a correction is requested.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.6;

/// Default bound on correction rounds per run.
pub const DEFAULT_MAX_CORRECTION_ATTEMPTS: u32 = 3;

/// Result of one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub composite_score: f64,
    pub sub_scores: SubScores,
    /// Weights used for this evaluation.
    pub weights: ScoreWeights,
    /// Composite is at or above the threshold.
    pub passed: bool,
    /// Composite is below the threshold and correction budget remains.
    pub correction_needed: bool,
    /// Correction rounds already spent when this evaluation ran.
    pub attempts: u32,
}

/// Composite scores in history, bucketed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreDistribution {
    /// `>= 0.8`
    pub excellent: usize,
    /// `[0.6, 0.8)`
    pub good: usize,
    /// `[0.4, 0.6)`
    pub needs_improvement: usize,
    /// `< 0.4`
    pub poor: usize,
}

/// Scores scripts and decides whether another correction round is allowed.
pub struct QualityGate {
    threshold: f64,
    max_attempts: u32,
    weights: ScoreWeights,
    weighting: Weighting,
    scorer: Arc<dyn Scorer>,
    history: Mutex<ScoreHistory>,
    metrics: MetricsCollector,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY_THRESHOLD, DEFAULT_MAX_CORRECTION_ATTEMPTS)
    }
}

impl std::fmt::Debug for QualityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityGate")
            .field("threshold", &self.threshold)
            .field("max_attempts", &self.max_attempts)
            .field("weights", &self.weights)
            .field("weighting", &self.weighting)
            .finish_non_exhaustive()
    }
}

impl QualityGate {
    pub fn new(threshold: f64, max_attempts: u32) -> Self {
        Self {
            threshold,
            max_attempts,
            weights: ScoreWeights::default(),
            weighting: Weighting::Fixed,
            scorer: Arc::new(HeuristicScorer),
            history: Mutex::new(ScoreHistory::new(DEFAULT_HISTORY_WINDOW)),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_weighting(mut self, weighting: Weighting) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history = Mutex::new(ScoreHistory::new(window));
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `composite < threshold` and budget remains.
    pub fn needs_correction(&self, composite: f64, attempts: u32) -> bool {
        composite < self.threshold && attempts < self.max_attempts
    }

    /// Weights the next evaluation will use.
    pub fn current_weights(&self) -> ScoreWeights {
        match self.weighting {
            Weighting::Fixed => self.weights,
            Weighting::Adaptive => {
                let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
                self.weights.adapted(history.mean())
            }
        }
    }

    /// Score one script and record the composite in the rolling history.
    pub fn evaluate(&self, input: &ScoringInput<'_>, attempts: u32) -> ScoreReport {
        let sub_scores = self.scorer.score(input);

        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let weights = match self.weighting {
            Weighting::Fixed => self.weights,
            Weighting::Adaptive => self.weights.adapted(history.mean()),
        };
        let composite_score = weights.combine(&sub_scores);
        history.push(composite_score);
        drop(history);

        self.metrics.record_quality_score(composite_score);

        let report = ScoreReport {
            composite_score,
            sub_scores,
            weights,
            passed: composite_score >= self.threshold,
            correction_needed: self.needs_correction(composite_score, attempts),
            attempts,
        };

        debug!(
            composite = report.composite_score,
            tone = sub_scores.tone,
            engagement = sub_scores.engagement,
            quality = sub_scores.quality,
            attempts = attempts,
            correction_needed = report.correction_needed,
            "Quality evaluated"
        );

        report
    }

    pub fn history_len(&self) -> usize {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn score_distribution(&self) -> ScoreDistribution {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let mut distribution = ScoreDistribution::default();
        for score in history.iter() {
            if score >= 0.8 {
                distribution.excellent += 1;
            } else if score >= 0.6 {
                distribution.good += 1;
            } else if score >= 0.4 {
                distribution.needs_improvement += 1;
            } else {
                distribution.poor += 1;
            }
        }
        distribution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns the same sub-score for every dimension.
    struct FixedScorer(f64);

    impl Scorer for FixedScorer {
        fn score(&self, _input: &ScoringInput<'_>) -> SubScores {
            SubScores {
                tone: self.0,
                engagement: self.0,
                quality: self.0,
            }
        }
    }

    fn input() -> ScoringInput<'static> {
        ScoringInput {
            title: "t",
            content: "c",
            script: "s",
            authenticity_score: 50.0,
        }
    }

    fn gate(score: f64) -> QualityGate {
        QualityGate::default().with_scorer(Arc::new(FixedScorer(score)))
    }

    #[test]
    fn test_low_score_needs_correction_while_budget_remains() {
        let gate = gate(0.4);
        let report = gate.evaluate(&input(), 0);
        assert!((report.composite_score - 0.4).abs() < 1e-9);
        assert!(report.correction_needed);
        assert!(!report.passed);

        let report = gate.evaluate(&input(), 3);
        assert!(!report.correction_needed);
        assert!(!report.passed);
    }

    #[test]
    fn test_threshold_is_inclusive_pass() {
        let gate = gate(0.6);
        let report = gate.evaluate(&input(), 0);
        assert!(report.passed);
        assert!(!report.correction_needed);
    }

    #[test]
    fn test_evaluate_appends_history() {
        let gate = gate(0.5).with_history_window(2);
        for _ in 0..5 {
            gate.evaluate(&input(), 0);
        }
        assert_eq!(gate.history_len(), 2);
    }

    #[test]
    fn test_adaptive_weighting_uses_prior_history() {
        let gate = gate(0.3).with_weighting(Weighting::Adaptive);

        let first = gate.evaluate(&input(), 0);
        assert_eq!(first.weights, ScoreWeights::default());

        // Low first composite moves weight to engagement for the next call.
        assert!(first.composite_score < 0.5);
        let shifted = gate.current_weights();
        assert!((shifted.engagement - 0.5).abs() < 1e-9);
        assert!((shifted.quality - 0.2).abs() < 1e-9);

        let second = gate.evaluate(&input(), 0);
        assert_eq!(second.weights, shifted);
    }

    #[test]
    fn test_fixed_weighting_ignores_history() {
        let gate = gate(0.95);
        gate.evaluate(&input(), 0);
        assert_eq!(gate.current_weights(), ScoreWeights::default());
    }

    #[test]
    fn test_score_distribution_buckets() {
        let gate = QualityGate::default();
        {
            let mut history = gate.history.lock().unwrap();
            for score in [0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.39, 0.0] {
                history.push(score);
            }
        }
        assert_eq!(
            gate.score_distribution(),
            ScoreDistribution {
                excellent: 2,
                good: 2,
                needs_improvement: 2,
                poor: 2,
            }
        );
    }
}
