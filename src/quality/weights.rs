//! Composite weights and the rolling score history behind adaptive weighting.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::scorer::SubScores;

/// Default number of composite scores kept for adaptive weighting.
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

/// Weight moved between engagement and quality per adjustment.
pub const ADAPTIVE_SHIFT: f64 = 0.1;

/// Trailing mean above which weight moves toward quality.
pub const HIGH_MEAN: f64 = 0.7;

/// Trailing mean below which weight moves toward engagement.
pub const LOW_MEAN: f64 = 0.5;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Weights applied to the sub-scores to form the composite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub tone: f64,
    pub engagement: f64,
    pub quality: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            tone: 0.3,
            engagement: 0.4,
            quality: 0.3,
        }
    }
}

impl ScoreWeights {
    pub fn new(tone: f64, engagement: f64, quality: f64) -> Self {
        Self {
            tone,
            engagement,
            quality,
        }
    }

    pub fn sum(&self) -> f64 {
        self.tone + self.engagement + self.quality
    }

    /// Check that every weight is non-negative and they sum to 1.
    pub fn validate(&self) -> Result<(), String> {
        if [self.tone, self.engagement, self.quality]
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
        {
            return Err(format!("weights must be non-negative, got {:?}", self));
        }
        if (self.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(format!("weights must sum to 1.0, got {:.6}", self.sum()));
        }
        Ok(())
    }

    /// Clamp negatives to zero and scale to a sum of 1. All-zero weights
    /// become the defaults.
    pub fn normalized(&self) -> Self {
        let clamped = Self::new(
            self.tone.max(0.0),
            self.engagement.max(0.0),
            self.quality.max(0.0),
        );
        let sum = clamped.sum();
        if sum <= 0.0 {
            return Self::default();
        }
        Self::new(
            clamped.tone / sum,
            clamped.engagement / sum,
            clamped.quality / sum,
        )
    }

    pub fn combine(&self, scores: &SubScores) -> f64 {
        (scores.tone * self.tone + scores.engagement * self.engagement + scores.quality * self.quality)
            .clamp(0.0, 1.0)
    }

    /// Weights after one adaptive step for the given trailing mean.
    ///
    /// Adjustments are always relative to `self`; they do not accumulate.
    pub fn adapted(&self, trailing_mean: Option<f64>) -> Self {
        let Some(mean) = trailing_mean else {
            return *self;
        };

        let mut shifted = *self;
        if mean > HIGH_MEAN {
            shifted.engagement -= ADAPTIVE_SHIFT;
            shifted.quality += ADAPTIVE_SHIFT;
        } else if mean < LOW_MEAN {
            shifted.quality -= ADAPTIVE_SHIFT;
            shifted.engagement += ADAPTIVE_SHIFT;
        } else {
            return *self;
        }
        shifted.normalized()
    }
}

/// How the gate picks the weights for each evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    #[default]
    Fixed,
    /// Shift weights using the trailing mean of recent composites.
    Adaptive,
}

/// Bounded ring buffer of recent composite scores.
#[derive(Debug, Clone)]
pub struct ScoreHistory {
    window: usize,
    scores: VecDeque<f64>,
}

impl Default for ScoreHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

impl ScoreHistory {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            scores: VecDeque::with_capacity(window),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn push(&mut self, score: f64) {
        if self.scores.len() == self.window {
            self.scores.pop_front();
        }
        self.scores.push_back(score);
    }

    pub fn mean(&self) -> Option<f64> {
        if self.scores.is_empty() {
            None
        } else {
            Some(self.scores.iter().sum::<f64>() / self.scores.len() as f64)
        }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.scores.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_default_weights_valid() {
        let weights = ScoreWeights::default();
        assert!(weights.validate().is_ok());
        assert!(approx(weights.sum(), 1.0));
    }

    #[test]
    fn test_validate_rejects_bad_weights() {
        assert!(ScoreWeights::new(0.5, 0.5, 0.5).validate().is_err());
        assert!(ScoreWeights::new(-0.1, 0.6, 0.5).validate().is_err());
        assert!(ScoreWeights::new(f64::NAN, 0.5, 0.5).validate().is_err());
    }

    #[test]
    fn test_combine() {
        let scores = SubScores {
            tone: 1.0,
            engagement: 0.5,
            quality: 0.0,
        };
        assert!(approx(ScoreWeights::default().combine(&scores), 0.5));
    }

    #[test]
    fn test_adapted_shifts_toward_quality_on_high_mean() {
        let weights = ScoreWeights::default().adapted(Some(0.8));
        assert!(approx(weights.engagement, 0.3));
        assert!(approx(weights.quality, 0.4));
        assert!(approx(weights.tone, 0.3));
    }

    #[test]
    fn test_adapted_shifts_toward_engagement_on_low_mean() {
        let weights = ScoreWeights::default().adapted(Some(0.3));
        assert!(approx(weights.engagement, 0.5));
        assert!(approx(weights.quality, 0.2));
    }

    #[test]
    fn test_adapted_keeps_weights_in_band_or_without_history() {
        let base = ScoreWeights::default();
        assert_eq!(base.adapted(Some(0.6)), base);
        assert_eq!(base.adapted(None), base);
    }

    #[test]
    fn test_adapted_clamps_and_renormalizes() {
        let weights = ScoreWeights::new(0.5, 0.45, 0.05).adapted(Some(0.2));
        assert!(weights.quality >= 0.0);
        assert!(approx(weights.sum(), 1.0));
        assert!(approx(weights.quality, 0.0));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = ScoreHistory::new(3);
        assert_eq!(history.mean(), None);
        for score in [0.1, 0.2, 0.3, 0.9] {
            history.push(score);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.iter().collect::<Vec<_>>(), vec![0.2, 0.3, 0.9]);
        assert!(approx(history.mean().unwrap_or_default(), 1.4 / 3.0));
    }
}
