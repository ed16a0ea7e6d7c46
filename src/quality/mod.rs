//! Quality gate for generated scripts.
//!
//! A [`Scorer`] produces tone, engagement and quality sub-scores; the
//! [`QualityGate`] combines them with [`ScoreWeights`] into a composite and
//! decides whether the pipeline should run another correction round.
//! With [`Weighting::Adaptive`] the weights drift with the trailing mean of
//! recent composites kept in a [`ScoreHistory`].

mod gate;
mod scorer;
mod weights;

pub use gate::{
    QualityGate, ScoreDistribution, ScoreReport, DEFAULT_MAX_CORRECTION_ATTEMPTS,
    DEFAULT_QUALITY_THRESHOLD,
};
pub use scorer::{HeuristicScorer, Scorer, ScoringInput, SubScores};
pub use weights::{ScoreHistory, ScoreWeights, Weighting, DEFAULT_HISTORY_WINDOW};
