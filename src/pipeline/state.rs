//! Stage state machine for one pipeline run.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collaborators::{FetchedContent, Improvement, RelevanceVerdict, Script, Verification};
use crate::quality::ScoreReport;

/// A step of the content pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Fetching,
    Filtering,
    Verifying,
    Scripting,
    Evaluating,
    Correcting,
    Completed,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Fetching => "fetching",
            Stage::Filtering => "filtering",
            Stage::Verifying => "verifying",
            Stage::Scripting => "scripting",
            Stage::Evaluating => "evaluating",
            Stage::Correcting => "correcting",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    /// Stages reachable in one step, not counting the universal move to Failed.
    ///
    /// Correcting may go straight to Completed when no improved input could
    /// be produced.
    pub fn successors(&self) -> &'static [Stage] {
        match self {
            Stage::Start => &[Stage::Fetching],
            Stage::Fetching => &[Stage::Filtering],
            Stage::Filtering => &[Stage::Verifying],
            Stage::Verifying => &[Stage::Scripting],
            Stage::Scripting => &[Stage::Evaluating],
            Stage::Evaluating => &[Stage::Completed, Stage::Correcting],
            Stage::Correcting => &[Stage::Scripting, Stage::Completed],
            Stage::Completed | Stage::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, next: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Stage::Failed || self.successors().contains(&next)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected stage transition.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("invalid transition from {from} to {to}: {reason}")]
pub struct TransitionError {
    pub from: Stage,
    pub to: Stage,
    pub reason: String,
}

/// Output recorded for a stage. Re-run stages overwrite their entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageOutput {
    Fetched(FetchedContent),
    Relevance(RelevanceVerdict),
    Verification(Verification),
    Script(Script),
    Evaluation(ScoreReport),
    Correction(Improvement),
}

impl StageOutput {
    pub fn stage(&self) -> Stage {
        match self {
            StageOutput::Fetched(_) => Stage::Fetching,
            StageOutput::Relevance(_) => Stage::Filtering,
            StageOutput::Verification(_) => Stage::Verifying,
            StageOutput::Script(_) => Stage::Scripting,
            StageOutput::Evaluation(_) => Stage::Evaluating,
            StageOutput::Correction(_) => Stage::Correcting,
        }
    }
}

/// Execution state of one job through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub stage: Stage,
    /// Every stage entered, in order, starting with Start.
    pub history: Vec<Stage>,
    pub stage_outputs: BTreeMap<Stage, StageOutput>,
    /// Non-fatal anomalies, prefixed with the stage they happened in.
    pub errors: Vec<String>,
    pub correction_attempts: u32,
    pub max_correction_attempts: u32,
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(max_correction_attempts: u32) -> Self {
        Self {
            stage: Stage::Start,
            history: vec![Stage::Start],
            stage_outputs: BTreeMap::new(),
            errors: Vec::new(),
            correction_attempts: 0,
            max_correction_attempts,
            failure: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Move to `next`. Entering Correcting spends one correction attempt.
    pub fn enter(&mut self, next: Stage) -> Result<(), TransitionError> {
        if !self.stage.can_transition_to(next) {
            return Err(TransitionError {
                from: self.stage,
                to: next,
                reason: "transition not allowed".to_string(),
            });
        }

        if next == Stage::Correcting {
            if !self.can_correct() {
                return Err(TransitionError {
                    from: self.stage,
                    to: next,
                    reason: format!(
                        "correction budget of {} exhausted",
                        self.max_correction_attempts
                    ),
                });
            }
            self.correction_attempts += 1;
        }

        self.stage = next;
        self.history.push(next);
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Terminate the run as Failed. No-op once terminal.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.stage.is_terminal() {
            return;
        }
        self.failure = Some(reason.into());
        self.stage = Stage::Failed;
        self.history.push(Stage::Failed);
        self.finished_at = Some(Utc::now());
    }

    pub fn can_correct(&self) -> bool {
        self.correction_attempts < self.max_correction_attempts
    }

    pub fn record(&mut self, output: StageOutput) {
        self.stage_outputs.insert(output.stage(), output);
    }

    pub fn record_error(&mut self, message: impl fmt::Display) {
        self.errors.push(format!("{}: {}", self.stage, message));
    }

    /// Records a diagnostic under `label` instead of the current stage, for
    /// work that happens outside the stage sequence.
    pub fn record_error_as(&mut self, label: &str, message: impl fmt::Display) {
        self.errors.push(format!("{}: {}", label, message));
    }

    pub fn output(&self, stage: Stage) -> Option<&StageOutput> {
        self.stage_outputs.get(&stage)
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Stages entered after Start.
    pub fn stage_count(&self) -> usize {
        self.history.len().saturating_sub(1)
    }

    /// Times the run entered `stage`.
    pub fn visits(&self, stage: Stage) -> usize {
        self.history.iter().filter(|s| **s == stage).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advance(run: &mut PipelineRun, stages: &[Stage]) {
        for stage in stages {
            run.enter(*stage).unwrap();
        }
    }

    const TO_EVALUATING: [Stage; 5] = [
        Stage::Fetching,
        Stage::Filtering,
        Stage::Verifying,
        Stage::Scripting,
        Stage::Evaluating,
    ];

    #[test]
    fn test_forward_path() {
        let mut run = PipelineRun::new(3);
        advance(&mut run, &TO_EVALUATING);
        run.enter(Stage::Completed).unwrap();

        assert!(run.is_terminal());
        assert!(run.finished_at.is_some());
        assert_eq!(run.stage_count(), 6);
    }

    #[test]
    fn test_skipping_a_stage_is_rejected() {
        let mut run = PipelineRun::new(3);
        let err = run.enter(Stage::Filtering).unwrap_err();
        assert_eq!(err.from, Stage::Start);
        assert_eq!(err.to, Stage::Filtering);
        assert_eq!(run.stage, Stage::Start);
    }

    #[test]
    fn test_correction_cycle_is_bounded() {
        let mut run = PipelineRun::new(2);
        advance(&mut run, &TO_EVALUATING);

        for _ in 0..2 {
            advance(
                &mut run,
                &[Stage::Correcting, Stage::Scripting, Stage::Evaluating],
            );
        }
        assert_eq!(run.correction_attempts, 2);

        let err = run.enter(Stage::Correcting).unwrap_err();
        assert!(err.reason.contains("exhausted"));
        assert_eq!(run.correction_attempts, 2);

        run.enter(Stage::Completed).unwrap();
        assert_eq!(run.visits(Stage::Evaluating), 3);
    }

    #[test]
    fn test_any_stage_can_fail_but_terminal_is_final() {
        let mut run = PipelineRun::new(3);
        run.enter(Stage::Fetching).unwrap();
        run.fail("fetch failed: timeout");

        assert_eq!(run.stage, Stage::Failed);
        assert_eq!(run.failure.as_deref(), Some("fetch failed: timeout"));

        run.fail("second failure");
        assert_eq!(run.failure.as_deref(), Some("fetch failed: timeout"));
        assert!(run.enter(Stage::Filtering).is_err());
    }

    #[test]
    fn test_errors_are_prefixed_with_stage() {
        let mut run = PipelineRun::new(3);
        advance(&mut run, &[Stage::Fetching, Stage::Filtering, Stage::Verifying]);
        run.record_error("verifier unavailable");
        assert_eq!(run.errors, vec!["verifying: verifier unavailable"]);
    }

    #[test]
    fn test_labelled_errors_ignore_stage() {
        let mut run = PipelineRun::new(3);
        advance(&mut run, &[Stage::Fetching, Stage::Filtering]);
        run.record_error_as("analysis", "classify failed");
        assert_eq!(run.errors, vec!["analysis: classify failed"]);
    }

    #[test]
    fn test_rerun_stage_overwrites_output() {
        let mut run = PipelineRun::new(3);
        run.record(StageOutput::Script(Script::new("first")));
        run.record(StageOutput::Script(Script::new("second")));

        assert_eq!(run.stage_outputs.len(), 1);
        match run.output(Stage::Scripting) {
            Some(StageOutput::Script(script)) => assert_eq!(script.text, "second"),
            other => panic!("unexpected output: {:?}", other),
        }
    }
}
