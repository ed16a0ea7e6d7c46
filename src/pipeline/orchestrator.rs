//! Runs one content request through the stage state machine.
//!
//! ```text
//! Start -> Fetching -> Filtering -> Verifying -> Scripting -> Evaluating -> Completed
//!                                                    ^            |
//!                                                    +-Correcting-+   (bounded)
//! ```
//!
//! Fetch failures and irrelevant content end the run as Failed. A failed
//! verification or script generation is recorded and the run continues
//! with a fallback value.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::collaborators::local::leading_summary;
use crate::collaborators::{
    Collaborators, Credibility, FetchedContent, LocalAnalyzer, Script, ScriptRequest, Sentiment,
    Verification,
};
use crate::error::{CollaboratorError, JobError, Service};
use crate::metrics::MetricsCollector;
use crate::quality::{QualityGate, ScoreReport, ScoringInput};
use crate::scheduler::ContentRequest;

use super::config::PipelineConfig;
use super::state::{PipelineRun, Stage, StageOutput, TransitionError};

/// Run metrics attached to a completed artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    /// Stages entered after Start, counting re-runs.
    pub stage_count: usize,
    /// Correction rounds spent.
    pub retries_used: u32,
    pub processing_time_ms: u64,
    /// The shipped script reached the quality threshold.
    pub quality_gate_passed: bool,
}

/// The artifact produced by a Completed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedContent {
    pub url: String,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub categories: Vec<String>,
    pub sentiment: Sentiment,
    pub script: Script,
    pub authenticity_score: f64,
    pub credibility: Credibility,
    /// Composite score of the shipped script.
    pub reward_score: f64,
    pub score_report: ScoreReport,
    pub correction_attempts: u32,
    /// Diagnostics collected on the way, even though the run completed.
    pub errors: Vec<String>,
    pub metrics: ProcessingMetrics,
    pub fetched_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// A finished run and its result.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub run: PipelineRun,
    pub result: Result<ProcessedContent, JobError>,
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

fn transition_failure(e: TransitionError) -> JobError {
    JobError::Other(e.to_string())
}

/// Highest composite seen so far. Ties go to the later attempt.
struct BestAttempt {
    report: ScoreReport,
    script: Script,
}

/// Drives content requests through fetch, filter, verify, script and the
/// quality-gated correction loop.
pub struct ContentPipeline {
    config: PipelineConfig,
    collaborators: Collaborators,
    gate: QualityGate,
    metrics: MetricsCollector,
}

impl ContentPipeline {
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Self {
        let gate = QualityGate::new(config.quality_threshold, config.max_correction_attempts)
            .with_weights(config.weights)
            .with_weighting(config.weighting())
            .with_history_window(config.history_window);

        Self {
            config,
            collaborators,
            gate,
            metrics: MetricsCollector::new(),
        }
    }

    /// Replace the quality gate. Its attempt budget should match the config.
    pub fn with_gate(mut self, gate: QualityGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn gate(&self) -> &QualityGate {
        &self.gate
    }

    /// Process one request to a terminal stage.
    pub async fn run(&self, request: &ContentRequest) -> PipelineOutcome {
        let started = Instant::now();
        let mut run = PipelineRun::new(self.config.max_correction_attempts);

        info!(url = %request.url, "Pipeline started");
        let result = self.execute(request, &mut run, started).await;

        match &result {
            Ok(content) => info!(
                url = %request.url,
                reward_score = content.reward_score,
                corrections = run.correction_attempts,
                diagnostics = run.errors.len(),
                "Pipeline completed"
            ),
            Err(e) => {
                run.fail(e.to_string());
                warn!(url = %request.url, stage_count = run.stage_count(), error = %e, "Pipeline failed");
            }
        }

        PipelineOutcome { run, result }
    }

    async fn execute(
        &self,
        request: &ContentRequest,
        run: &mut PipelineRun,
        started: Instant,
    ) -> Result<ProcessedContent, JobError> {
        let options = &request.options;

        run.enter(Stage::Fetching).map_err(transition_failure)?;
        let fetched = self.fetch(&request.url).await?;
        run.record(StageOutput::Fetched(fetched.clone()));

        run.enter(Stage::Filtering).map_err(transition_failure)?;
        let verdict = self
            .collaborators
            .relevance
            .filter_relevance(&fetched.content, &fetched.title)
            .await
            .map_err(|e| JobError::service(Service::Relevance, e))?;
        run.record(StageOutput::Relevance(verdict));
        if !verdict.is_relevant {
            return Err(JobError::NotRelevant {
                score: verdict.score,
            });
        }

        run.enter(Stage::Verifying).map_err(transition_failure)?;
        let verification = if options.skip_verification {
            debug!(url = %request.url, "Verification skipped");
            Verification::new(self.config.fallback_authenticity)
        } else {
            match self
                .collaborators
                .verifier
                .verify_authenticity(&fetched.content, &fetched.title, &request.url)
                .await
            {
                Ok(verification) => verification,
                Err(e) => {
                    warn!(url = %request.url, error = %e, "Verification failed, using fallback score");
                    run.record_error(format!("{} service failed: {}", Service::Authenticity, e));
                    Verification::new(self.config.fallback_authenticity)
                }
            }
        };
        run.record(StageOutput::Verification(verification));

        run.enter(Stage::Scripting).map_err(transition_failure)?;
        let mut script = self
            .generate_script(run, &fetched, verification.authenticity_score, None)
            .await;

        let best = self
            .evaluate_and_correct(run, &fetched, &verification, &mut script, options.force_correction)
            .await?;

        let categories = match self.collaborators.analyzer.classify(&fetched.content).await {
            Ok(categories) => categories,
            Err(e) => self.analysis_fallback(run, "classify", e, || {
                LocalAnalyzer.categories(&fetched.content)
            })?,
        };

        let sentiment = match self
            .collaborators
            .analyzer
            .analyze_sentiment(&fetched.content)
            .await
        {
            Ok(sentiment) => sentiment,
            Err(e) => self.analysis_fallback(run, "sentiment", e, || {
                LocalAnalyzer.sentiment(&fetched.content)
            })?,
        };

        let summary = match self
            .collaborators
            .analyzer
            .summarize(&fetched.content, self.config.summary_max_length)
            .await
        {
            Ok(summary) => summary,
            Err(e) => self.analysis_fallback(run, "summarize", e, || {
                leading_summary(&fetched.content, self.config.summary_max_length)
            })?,
        };

        run.enter(Stage::Completed).map_err(transition_failure)?;

        let BestAttempt { report, script } = best;
        Ok(ProcessedContent {
            url: request.url.clone(),
            title: fetched.title,
            content: fetched.content,
            summary,
            categories,
            sentiment,
            script,
            authenticity_score: verification.authenticity_score,
            credibility: verification.credibility,
            reward_score: report.composite_score,
            metrics: ProcessingMetrics {
                stage_count: run.stage_count(),
                retries_used: run.correction_attempts,
                processing_time_ms: started.elapsed().as_millis() as u64,
                quality_gate_passed: report.passed,
            },
            score_report: report,
            correction_attempts: run.correction_attempts,
            errors: run.errors.clone(),
            fetched_at: fetched.fetched_at,
            completed_at: Utc::now(),
        })
    }

    async fn fetch(&self, url: &str) -> Result<FetchedContent, JobError> {
        let fetched = self
            .collaborators
            .fetcher
            .fetch(url)
            .await
            .map_err(JobError::FetchFailed)?;

        if fetched.content.trim().is_empty() {
            return Err(JobError::FetchFailed(CollaboratorError::NoContent(format!(
                "no content at {}",
                url
            ))));
        }
        Ok(fetched)
    }

    /// Script generation never fails the run; errors produce a degraded script.
    async fn generate_script(
        &self,
        run: &mut PipelineRun,
        fetched: &FetchedContent,
        authenticity_score: f64,
        summary: Option<String>,
    ) -> Script {
        let request = ScriptRequest {
            title: fetched.title.clone(),
            content: fetched.content.clone(),
            authenticity_score,
            summary,
        };

        let script = match self.collaborators.script_writer.generate_script(&request).await {
            Ok(script) => script,
            Err(e) => {
                warn!(url = %fetched.url, error = %e, "Script generation failed, continuing with degraded script");
                run.record_error(format!("{} service failed: {}", Service::Script, e));
                Script::degraded(&e)
            }
        };
        run.record(StageOutput::Script(script.clone()));
        script
    }

    /// Evaluate the current script, correcting while the gate asks for it
    /// and budget remains. Returns the best attempt.
    async fn evaluate_and_correct(
        &self,
        run: &mut PipelineRun,
        fetched: &FetchedContent,
        verification: &Verification,
        script: &mut Script,
        force_correction: bool,
    ) -> Result<BestAttempt, JobError> {
        let mut force = force_correction;
        let mut best: Option<BestAttempt> = None;

        loop {
            run.enter(Stage::Evaluating).map_err(transition_failure)?;
            let report = self.gate.evaluate(
                &ScoringInput {
                    title: &fetched.title,
                    content: &fetched.content,
                    script: &script.text,
                    authenticity_score: verification.authenticity_score,
                },
                run.correction_attempts,
            );
            run.record(StageOutput::Evaluation(report.clone()));

            let wants_correction = report.correction_needed || force;
            force = false;

            let improves = best
                .as_ref()
                .map_or(true, |b| report.composite_score >= b.report.composite_score);
            if improves {
                best = Some(BestAttempt {
                    report,
                    script: script.clone(),
                });
            }

            if !wants_correction || !run.can_correct() {
                break;
            }

            run.enter(Stage::Correcting).map_err(transition_failure)?;
            self.metrics.record_correction();
            debug!(
                url = %fetched.url,
                attempt = run.correction_attempts,
                max_attempts = run.max_correction_attempts,
                "Correction round"
            );

            let improvement = match self
                .collaborators
                .improver
                .improve(&fetched.content, script, self.config.correction_summary_length)
                .await
            {
                Ok(improvement) => improvement,
                Err(e) => {
                    warn!(url = %fetched.url, error = %e, "Improver failed, shipping best attempt");
                    run.record_error(format!("{} service failed: {}", Service::Improve, e));
                    break;
                }
            };
            run.record(StageOutput::Correction(improvement.clone()));

            run.enter(Stage::Scripting).map_err(transition_failure)?;
            *script = self
                .generate_script(
                    run,
                    fetched,
                    verification.authenticity_score,
                    Some(improvement.summary),
                )
                .await;
        }

        best.ok_or_else(|| JobError::Other("no script was evaluated".to_string()))
    }

    fn analysis_fallback<T>(
        &self,
        run: &mut PipelineRun,
        operation: &str,
        error: CollaboratorError,
        fallback: impl FnOnce() -> T,
    ) -> Result<T, JobError> {
        if !self.config.analysis_fallback {
            return Err(JobError::service(Service::Analysis, error));
        }
        warn!(operation = operation, error = %error, "Analyzer failed, using local fallback");
        run.record_error_as(
            Service::Analysis.as_str(),
            format!("{} failed: {}, used local fallback", operation, error),
        );
        Ok(fallback())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        AuthenticityVerifier, ContentAnalyzer, ContentFetcher, Improvement, ScriptImprover,
        ScriptWriter,
    };
    use crate::quality::{Scorer, SubScores};
    use crate::scheduler::ContentOptions;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const ARTICLE: &str = "Breaking news update. Officials confirmed the report today, according to the ministry. \
        The announcement followed weeks of review. Markets reacted calmly.";

    struct StaticFetcher(Result<FetchedContent, CollaboratorError>);

    #[async_trait]
    impl ContentFetcher for StaticFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchedContent, CollaboratorError> {
            self.0.clone()
        }
    }

    struct FailingVerifier;

    #[async_trait]
    impl AuthenticityVerifier for FailingVerifier {
        async fn verify_authenticity(
            &self,
            _content: &str,
            _title: &str,
            _url: &str,
        ) -> Result<Verification, CollaboratorError> {
            Err(CollaboratorError::Timeout("verifier".to_string()))
        }
    }

    struct FailingWriter;

    #[async_trait]
    impl ScriptWriter for FailingWriter {
        async fn generate_script(
            &self,
            _request: &ScriptRequest,
        ) -> Result<Script, CollaboratorError> {
            Err(CollaboratorError::Upstream {
                status: 500,
                message: "writer down".to_string(),
            })
        }
    }

    /// Numbers each script so attempts can be told apart.
    #[derive(Default)]
    struct CountingWriter {
        calls: AtomicUsize,
        summaries: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl ScriptWriter for CountingWriter {
        async fn generate_script(
            &self,
            request: &ScriptRequest,
        ) -> Result<Script, CollaboratorError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.summaries.lock().unwrap().push(request.summary.clone());
            Ok(Script::new(format!("script {}", n)))
        }
    }

    struct FailingImprover;

    #[async_trait]
    impl ScriptImprover for FailingImprover {
        async fn improve(
            &self,
            _content: &str,
            _script: &Script,
            _max_length: usize,
        ) -> Result<Improvement, CollaboratorError> {
            Err(CollaboratorError::Other("improver offline".to_string()))
        }
    }

    struct FailingAnalyzer;

    #[async_trait]
    impl ContentAnalyzer for FailingAnalyzer {
        async fn classify(&self, _content: &str) -> Result<Vec<String>, CollaboratorError> {
            Err(CollaboratorError::Connection("refused".to_string()))
        }

        async fn analyze_sentiment(&self, _content: &str) -> Result<Sentiment, CollaboratorError> {
            Err(CollaboratorError::Connection("refused".to_string()))
        }

        async fn summarize(
            &self,
            _content: &str,
            _max_length: usize,
        ) -> Result<String, CollaboratorError> {
            Err(CollaboratorError::Connection("refused".to_string()))
        }
    }

    /// Replays composite scores in order, repeating the last one.
    struct SequenceScorer {
        scores: Vec<f64>,
        next: AtomicUsize,
    }

    impl SequenceScorer {
        fn new(scores: &[f64]) -> Self {
            Self {
                scores: scores.to_vec(),
                next: AtomicUsize::new(0),
            }
        }
    }

    impl Scorer for SequenceScorer {
        fn score(&self, _input: &ScoringInput<'_>) -> SubScores {
            let i = self.next.fetch_add(1, Ordering::SeqCst);
            let value = self.scores[i.min(self.scores.len() - 1)];
            SubScores {
                tone: value,
                engagement: value,
                quality: value,
            }
        }
    }

    fn article() -> FetchedContent {
        FetchedContent::new("https://news.example/a", "Breaking: update on talks", ARTICLE)
    }

    fn pipeline(collaborators: Collaborators, scores: &[f64]) -> ContentPipeline {
        let config = PipelineConfig::default();
        let gate = QualityGate::new(config.quality_threshold, config.max_correction_attempts)
            .with_scorer(Arc::new(SequenceScorer::new(scores)));
        ContentPipeline::new(config, collaborators).with_gate(gate)
    }

    fn local() -> Collaborators {
        Collaborators::local(Arc::new(StaticFetcher(Ok(article()))))
    }

    fn request() -> ContentRequest {
        ContentRequest::new("https://news.example/a")
    }

    #[tokio::test]
    async fn test_passing_run_completes_without_correction() {
        let pipeline = pipeline(local(), &[0.9]);
        let outcome = pipeline.run(&request()).await;

        let content = outcome.result.expect("run should complete");
        assert_eq!(outcome.run.stage, Stage::Completed);
        assert_eq!(outcome.run.correction_attempts, 0);
        assert_eq!(content.title, "Breaking: update on talks");
        assert!((content.reward_score - 0.9).abs() < 1e-9);
        assert!(content.metrics.quality_gate_passed);
        assert_eq!(content.metrics.stage_count, 6);
        assert!(content.script.text.starts_with("Breaking News:"));
        assert!(!content.summary.is_empty());
        assert!(content.errors.is_empty());
    }

    #[tokio::test]
    async fn test_low_score_exhausts_corrections_then_completes() {
        let pipeline = pipeline(local(), &[0.4]);
        let outcome = pipeline.run(&request()).await;

        let content = outcome.result.expect("exhaustion still completes");
        assert_eq!(outcome.run.correction_attempts, 3);
        assert_eq!(outcome.run.visits(Stage::Correcting), 3);
        assert_eq!(outcome.run.visits(Stage::Evaluating), 4);
        assert!(!content.metrics.quality_gate_passed);
        assert_eq!(content.metrics.retries_used, 3);
    }

    #[tokio::test]
    async fn test_best_attempt_is_shipped() {
        let writer = Arc::new(CountingWriter::default());
        let collaborators = local().with_script_writer(writer.clone());
        let pipeline = pipeline(collaborators, &[0.3, 0.55, 0.2, 0.55]);

        let content = pipeline.run(&request()).await.result.unwrap();

        // Attempts 1 and 3 tie at 0.55; the later one wins.
        assert_eq!(content.script.text, "script 3");
        assert!((content.reward_score - 0.55).abs() < 1e-9);

        let summaries = writer.summaries.lock().unwrap();
        assert_eq!(summaries.len(), 4);
        assert!(summaries[0].is_none());
        assert!(summaries[1..].iter().all(|s| s.is_some()));
    }

    #[tokio::test]
    async fn test_force_correction_runs_one_round() {
        let pipeline = pipeline(local(), &[0.9]);
        let request = ContentRequest::new("https://news.example/a")
            .with_options(ContentOptions::default().with_force_correction(true));

        let outcome = pipeline.run(&request).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.run.correction_attempts, 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_run() {
        let collaborators = Collaborators::local(Arc::new(StaticFetcher(Err(
            CollaboratorError::Upstream {
                status: 504,
                message: "gateway timeout".to_string(),
            },
        ))));
        let outcome = pipeline(collaborators, &[0.9]).run(&request()).await;

        assert_eq!(outcome.run.stage, Stage::Failed);
        let err = outcome.result.unwrap_err();
        assert!(matches!(err, JobError::FetchFailed(_)));
        assert!(outcome
            .run
            .failure
            .as_deref()
            .unwrap_or_default()
            .starts_with("fetch failed"));
    }

    #[tokio::test]
    async fn test_empty_fetch_is_a_fetch_failure() {
        let empty = FetchedContent::new("https://news.example/a", "t", "   ");
        let collaborators = Collaborators::local(Arc::new(StaticFetcher(Ok(empty))));
        let outcome = pipeline(collaborators, &[0.9]).run(&request()).await;

        assert!(matches!(
            outcome.result,
            Err(JobError::FetchFailed(CollaboratorError::NoContent(_)))
        ));
    }

    #[tokio::test]
    async fn test_irrelevant_content_fails_with_reason() {
        let recipe = FetchedContent::new("https://food.example/cake", "Cake", "Mix flour and sugar.");
        let collaborators = Collaborators::local(Arc::new(StaticFetcher(Ok(recipe))));
        let outcome = pipeline(collaborators, &[0.9]).run(&request()).await;

        assert_eq!(outcome.run.stage, Stage::Failed);
        assert!(outcome.run.history.contains(&Stage::Filtering));
        assert!(!outcome.run.history.contains(&Stage::Verifying));
        let reason = outcome.run.failure.clone().unwrap_or_default();
        assert!(reason.contains("not relevant"));
        assert!(outcome.result.unwrap_err().is_content_semantic());
    }

    #[tokio::test]
    async fn test_stage_failures_degrade_and_are_recorded() {
        let collaborators = local()
            .with_verifier(Arc::new(FailingVerifier))
            .with_script_writer(Arc::new(FailingWriter))
            .with_analyzer(Arc::new(FailingAnalyzer));
        let outcome = pipeline(collaborators, &[0.9]).run(&request()).await;

        let content = outcome.result.expect("degraded stages do not fail the run");
        assert_eq!(content.authenticity_score, 50.0);
        assert!(content.script.is_degraded());
        assert!(content.script.text.contains("writer down"));
        assert!(!content.categories.is_empty());
        assert!(!content.summary.is_empty());

        assert!(content.errors.iter().any(|e| e.starts_with("verifying:")));
        assert!(content.errors.iter().any(|e| e.starts_with("scripting:")));
        assert_eq!(
            content
                .errors
                .iter()
                .filter(|e| e.starts_with("analysis: ") && e.contains("local fallback"))
                .count(),
            3
        );
        assert!(!content
            .errors
            .iter()
            .any(|e| e.starts_with("evaluating:") || e.starts_with("correcting:")));
    }

    #[tokio::test]
    async fn test_analysis_failure_without_fallback_fails_run() {
        let collaborators = local().with_analyzer(Arc::new(FailingAnalyzer));
        let config = PipelineConfig::default().with_analysis_fallback(false);
        let gate = QualityGate::new(0.6, 3).with_scorer(Arc::new(SequenceScorer::new(&[0.9])));
        let pipeline = ContentPipeline::new(config, collaborators).with_gate(gate);

        let outcome = pipeline.run(&request()).await;
        assert!(matches!(
            outcome.result,
            Err(JobError::Collaborator {
                service: Service::Analysis,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_skip_verification_uses_fallback_score() {
        let collaborators = local().with_verifier(Arc::new(FailingVerifier));
        let request = ContentRequest::new("https://news.example/a")
            .with_options(ContentOptions::default().with_skip_verification(true));

        let outcome = pipeline(collaborators, &[0.9]).run(&request).await;
        let content = outcome.result.unwrap();
        assert_eq!(content.authenticity_score, 50.0);
        assert!(content.errors.is_empty());
    }

    #[tokio::test]
    async fn test_improver_failure_ships_best_attempt() {
        let collaborators = local().with_improver(Arc::new(FailingImprover));
        let outcome = pipeline(collaborators, &[0.4]).run(&request()).await;

        assert_eq!(outcome.run.correction_attempts, 1);
        let content = outcome.result.unwrap();
        assert!(content.errors.iter().any(|e| e.contains("improver offline")));
    }
}
