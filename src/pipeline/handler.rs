//! Queue handler that runs content jobs through the pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::collaborators::{publish_matrix, MatrixReport, PublishArtifact, SentimentLabel};
use crate::error::JobError;
use crate::scheduler::{ContentOptions, Job, JobHandler, JobOutput, JobPayload};

use super::orchestrator::{ContentPipeline, ProcessedContent};

const ARTIFACT_LANGUAGE: &str = "en";

/// Runs [`JobPayload::ContentProcessing`] jobs and publishes the result.
///
/// Publishing happens after a Completed run when `enable_publish` is set.
/// Push failures show up in the [`MatrixReport`] and never fail the job.
#[derive(Clone)]
pub struct ContentJobHandler {
    pipeline: Arc<ContentPipeline>,
}

impl ContentJobHandler {
    pub fn new(pipeline: Arc<ContentPipeline>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &ContentPipeline {
        &self.pipeline
    }

    async fn publish(&self, content: &ProcessedContent, options: &ContentOptions) -> MatrixReport {
        let artifact = artifact_for(content, options);
        publish_matrix(
            self.pipeline.collaborators().publisher.as_ref(),
            &options.channels,
            &options.avatars,
            &artifact,
        )
        .await
    }
}

fn artifact_for(content: &ProcessedContent, options: &ContentOptions) -> PublishArtifact {
    let tone = match content.sentiment.label {
        SentimentLabel::Positive => "positive",
        SentimentLabel::Neutral => "neutral",
        SentimentLabel::Negative => "negative",
    };

    PublishArtifact {
        title: content.title.clone(),
        script: content.script.text.clone(),
        summary: content.summary.clone(),
        categories: content.categories.clone(),
        tone: tone.to_string(),
        language: ARTIFACT_LANGUAGE.to_string(),
        authenticity_score: content.authenticity_score,
        enable_audio: options.enable_audio,
        voice: options.voice.clone(),
    }
}

#[async_trait]
impl JobHandler for ContentJobHandler {
    async fn handle(&self, job: &Job) -> Result<JobOutput, JobError> {
        let request = match &job.payload {
            JobPayload::ContentProcessing(request) => request,
        };
        request.validate().map_err(JobError::InvalidPayload)?;

        let outcome = self.pipeline.run(request).await;
        let content = outcome.result?;

        let publish = if request.options.enable_publish {
            let report = self.publish(&content, &request.options).await;
            info!(
                job_id = %job.id,
                successful = report.successful,
                total = report.total,
                "Published content"
            );
            Some(report)
        } else {
            None
        };

        Ok(JobOutput { content, publish })
    }
}
