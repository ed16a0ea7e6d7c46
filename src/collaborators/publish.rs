//! Channel x avatar publish fan-out.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::metrics::MetricsCollector;

use super::ArtifactPublisher;

/// Channel used when a request names none.
pub const DEFAULT_CHANNEL: &str = "news_channel_1";

/// Avatar used when a request names none.
pub const DEFAULT_AVATAR: &str = "avatar_alice";

/// What gets pushed to each (channel, avatar) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishArtifact {
    pub title: String,
    pub script: String,
    pub summary: String,
    pub categories: Vec<String>,
    pub tone: String,
    pub language: String,
    pub authenticity_score: f64,
    pub enable_audio: bool,
    pub voice: Option<String>,
}

/// Result of one push.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushOutcome {
    pub channel: String,
    pub avatar: String,
    pub success: bool,
    pub push_id: Option<String>,
    pub error: Option<String>,
}

/// Aggregate of a matrix fan-out. Partial failure is a normal outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatrixReport {
    pub total: usize,
    pub successful: usize,
    pub results: Vec<PushOutcome>,
}

impl MatrixReport {
    /// Fraction of pushes that succeeded, 0.0 for an empty matrix.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successful as f64 / self.total as f64
        }
    }

    pub fn failed(&self) -> usize {
        self.total - self.successful
    }
}

/// Push `artifact` to every (channel, avatar) pair concurrently.
///
/// Empty `channels` or `avatars` fall back to [`DEFAULT_CHANNEL`] and
/// [`DEFAULT_AVATAR`]. Results keep channel-major order.
pub async fn publish_matrix(
    publisher: &dyn ArtifactPublisher,
    channels: &[String],
    avatars: &[String],
    artifact: &PublishArtifact,
) -> MatrixReport {
    let default_channels = [DEFAULT_CHANNEL.to_string()];
    let default_avatars = [DEFAULT_AVATAR.to_string()];
    let channels = if channels.is_empty() {
        &default_channels[..]
    } else {
        channels
    };
    let avatars = if avatars.is_empty() {
        &default_avatars[..]
    } else {
        avatars
    };

    let pushes = channels.iter().flat_map(|channel| {
        avatars.iter().map(move |avatar| async move {
            match publisher.push_artifact(channel, avatar, artifact).await {
                Ok(push_id) => PushOutcome {
                    channel: channel.clone(),
                    avatar: avatar.clone(),
                    success: true,
                    push_id: Some(push_id),
                    error: None,
                },
                Err(e) => {
                    warn!(channel = %channel, avatar = %avatar, error = %e, "Push failed");
                    PushOutcome {
                        channel: channel.clone(),
                        avatar: avatar.clone(),
                        success: false,
                        push_id: None,
                        error: Some(e.to_string()),
                    }
                }
            }
        })
    });

    let results = join_all(pushes).await;

    let metrics = MetricsCollector::new();
    for outcome in &results {
        metrics.record_publish(outcome.success);
    }

    let report = MatrixReport {
        total: results.len(),
        successful: results.iter().filter(|r| r.success).count(),
        results,
    };

    info!(
        successful = report.successful,
        total = report.total,
        "Publish matrix complete"
    );

    report
}
