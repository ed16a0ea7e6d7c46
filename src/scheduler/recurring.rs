//! Recurring per-category job generation.
//!
//! Every (category, endpoint) pair gets its own trigger task. Triggers in the
//! same category are staggered by `index * stagger_step` inside the category's
//! cadence window, and windows are aligned to the Unix epoch, so a 15 minute
//! category fires at :00, :15, :30 and :45 plus the endpoint's offset.
//!
//! Firing is best effort: a rejected submission is logged and counted, and the
//! next window tries again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metrics::MetricsCollector;

use super::catalog::{Category, CategoryCatalog};
use super::job::{JobId, JobPayload};
use super::queue::PriorityJobQueue;

/// Errors that can occur in the recurring scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Endpoint {0} is not listed in any category")]
    UnknownEndpoint(String),

    #[error("Catalog error: {0}")]
    Catalog(String),
}

/// Configuration for the recurring scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Offset between consecutive endpoints of one category.
    pub stagger_step: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stagger_step: Duration::from_secs(120),
        }
    }
}

impl SchedulerConfig {
    pub fn with_stagger_step(mut self, step: Duration) -> Self {
        self.stagger_step = step;
        self
    }
}

/// First instant strictly after `now` of the form `k * period + offset`
/// since the Unix epoch. Offsets longer than the period wrap around.
pub fn next_fire_after(now: DateTime<Utc>, period: Duration, offset: Duration) -> DateTime<Utc> {
    let period_ms = period.as_millis() as i64;
    if period_ms <= 0 {
        return now;
    }

    let offset_ms = (offset.as_millis() as i64).rem_euclid(period_ms);
    let now_ms = now.timestamp_millis();
    let window = (now_ms - offset_ms).div_euclid(period_ms);
    let next_ms = (window + 1) * period_ms + offset_ms;

    Utc.timestamp_millis_opt(next_ms).single().unwrap_or(now)
}

/// Scheduler counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Submissions attempted, from cadence firings and manual triggers.
    pub jobs_scheduled: u64,
    /// Submissions the queue accepted.
    pub jobs_completed: u64,
    /// Submissions the queue rejected.
    pub jobs_failed: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub registered_trigger_count: usize,
}

#[derive(Default)]
struct SchedulerCounters {
    scheduled: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    last_run_at: std::sync::Mutex<Option<DateTime<Utc>>>,
}

impl SchedulerCounters {
    fn record_attempt(&self) {
        self.scheduled.fetch_add(1, Ordering::SeqCst);
        let mut last = self
            .last_run_at
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *last = Some(Utc::now());
    }
}

/// Outcome of one manual submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSubmission {
    pub category: String,
    pub endpoint: String,
    pub success: bool,
    pub job_id: Option<JobId>,
    pub error: Option<String>,
}

/// Result of [`RecurringScheduler::trigger_manual`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerReport {
    pub submissions: Vec<TriggerSubmission>,
}

impl TriggerReport {
    pub fn successful(&self) -> usize {
        self.submissions.iter().filter(|s| s.success).count()
    }

    pub fn failed(&self) -> usize {
        self.submissions.len() - self.successful()
    }

    pub fn job_ids(&self) -> Vec<JobId> {
        self.submissions.iter().filter_map(|s| s.job_id).collect()
    }
}

/// Submits one job for `endpoint` with the category's priority and options.
async fn submit_endpoint(
    queue: &PriorityJobQueue,
    counters: &SchedulerCounters,
    category: &Category,
    endpoint: &str,
) -> TriggerSubmission {
    counters.record_attempt();
    let payload = JobPayload::ContentProcessing(category.request_for(endpoint));
    let metrics = MetricsCollector::new();

    match queue.submit(payload, category.priority).await {
        Ok(job_id) => {
            counters.completed.fetch_add(1, Ordering::SeqCst);
            metrics.record_scheduler_firing(&category.name, true);
            info!(
                category = %category.name,
                endpoint = %endpoint,
                job_id = %job_id,
                priority = category.priority,
                "Scheduled content processing"
            );
            TriggerSubmission {
                category: category.name.clone(),
                endpoint: endpoint.to_string(),
                success: true,
                job_id: Some(job_id),
                error: None,
            }
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::SeqCst);
            metrics.record_scheduler_firing(&category.name, false);
            warn!(
                category = %category.name,
                endpoint = %endpoint,
                error = %e,
                "Failed to schedule content processing"
            );
            TriggerSubmission {
                category: category.name.clone(),
                endpoint: endpoint.to_string(),
                success: false,
                job_id: None,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Feeds the queue from the category catalog.
pub struct RecurringScheduler {
    queue: PriorityJobQueue,
    catalog: Arc<CategoryCatalog>,
    config: SchedulerConfig,
    counters: Arc<SchedulerCounters>,
    triggers: Mutex<Vec<JoinHandle<()>>>,
}

impl RecurringScheduler {
    pub fn new(queue: PriorityJobQueue, catalog: CategoryCatalog, config: SchedulerConfig) -> Self {
        Self {
            queue,
            catalog: Arc::new(catalog),
            config,
            counters: Arc::new(SchedulerCounters::default()),
            triggers: Mutex::new(Vec::new()),
        }
    }

    pub fn catalog(&self) -> &CategoryCatalog {
        &self.catalog
    }

    /// Stagger offset of the endpoint at `index` within its category.
    pub fn stagger_offset(&self, index: usize) -> Duration {
        self.config.stagger_step * index as u32
    }

    /// Registers one trigger per (category, endpoint) pair and returns how many
    /// are registered. Calling this while started changes nothing.
    pub async fn start(&self) -> usize {
        let mut triggers = self.triggers.lock().await;
        if !triggers.is_empty() {
            warn!("Recurring scheduler already started, ignoring start");
            return triggers.len();
        }

        for category in &self.catalog.categories {
            let period = category.cadence().period();
            for (index, endpoint) in category.sources.iter().enumerate() {
                let offset = self.stagger_offset(index);
                let queue = self.queue.clone();
                let counters = Arc::clone(&self.counters);
                let category = category.clone();
                let endpoint = endpoint.clone();

                debug!(
                    category = %category.name,
                    endpoint = %endpoint,
                    cadence = %category.cadence(),
                    offset_secs = offset.as_secs(),
                    "Registering trigger"
                );

                triggers.push(tokio::spawn(async move {
                    loop {
                        let now = Utc::now();
                        let next = next_fire_after(now, period, offset);
                        let wait = (next - now).to_std().unwrap_or_default();
                        tokio::time::sleep(wait).await;
                        submit_endpoint(&queue, &counters, &category, &endpoint).await;
                    }
                }));
            }
        }

        info!(
            categories = self.catalog.categories.len(),
            triggers = triggers.len(),
            "Recurring scheduler started"
        );
        triggers.len()
    }

    /// Cancels all triggers. Jobs already submitted are unaffected.
    pub async fn stop(&self) {
        let mut triggers = self.triggers.lock().await;
        let count = triggers.len();
        for handle in triggers.drain(..) {
            handle.abort();
        }
        info!(triggers = count, "Recurring scheduler stopped");
    }

    /// Submits jobs outside the cadence.
    ///
    /// - category and endpoint: one job for that endpoint with the category's settings
    /// - category only: one job per endpoint of the category
    /// - endpoint only: one job with the settings of the category listing it
    /// - neither: one job for the first endpoint of every category
    pub async fn trigger_manual(
        &self,
        category: Option<&str>,
        endpoint: Option<&str>,
    ) -> Result<TriggerReport, SchedulerError> {
        let mut targets: Vec<(&Category, &str)> = Vec::new();

        match (category, endpoint) {
            (Some(name), Some(endpoint)) => {
                let category = self.category(name)?;
                targets.push((category, endpoint));
            }
            (Some(name), None) => {
                let category = self.category(name)?;
                targets.extend(category.sources.iter().map(|s| (category, s.as_str())));
            }
            (None, Some(endpoint)) => {
                let category = self
                    .catalog
                    .find_by_endpoint(endpoint)
                    .ok_or_else(|| SchedulerError::UnknownEndpoint(endpoint.to_string()))?;
                targets.push((category, endpoint));
            }
            (None, None) => {
                for category in &self.catalog.categories {
                    if let Some(first) = category.sources.first() {
                        targets.push((category, first.as_str()));
                    }
                }
            }
        }

        let mut report = TriggerReport::default();
        for (category, endpoint) in targets {
            report
                .submissions
                .push(submit_endpoint(&self.queue, &self.counters, category, endpoint).await);
        }

        info!(
            category = ?category,
            endpoint = ?endpoint,
            submitted = report.successful(),
            rejected = report.failed(),
            "Manual trigger finished"
        );
        Ok(report)
    }

    fn category(&self, name: &str) -> Result<&Category, SchedulerError> {
        self.catalog
            .get(name)
            .ok_or_else(|| SchedulerError::UnknownCategory(name.to_string()))
    }

    pub async fn stats(&self) -> SchedulerStats {
        let registered_trigger_count = self.triggers.lock().await.len();
        let last_run_at = *self
            .counters
            .last_run_at
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        SchedulerStats {
            jobs_scheduled: self.counters.scheduled.load(Ordering::SeqCst),
            jobs_completed: self.counters.completed.load(Ordering::SeqCst),
            jobs_failed: self.counters.failed.load(Ordering::SeqCst),
            last_run_at,
            registered_trigger_count,
        }
    }
}
