//! In-memory priority job queue.
//!
//! Jobs wait in a max-heap ordered by priority, then by submission sequence,
//! so equal priorities are served FIFO. The heap, the job registry and the
//! status counters live behind one lock; workers pop under that lock, which is
//! what guarantees a job is never held by two workers.
//!
//! A job re-entering the heap after a retry keeps its original sequence
//! number, so it does not lose its place among equal-priority jobs.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::error::JobError;
use crate::metrics::MetricsCollector;
use crate::pipeline::config::{parse_env_value, ConfigError};

use super::job::{Job, JobId, JobOutput, JobPayload, JobStatus, JobView, DEFAULT_MAX_RETRIES};
use super::retry::{RetryDecision, RetryPolicy, DEFAULT_BACKOFF_LADDER_SECS};
use super::worker_pool::{JobHandler, WorkerPool};

/// Default maximum number of pending jobs.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default number of workers.
pub const DEFAULT_NUM_WORKERS: usize = 5;

/// Default number of completed or failed jobs kept for status lookups.
pub const DEFAULT_MAX_RETAINED_TERMINAL: usize = 1000;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Pending count reached the configured capacity.
    #[error("Queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Job {0} not found")]
    NotFound(JobId),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Job {id} cannot be cancelled while {status}")]
    NotCancellable { id: JobId, status: JobStatus },

    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Configuration for the queue and its worker pool.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of pending jobs.
    pub capacity: usize,
    /// Workers started by callers that do not pick their own count.
    pub num_workers: usize,
    /// Longest an idle worker sleeps before checking the heap again.
    pub poll_interval: Duration,
    /// Retry delays indexed by retry count.
    pub backoff_ladder: Vec<Duration>,
    /// Retry budget given to submitted jobs.
    pub default_max_retries: u32,
    /// Maximum time for a single attempt.
    pub job_timeout: Duration,
    /// How long `stop` waits for in-flight jobs.
    pub shutdown_timeout: Duration,
    /// Completed or failed jobs kept in the registry. The oldest finished
    /// job is dropped once the limit is exceeded; counters are unaffected.
    pub max_retained_terminal: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            num_workers: DEFAULT_NUM_WORKERS,
            poll_interval: Duration::from_secs(1),
            backoff_ladder: DEFAULT_BACKOFF_LADDER_SECS
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
            default_max_retries: DEFAULT_MAX_RETRIES,
            job_timeout: Duration::from_secs(600),
            shutdown_timeout: Duration::from_secs(60),
            max_retained_terminal: DEFAULT_MAX_RETAINED_TERMINAL,
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `QUEUE_CAPACITY`: Maximum pending jobs (default: 1000)
    /// - `QUEUE_WORKERS`: Worker count (default: 5)
    /// - `QUEUE_POLL_INTERVAL_MS`: Idle poll interval in milliseconds (default: 1000)
    /// - `QUEUE_BACKOFF_SECS`: Comma-separated retry ladder (default: 30,60,300)
    /// - `QUEUE_MAX_RETRIES`: Default retry budget (default: 3)
    /// - `QUEUE_JOB_TIMEOUT_SECS`: Per-attempt timeout (default: 600)
    /// - `QUEUE_SHUTDOWN_TIMEOUT_SECS`: Drain timeout (default: 60)
    /// - `QUEUE_MAX_RETAINED_TERMINAL`: Finished jobs kept for lookups (default: 1000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("QUEUE_CAPACITY") {
            config.capacity = parse_env_value(&val, "QUEUE_CAPACITY")?;
        }

        if let Ok(val) = std::env::var("QUEUE_WORKERS") {
            config.num_workers = parse_env_value(&val, "QUEUE_WORKERS")?;
        }

        if let Ok(val) = std::env::var("QUEUE_POLL_INTERVAL_MS") {
            let ms: u64 = parse_env_value(&val, "QUEUE_POLL_INTERVAL_MS")?;
            config.poll_interval = Duration::from_millis(ms);
        }

        if let Ok(val) = std::env::var("QUEUE_BACKOFF_SECS") {
            config.backoff_ladder = val
                .split(',')
                .map(|step| parse_env_value::<u64>(step.trim(), "QUEUE_BACKOFF_SECS"))
                .map(|secs| secs.map(Duration::from_secs))
                .collect::<Result<_, _>>()?;
        }

        if let Ok(val) = std::env::var("QUEUE_MAX_RETRIES") {
            config.default_max_retries = parse_env_value(&val, "QUEUE_MAX_RETRIES")?;
        }

        if let Ok(val) = std::env::var("QUEUE_JOB_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "QUEUE_JOB_TIMEOUT_SECS")?;
            config.job_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("QUEUE_SHUTDOWN_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "QUEUE_SHUTDOWN_TIMEOUT_SECS")?;
            config.shutdown_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("QUEUE_MAX_RETAINED_TERMINAL") {
            config.max_retained_terminal = parse_env_value(&val, "QUEUE_MAX_RETAINED_TERMINAL")?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "capacity must be greater than 0".to_string(),
            ));
        }

        if self.num_workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "num_workers must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "poll_interval must be greater than 0".to_string(),
            ));
        }

        if self.backoff_ladder.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "backoff_ladder cannot be empty".to_string(),
            ));
        }

        if self.backoff_ladder.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(ConfigError::ValidationFailed(
                "backoff_ladder must be non-decreasing".to_string(),
            ));
        }

        if self.job_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "job_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_backoff_ladder(mut self, ladder: Vec<Duration>) -> Self {
        self.backoff_ladder = ladder;
        self
    }

    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_max_retained_terminal(mut self, limit: usize) -> Self {
        self.max_retained_terminal = limit;
        self
    }
}

/// Aggregate queue counters.
///
/// At any quiescent point
/// `pending + processing + retrying + completed + failed == submitted`,
/// and the number of dispatch attempts is `submitted + retried`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub retrying: u64,
    pub completed: u64,
    pub failed: u64,
    /// Retries scheduled so far.
    pub retried: u64,
    /// Jobs accepted by `submit`.
    pub submitted: u64,
    /// Worker tasks currently running.
    pub active_workers: usize,
    pub capacity: usize,
}

impl QueueStats {
    /// Jobs not yet terminal.
    pub fn in_flight(&self) -> u64 {
        self.pending + self.processing + self.retrying
    }

    /// Sum over every status bucket. Equals `submitted` when the books balance.
    pub fn accounted(&self) -> u64 {
        self.in_flight() + self.completed + self.failed
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0
    }
}

/// Heap entry. Ordered by priority, then by earliest sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueEntry {
    priority: i32,
    seq: u64,
    id: JobId,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct TrackedJob {
    job: Job,
    seq: u64,
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<QueueEntry>,
    jobs: HashMap<JobId, TrackedJob>,
    /// Terminal jobs in the order they finished.
    finished: VecDeque<JobId>,
    next_seq: u64,
    pending: u64,
    processing: u64,
    retrying: u64,
    completed: u64,
    failed: u64,
    retried: u64,
    submitted: u64,
}

impl QueueState {
    fn counter(&mut self, status: JobStatus) -> &mut u64 {
        match status {
            JobStatus::Pending => &mut self.pending,
            JobStatus::Processing => &mut self.processing,
            JobStatus::Retrying => &mut self.retrying,
            JobStatus::Completed => &mut self.completed,
            JobStatus::Failed => &mut self.failed,
        }
    }

    fn move_count(&mut self, from: JobStatus, to: JobStatus) {
        let from_count = self.counter(from);
        *from_count = from_count.saturating_sub(1);
        *self.counter(to) += 1;
    }

    /// Records a job reaching a terminal state and drops the oldest
    /// finished jobs beyond `limit`. Returns how many were dropped.
    fn retire(&mut self, id: JobId, limit: usize) -> usize {
        self.finished.push_back(id);
        let mut evicted = 0;
        while self.finished.len() > limit {
            let Some(oldest) = self.finished.pop_front() else {
                break;
            };
            if self.jobs.remove(&oldest).is_some() {
                evicted += 1;
            }
        }
        evicted
    }

    fn insert(&mut self, job: Job) -> JobId {
        let id = job.id;
        let seq = self.next_seq;
        self.next_seq += 1;

        self.heap.push(QueueEntry {
            priority: job.priority,
            seq,
            id,
        });
        self.jobs.insert(id, TrackedJob { job, seq });
        self.pending += 1;
        self.submitted += 1;
        id
    }

    /// Pops the best pending job and marks it processing. Entries whose job is
    /// no longer pending (cancelled) are discarded.
    fn pop_pending(&mut self) -> Option<Job> {
        while let Some(entry) = self.heap.pop() {
            let Some(tracked) = self.jobs.get_mut(&entry.id) else {
                continue;
            };
            if tracked.job.status != JobStatus::Pending {
                continue;
            }

            tracked.job.mark_processing();
            let job = tracked.job.clone();
            self.move_count(JobStatus::Pending, JobStatus::Processing);
            return Some(job);
        }
        None
    }

    fn push_back(&mut self, id: JobId) -> bool {
        let Some(tracked) = self.jobs.get_mut(&id) else {
            return false;
        };
        let from = tracked.job.status;
        tracked.job.mark_pending();
        let entry = QueueEntry {
            priority: tracked.job.priority,
            seq: tracked.seq,
            id,
        };
        self.heap.push(entry);
        self.move_count(from, JobStatus::Pending);
        true
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.pending,
            processing: self.processing,
            retrying: self.retrying,
            completed: self.completed,
            failed: self.failed,
            retried: self.retried,
            submitted: self.submitted,
            active_workers: 0,
            capacity: 0,
        }
    }
}

/// Retry scheduled for a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScheduledRetry {
    pub delay: Duration,
    pub retry_count: u32,
}

/// State shared between the queue handle, its workers and retry timers.
pub(crate) struct QueueShared {
    config: QueueConfig,
    policy: RetryPolicy,
    state: Mutex<QueueState>,
    notify: Notify,
    active_workers: AtomicUsize,
    metrics: MetricsCollector,
}

impl QueueShared {
    fn new(config: QueueConfig) -> Self {
        Self {
            policy: RetryPolicy::new(config.backoff_ladder.clone()),
            config,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            active_workers: AtomicUsize::new(0),
            metrics: MetricsCollector::new(),
        }
    }

    pub(crate) fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub(crate) fn notify(&self) -> &Notify {
        &self.notify
    }

    pub(crate) fn worker_started(&self) {
        let active = self.active_workers.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        self.metrics.set_active_workers(active);
    }

    pub(crate) fn worker_stopped(&self) {
        let active = self
            .active_workers
            .fetch_sub(1, AtomicOrdering::SeqCst)
            .saturating_sub(1);
        self.metrics.set_active_workers(active);
    }

    fn retire(&self, state: &mut QueueState, id: JobId) {
        let evicted = state.retire(id, self.config.max_retained_terminal);
        if evicted > 0 {
            debug!(evicted = evicted, retained = state.finished.len(), "Dropped finished jobs from registry");
        }
    }

    fn publish_gauges(&self, state: &QueueState) {
        self.metrics.set_queue_depth(state.pending);
        self.metrics.set_jobs_in_progress(state.processing);
    }

    async fn submit(&self, mut job: Job) -> Result<JobId, QueueError> {
        if let Err(reason) = job.payload.validate() {
            self.metrics.record_job("rejected", None);
            return Err(QueueError::InvalidPayload(reason));
        }

        let mut state = self.state.lock().await;
        if state.jobs.contains_key(&job.id) {
            self.metrics.record_job("rejected", None);
            return Err(QueueError::InvalidPayload(format!(
                "job {} was already submitted",
                job.id
            )));
        }
        if state.pending >= self.config.capacity as u64 {
            self.metrics.record_job("rejected", None);
            return Err(QueueError::QueueFull {
                capacity: self.config.capacity,
            });
        }

        job.reset_for_submit();
        let priority = job.priority;
        let kind = job.kind();
        let id = state.insert(job);
        self.publish_gauges(&state);
        drop(state);

        self.notify.notify_one();
        debug!(job_id = %id, kind = %kind, priority = priority, "Job submitted");
        Ok(id)
    }

    pub(crate) async fn pop_next(&self) -> Option<Job> {
        let mut state = self.state.lock().await;
        let job = state.pop_pending();
        if job.is_some() {
            self.publish_gauges(&state);
        }
        job
    }

    pub(crate) async fn complete(&self, id: JobId, output: JobOutput, elapsed: Duration) {
        let mut state = self.state.lock().await;
        let Some(tracked) = state.jobs.get_mut(&id) else {
            warn!(job_id = %id, "Completed job is no longer tracked");
            return;
        };
        if tracked.job.status != JobStatus::Processing {
            warn!(job_id = %id, status = %tracked.job.status, "Ignoring completion for job not in processing");
            return;
        }

        tracked.job.mark_completed(output);
        state.move_count(JobStatus::Processing, JobStatus::Completed);
        self.retire(&mut state, id);
        self.publish_gauges(&state);
        self.metrics
            .record_job("completed", Some(elapsed.as_secs_f64()));
    }

    /// Applies the retry policy to a failed attempt. Returns the retry to
    /// schedule, or `None` when the job is now permanently failed.
    pub(crate) async fn fail(
        &self,
        id: JobId,
        error: &JobError,
        elapsed: Duration,
    ) -> Option<ScheduledRetry> {
        let mut state = self.state.lock().await;
        let Some(tracked) = state.jobs.get_mut(&id) else {
            warn!(job_id = %id, "Failed job is no longer tracked");
            return None;
        };
        if tracked.job.status != JobStatus::Processing {
            warn!(job_id = %id, status = %tracked.job.status, "Ignoring failure for job not in processing");
            return None;
        }

        let decision =
            self.policy
                .decide(error, tracked.job.retry_count, tracked.job.max_retries);

        let scheduled = match decision {
            RetryDecision::Retry { delay, class } => {
                let retry_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
                tracked.job.mark_retrying(error.to_string(), retry_at);
                let retry_count = tracked.job.retry_count;
                state.move_count(JobStatus::Processing, JobStatus::Retrying);
                state.retried += 1;
                self.metrics.record_retry(class.as_str());

                warn!(
                    job_id = %id,
                    error = %error,
                    class = class.as_str(),
                    retry_count = retry_count,
                    delay_secs = delay.as_secs(),
                    "Job failed, scheduling retry"
                );
                Some(ScheduledRetry { delay, retry_count })
            }
            RetryDecision::GiveUp { class } => {
                tracked.job.mark_failed(error.to_string());
                let retry_count = tracked.job.retry_count;
                state.move_count(JobStatus::Processing, JobStatus::Failed);
                self.retire(&mut state, id);
                self.metrics.record_job("failed", Some(elapsed.as_secs_f64()));

                warn!(
                    job_id = %id,
                    error = %error,
                    class = class.as_str(),
                    retry_count = retry_count,
                    "Job failed permanently"
                );
                None
            }
        };

        self.publish_gauges(&state);
        scheduled
    }

    /// Moves a retrying job back onto the heap. A job cancelled while waiting
    /// stays where it is.
    pub(crate) async fn requeue(&self, id: JobId) -> bool {
        let mut state = self.state.lock().await;
        let retrying = state
            .jobs
            .get(&id)
            .is_some_and(|tracked| tracked.job.status == JobStatus::Retrying);
        if !retrying {
            debug!(job_id = %id, "Retry timer fired for job no longer retrying");
            return false;
        }

        state.push_back(id);
        self.publish_gauges(&state);
        drop(state);

        self.notify.notify_one();
        info!(job_id = %id, "Job re-entered queue after backoff");
        true
    }

    /// Returns every processing job to the heap. Only valid once no worker holds a job.
    pub(crate) async fn reclaim_processing(&self) -> usize {
        let mut state = self.state.lock().await;
        let held: Vec<JobId> = state
            .jobs
            .iter()
            .filter(|(_, tracked)| tracked.job.status == JobStatus::Processing)
            .map(|(id, _)| *id)
            .collect();

        for id in &held {
            state.push_back(*id);
        }
        self.publish_gauges(&state);
        held.len()
    }

    async fn cancel(&self, id: JobId) -> Result<JobView, QueueError> {
        let mut state = self.state.lock().await;
        let tracked = state.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;

        let status = tracked.job.status;
        if !matches!(status, JobStatus::Pending | JobStatus::Retrying) {
            return Err(QueueError::NotCancellable { id, status });
        }

        tracked.job.mark_failed("cancelled".to_string());
        let view = tracked.job.view();
        state.move_count(status, JobStatus::Failed);
        self.retire(&mut state, id);
        self.publish_gauges(&state);
        self.metrics.record_job("cancelled", None);

        info!(job_id = %id, previous = %status, "Job cancelled");
        Ok(view)
    }

    async fn status(&self, id: JobId) -> Result<JobView, QueueError> {
        let state = self.state.lock().await;
        state
            .jobs
            .get(&id)
            .map(|tracked| tracked.job.view())
            .ok_or(QueueError::NotFound(id))
    }

    async fn list(&self, status: Option<JobStatus>) -> Vec<JobView> {
        let state = self.state.lock().await;
        let mut tracked: Vec<&TrackedJob> = state
            .jobs
            .values()
            .filter(|tracked| status.map_or(true, |wanted| tracked.job.status == wanted))
            .collect();
        tracked.sort_by_key(|tracked| tracked.seq);
        tracked.into_iter().map(|tracked| tracked.job.view()).collect()
    }

    async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        QueueStats {
            active_workers: self.active_workers.load(AtomicOrdering::SeqCst),
            capacity: self.config.capacity,
            ..state.stats()
        }
    }
}

/// Bounded, priority-ordered job queue with its own worker pool.
///
/// Cloning yields another handle to the same queue.
///
/// # Example
///
/// ```rust,ignore
/// use news_forge::scheduler::{JobPayload, PriorityJobQueue, QueueConfig};
///
/// let queue = PriorityJobQueue::new(QueueConfig::default(), handler);
/// let id = queue.submit(JobPayload::content("https://www.bbc.com/news"), 10).await?;
/// queue.start(5).await;
///
/// let view = queue.status(id).await?;
/// println!("{} is {}", view.id, view.status);
///
/// queue.stop().await?;
/// ```
#[derive(Clone)]
pub struct PriorityJobQueue {
    shared: Arc<QueueShared>,
    pool: Arc<Mutex<WorkerPool>>,
}

impl PriorityJobQueue {
    pub fn new(config: QueueConfig, handler: Arc<dyn JobHandler>) -> Self {
        Self {
            shared: Arc::new(QueueShared::new(config)),
            pool: Arc::new(Mutex::new(WorkerPool::new(handler))),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        self.shared.config()
    }

    /// Submits a job. The job kind follows from the payload variant.
    ///
    /// # Errors
    ///
    /// - `QueueError::InvalidPayload` if the payload fails validation
    /// - `QueueError::QueueFull` if the pending count is at capacity
    ///
    /// Rejected submissions leave the queue untouched.
    pub async fn submit(&self, payload: JobPayload, priority: i32) -> Result<JobId, QueueError> {
        let job = Job::new(payload, priority)
            .with_max_retries(self.shared.config().default_max_retries);
        self.shared.submit(job).await
    }

    /// Submits a pre-built job, keeping its retry budget.
    ///
    /// Whatever state the job carries, it enters the queue as a fresh
    /// pending job with no retries used and no result.
    pub async fn submit_job(&self, job: Job) -> Result<JobId, QueueError> {
        self.shared.submit(job).await
    }

    /// Spawns `worker_count` workers. Calling this while running only logs a warning.
    pub async fn start(&self, worker_count: usize) {
        let mut pool = self.pool.lock().await;
        if pool.is_running() {
            warn!("Job queue already running, ignoring start");
            return;
        }
        pool.start(&self.shared, worker_count);
    }

    /// Stops the workers.
    ///
    /// Idle workers leave immediately. A worker holding a job finishes it
    /// first. If that takes longer than `shutdown_timeout` the remaining
    /// workers are aborted and their jobs go back to the heap as pending.
    pub async fn stop(&self) -> Result<(), QueueError> {
        let mut pool = self.pool.lock().await;
        pool.shutdown(&self.shared).await
    }

    pub async fn is_running(&self) -> bool {
        self.pool.lock().await.is_running()
    }

    pub async fn status(&self, id: JobId) -> Result<JobView, QueueError> {
        self.shared.status(id).await
    }

    /// Cancels a pending or retrying job; it ends as failed with error "cancelled".
    pub async fn cancel(&self, id: JobId) -> Result<JobView, QueueError> {
        self.shared.cancel(id).await
    }

    /// Jobs in submission order, optionally filtered by status.
    pub async fn jobs(&self, status: Option<JobStatus>) -> Vec<JobView> {
        self.shared.list(status).await
    }

    pub async fn stats(&self) -> QueueStats {
        self.shared.stats().await
    }

    /// Polls until no job is pending, processing or retrying. Returns false on timeout.
    pub async fn wait_idle(&self, poll: Duration, timeout: Duration) -> bool {
        let wait = async {
            loop {
                if self.stats().await.is_idle() {
                    return;
                }
                tokio::time::sleep(poll).await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(priority: i32) -> Job {
        Job::new(JobPayload::content("https://example.com/story"), priority)
    }

    #[test]
    fn test_entry_ordering() {
        let high = QueueEntry {
            priority: 10,
            seq: 5,
            id: JobId::new_v4(),
        };
        let low = QueueEntry {
            priority: 1,
            seq: 0,
            id: JobId::new_v4(),
        };
        let early = QueueEntry {
            priority: 5,
            seq: 1,
            id: JobId::new_v4(),
        };
        let late = QueueEntry {
            priority: 5,
            seq: 2,
            id: JobId::new_v4(),
        };

        assert!(high > low);
        assert!(early > late);
    }

    #[test]
    fn test_state_pops_by_priority_then_fifo() {
        let mut state = QueueState::default();
        let a = state.insert(job(1));
        let b = state.insert(job(5));
        let c = state.insert(job(10));
        let d = state.insert(job(5));

        let order: Vec<JobId> = std::iter::from_fn(|| state.pop_pending().map(|j| j.id)).collect();
        assert_eq!(order, vec![c, b, d, a]);
        assert_eq!(state.processing, 4);
        assert_eq!(state.pending, 0);
    }

    #[test]
    fn test_state_skips_cancelled_entries() {
        let mut state = QueueState::default();
        let a = state.insert(job(10));
        let b = state.insert(job(1));

        if let Some(tracked) = state.jobs.get_mut(&a) {
            tracked.job.mark_failed("cancelled".to_string());
        }
        state.move_count(JobStatus::Pending, JobStatus::Failed);

        assert_eq!(state.pop_pending().map(|j| j.id), Some(b));
        assert!(state.pop_pending().is_none());
    }

    #[test]
    fn test_push_back_keeps_sequence() {
        let mut state = QueueState::default();
        let first = state.insert(job(5));
        let second = state.insert(job(5));

        let popped = state.pop_pending().map(|j| j.id);
        assert_eq!(popped, Some(first));
        assert!(state.push_back(first));

        assert_eq!(state.pop_pending().map(|j| j.id), Some(first));
        assert_eq!(state.pop_pending().map(|j| j.id), Some(second));
    }

    #[test]
    fn test_retire_drops_oldest_finished() {
        let mut state = QueueState::default();
        let ids: Vec<JobId> = (0..3).map(|_| state.insert(job(1))).collect();
        for id in &ids {
            assert!(state.pop_pending().is_some());
            state.move_count(JobStatus::Processing, JobStatus::Completed);
            state.retire(*id, 2);
        }

        assert!(!state.jobs.contains_key(&ids[0]));
        assert!(state.jobs.contains_key(&ids[1]));
        assert!(state.jobs.contains_key(&ids[2]));
        assert_eq!(state.finished.len(), 2);
        assert_eq!(state.completed, 3);
        assert_eq!(state.submitted, 3);
    }

    #[tokio::test]
    async fn test_finished_jobs_beyond_limit_are_evicted() {
        let shared = QueueShared::new(QueueConfig::default().with_max_retained_terminal(2));

        let mut ids = Vec::new();
        for _ in 0..4 {
            let id = shared.submit(job(1)).await.expect("submit should succeed");
            let popped = shared.pop_next().await.expect("job should be pending");
            assert_eq!(popped.id, id);
            shared
                .complete(id, JobOutput::default(), Duration::from_millis(1))
                .await;
            ids.push(id);
        }

        assert!(matches!(
            shared.status(ids[0]).await,
            Err(QueueError::NotFound(_))
        ));
        assert!(matches!(
            shared.status(ids[1]).await,
            Err(QueueError::NotFound(_))
        ));
        assert!(shared.status(ids[3]).await.is_ok());
        assert_eq!(shared.list(None).await.len(), 2);

        let stats = shared.stats().await;
        assert_eq!(stats.completed, 4);
        assert_eq!(stats.accounted(), stats.submitted);
    }

    #[tokio::test]
    async fn test_unfinished_jobs_are_never_evicted() {
        let shared = QueueShared::new(QueueConfig::default().with_max_retained_terminal(0));
        let waiting = shared.submit(job(1)).await.expect("submit should succeed");
        let done = shared.submit(job(5)).await.expect("submit should succeed");

        let popped = shared.pop_next().await.expect("job should be pending");
        assert_eq!(popped.id, done);
        shared
            .complete(done, JobOutput::default(), Duration::from_millis(1))
            .await;

        assert!(shared.status(done).await.is_err());
        assert_eq!(
            shared.status(waiting).await.map(|view| view.status).ok(),
            Some(JobStatus::Pending)
        );
    }

    #[tokio::test]
    async fn test_submit_resets_prebuilt_job_state() {
        let shared = QueueShared::new(QueueConfig::default());

        let mut stale = job(3);
        stale.mark_processing();
        stale.mark_completed(JobOutput::default());
        stale.retry_count = 2;
        let id = shared.submit(stale).await.expect("submit should succeed");

        let view = shared.status(id).await.expect("job should exist");
        assert_eq!(view.status, JobStatus::Pending);
        assert_eq!(view.retry_count, 0);
        assert!(view.result.is_none());
        assert!(view.completed_at.is_none());
        assert_eq!(shared.stats().await.pending, 1);
        assert_eq!(shared.pop_next().await.map(|j| j.id), Some(id));
    }

    #[tokio::test]
    async fn test_submit_rejects_duplicate_job_id() {
        let shared = QueueShared::new(QueueConfig::default());
        let original = job(1);
        let duplicate = original.clone();

        shared.submit(original).await.expect("first submit should succeed");
        let result = shared.submit(duplicate).await;
        assert!(matches!(result, Err(QueueError::InvalidPayload(_))));
        assert_eq!(shared.stats().await.submitted, 1);
    }

    #[test]
    fn test_config_default() {
        let config = QueueConfig::default();
        assert_eq!(config.capacity, 1000);
        assert_eq!(config.num_workers, 5);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(
            config.backoff_ladder,
            vec![
                Duration::from_secs(30),
                Duration::from_secs(60),
                Duration::from_secs(300)
            ]
        );
        assert_eq!(config.default_max_retries, 3);
        assert_eq!(config.max_retained_terminal, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = QueueConfig::new()
            .with_capacity(10)
            .with_num_workers(2)
            .with_poll_interval(Duration::from_millis(50))
            .with_backoff_ladder(vec![Duration::from_millis(1)])
            .with_default_max_retries(5)
            .with_job_timeout(Duration::from_secs(5))
            .with_shutdown_timeout(Duration::from_secs(2));

        assert_eq!(config.capacity, 10);
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.default_max_retries, 5);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let err = QueueConfig::new().with_capacity(0).validate().unwrap_err();
        assert!(err.to_string().contains("capacity"));

        let err = QueueConfig::new()
            .with_backoff_ladder(vec![Duration::from_secs(60), Duration::from_secs(30)])
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("non-decreasing"));

        let err = QueueConfig::new()
            .with_backoff_ladder(Vec::new())
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("backoff_ladder"));
    }

    #[test]
    fn test_stats_accounting() {
        let stats = QueueStats {
            pending: 2,
            processing: 1,
            retrying: 1,
            completed: 5,
            failed: 1,
            retried: 3,
            submitted: 10,
            active_workers: 3,
            capacity: 1000,
        };
        assert_eq!(stats.in_flight(), 4);
        assert_eq!(stats.accounted(), stats.submitted);
        assert!(!stats.is_idle());
    }

    #[test]
    fn test_queue_error_display() {
        let err = QueueError::QueueFull { capacity: 3 };
        assert!(err.to_string().contains("full"));

        let id = JobId::new_v4();
        let err = QueueError::NotFound(id);
        assert!(err.to_string().contains(&id.to_string()));

        let err = QueueError::NotCancellable {
            id,
            status: JobStatus::Processing,
        };
        assert!(err.to_string().contains("processing"));
    }
}
