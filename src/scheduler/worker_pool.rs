//! Worker pool driving jobs through their handler.
//!
//! Each worker runs as an independent tokio task that pops the best pending
//! job from the shared queue state, runs it through the [`JobHandler`] and
//! reports the outcome back.
//!
//! # Features
//!
//! - Idle workers wait on a notification, bounded by the poll interval
//! - Graceful shutdown with a broadcast channel
//! - Retry delays run on detached timers, never on a worker
//! - Per-attempt timeout and panic isolation

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::JobError;

use super::job::{Job, JobId, JobOutput};
use super::queue::{QueueError, QueueShared};

/// Runs one attempt of a job.
///
/// The queue owns retries; a handler only reports what happened.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<JobOutput, JobError>;
}

/// Worker tasks belonging to one queue.
pub(crate) struct WorkerPool {
    handler: Arc<dyn JobHandler>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub(crate) fn new(handler: Arc<dyn JobHandler>) -> Self {
        Self {
            handler,
            shutdown_tx: None,
            worker_handles: Vec::new(),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    pub(crate) fn start(&mut self, shared: &Arc<QueueShared>, worker_count: usize) {
        // Buffer size of 1 is sufficient since we only send once
        let (shutdown_tx, _) = broadcast::channel(1);

        for i in 0..worker_count {
            let worker = Worker {
                id: format!("worker-{}", i),
                shared: Arc::clone(shared),
                handler: Arc::clone(&self.handler),
                shutdown_rx: shutdown_tx.subscribe(),
                _running: RunningGuard::new(Arc::clone(shared)),
            };

            self.worker_handles.push(tokio::spawn(worker.run()));
        }

        self.shutdown_tx = Some(shutdown_tx);
        info!(num_workers = worker_count, "Worker pool started");
    }

    pub(crate) async fn shutdown(&mut self, shared: &Arc<QueueShared>) -> Result<(), QueueError> {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            debug!("Worker pool not running, nothing to stop");
            return Ok(());
        };

        info!("Initiating worker pool shutdown");

        // Ignore send error - workers may have already stopped
        let _ = shutdown_tx.send(());

        let timeout = shared.config().shutdown_timeout;
        let mut handles = std::mem::take(&mut self.worker_handles);

        match tokio::time::timeout(timeout, join_all(handles.iter_mut())).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        error!(error = %e, "Worker task panicked during shutdown");
                    }
                }
                info!("Worker pool shutdown complete");
                Ok(())
            }
            Err(_) => {
                for handle in &handles {
                    handle.abort();
                }
                for handle in handles {
                    let _ = handle.await;
                }

                let reclaimed = shared.reclaim_processing().await;
                warn!(
                    reclaimed = reclaimed,
                    timeout_secs = timeout.as_secs(),
                    "Workers aborted after shutdown timeout, held jobs returned to queue"
                );
                Err(QueueError::ShutdownTimeout(timeout))
            }
        }
    }
}

/// Counts a worker as running from spawn until its task is dropped,
/// including when the task is aborted.
struct RunningGuard(Arc<QueueShared>);

impl RunningGuard {
    fn new(shared: Arc<QueueShared>) -> Self {
        shared.worker_started();
        Self(shared)
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.worker_stopped();
    }
}

/// A single worker that processes jobs from the queue.
struct Worker {
    id: String,
    shared: Arc<QueueShared>,
    handler: Arc<dyn JobHandler>,
    shutdown_rx: broadcast::Receiver<()>,
    _running: RunningGuard,
}

impl Worker {
    /// Main worker loop.
    ///
    /// Takes jobs until a shutdown signal is received. The signal is only
    /// observed between jobs, so a job in hand always runs to completion.
    async fn run(mut self) {
        info!(worker_id = %self.id, "Worker started");

        loop {
            match self.shutdown_rx.try_recv() {
                Ok(()) | Err(broadcast::error::TryRecvError::Closed) => {
                    info!(worker_id = %self.id, "Worker received shutdown signal");
                    break;
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    continue;
                }
                Err(broadcast::error::TryRecvError::Empty) => {}
            }

            if let Some(job) = self.shared.pop_next().await {
                self.process_job(job).await;
                continue;
            }

            let poll_interval = self.shared.config().poll_interval;
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!(worker_id = %self.id, "Worker received shutdown signal");
                    break;
                }
                _ = self.shared.notify().notified() => {}
                _ = tokio::time::sleep(poll_interval) => {
                    debug!(worker_id = %self.id, "No jobs available");
                }
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    async fn process_job(&self, job: Job) {
        let job_id = job.id;
        let start_time = Instant::now();

        info!(
            worker_id = %self.id,
            job_id = %job_id,
            priority = job.priority,
            attempt = job.retry_count + 1,
            url = %job.payload.url(),
            "Processing job"
        );

        let result = self.execute_with_timeout(&job).await;
        let elapsed = start_time.elapsed();

        match result {
            Ok(output) => {
                self.shared.complete(job_id, output, elapsed).await;
                info!(
                    worker_id = %self.id,
                    job_id = %job_id,
                    duration_ms = elapsed.as_millis() as u64,
                    "Job completed successfully"
                );
            }
            Err(e) => {
                if let Some(retry) = self.shared.fail(job_id, &e, elapsed).await {
                    spawn_retry_timer(Arc::clone(&self.shared), job_id, retry.delay);
                }
            }
        }
    }

    async fn execute_with_timeout(&self, job: &Job) -> Result<JobOutput, JobError> {
        let job_timeout = self.shared.config().job_timeout;
        let attempt = AssertUnwindSafe(self.handler.handle(job)).catch_unwind();

        match tokio::time::timeout(job_timeout, attempt).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                error!(worker_id = %self.id, job_id = %job.id, "Job handler panicked");
                Err(JobError::Other("job handler panicked".to_string()))
            }
            Err(_) => Err(JobError::Timeout(job_timeout)),
        }
    }
}

/// Re-pushes a job after `delay` on a detached task.
fn spawn_retry_timer(shared: Arc<QueueShared>, job_id: JobId, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        shared.requeue(job_id).await;
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::scheduler::job::{JobPayload, JobStatus};
    use crate::scheduler::queue::{PriorityJobQueue, QueueConfig};

    /// Records every attempt, then behaves according to `mode`.
    struct StubHandler {
        attempts: Mutex<Vec<String>>,
        mode: Mode,
    }

    enum Mode {
        Succeed,
        Fail(fn() -> JobError),
        Sleep(Duration),
        Panic,
    }

    impl StubHandler {
        fn new(mode: Mode) -> Arc<Self> {
            Arc::new(Self {
                attempts: Mutex::new(Vec::new()),
                mode,
            })
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobHandler for StubHandler {
        async fn handle(&self, job: &Job) -> Result<JobOutput, JobError> {
            self.attempts
                .lock()
                .unwrap()
                .push(job.payload.url().to_string());

            match &self.mode {
                Mode::Succeed => Ok(JobOutput::default()),
                Mode::Fail(make) => Err(make()),
                Mode::Sleep(duration) => {
                    tokio::time::sleep(*duration).await;
                    Ok(JobOutput::default())
                }
                Mode::Panic => panic!("stub handler panic"),
            }
        }
    }

    fn fast_config() -> QueueConfig {
        QueueConfig::default()
            .with_poll_interval(Duration::from_millis(10))
            .with_backoff_ladder(vec![Duration::from_millis(5)])
            .with_shutdown_timeout(Duration::from_secs(5))
    }

    async fn settle(queue: &PriorityJobQueue) {
        assert!(
            queue
                .wait_idle(Duration::from_millis(5), Duration::from_secs(5))
                .await,
            "queue did not become idle"
        );
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let handler = StubHandler::new(Mode::Succeed);
        let queue = PriorityJobQueue::new(fast_config(), handler);

        queue.start(2).await;
        queue.start(3).await;

        assert!(queue.is_running().await);
        assert_eq!(queue.stats().await.active_workers, 2);

        queue.stop().await.unwrap();
        assert!(!queue.is_running().await);
        assert_eq!(queue.stats().await.active_workers, 0);
    }

    #[tokio::test]
    async fn test_stop_when_not_running() {
        let queue = PriorityJobQueue::new(fast_config(), StubHandler::new(Mode::Succeed));
        assert!(queue.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_single_worker_dispatches_by_priority() {
        let handler = StubHandler::new(Mode::Succeed);
        let queue = PriorityJobQueue::new(fast_config(), handler.clone());

        for (priority, url) in [(1, "https://a.example"), (5, "https://b.example"), (10, "https://c.example")] {
            queue.submit(JobPayload::content(url), priority).await.unwrap();
        }

        queue.start(1).await;
        settle(&queue).await;
        queue.stop().await.unwrap();

        assert_eq!(
            handler.attempts(),
            vec!["https://c.example", "https://b.example", "https://a.example"]
        );
        assert_eq!(queue.stats().await.completed, 3);
    }

    #[tokio::test]
    async fn test_failing_job_uses_exact_retry_budget() {
        let handler = StubHandler::new(Mode::Fail(|| JobError::Other("boom".to_string())));
        let queue = PriorityJobQueue::new(fast_config(), handler.clone());

        let id = queue
            .submit(JobPayload::content("https://example.com"), 5)
            .await
            .unwrap();
        queue.start(1).await;
        settle(&queue).await;
        queue.stop().await.unwrap();

        let view = queue.status(id).await.unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.retry_count, 3);
        assert_eq!(view.last_error.as_deref(), Some("boom"));
        assert_eq!(handler.attempts().len(), 4);

        let stats = queue.stats().await;
        assert_eq!(stats.retried, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.accounted(), stats.submitted);
    }

    #[tokio::test]
    async fn test_not_relevant_is_never_retried() {
        let handler = StubHandler::new(Mode::Fail(|| JobError::NotRelevant { score: 20.0 }));
        let queue = PriorityJobQueue::new(fast_config(), handler.clone());

        let id = queue
            .submit(JobPayload::content("https://example.com"), 5)
            .await
            .unwrap();
        queue.start(1).await;
        settle(&queue).await;
        queue.stop().await.unwrap();

        let view = queue.status(id).await.unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.retry_count, 0);
        assert!(view.last_error.unwrap().contains("not relevant"));
        assert_eq!(handler.attempts().len(), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_transient() {
        let handler = StubHandler::new(Mode::Sleep(Duration::from_secs(10)));
        let config = fast_config().with_job_timeout(Duration::from_millis(20));
        let queue = PriorityJobQueue::new(config, handler.clone());

        let id = queue
            .submit(JobPayload::content("https://slow.example"), 1)
            .await
            .unwrap();
        queue.start(1).await;
        settle(&queue).await;
        queue.stop().await.unwrap();

        let view = queue.status(id).await.unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.retry_count, 2);
        assert!(view.last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_handler_panic_does_not_kill_worker() {
        let handler = StubHandler::new(Mode::Panic);
        let config = fast_config().with_default_max_retries(0);
        let queue = PriorityJobQueue::new(config, handler.clone());

        let first = queue
            .submit(JobPayload::content("https://one.example"), 1)
            .await
            .unwrap();
        let second = queue
            .submit(JobPayload::content("https://two.example"), 1)
            .await
            .unwrap();
        queue.start(1).await;
        settle(&queue).await;

        assert_eq!(queue.stats().await.active_workers, 1);
        queue.stop().await.unwrap();

        for id in [first, second] {
            let view = queue.status(id).await.unwrap();
            assert_eq!(view.status, JobStatus::Failed);
            assert!(view.last_error.unwrap().contains("panicked"));
        }
    }

    #[tokio::test]
    async fn test_stop_lets_in_flight_job_finish() {
        let handler = StubHandler::new(Mode::Sleep(Duration::from_millis(100)));
        let queue = PriorityJobQueue::new(fast_config(), handler.clone());

        let id = queue
            .submit(JobPayload::content("https://example.com"), 1)
            .await
            .unwrap();
        queue.start(1).await;

        while queue.stats().await.processing == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        queue.stop().await.unwrap();

        assert_eq!(queue.status(id).await.unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_shutdown_timeout_returns_held_jobs() {
        let handler = StubHandler::new(Mode::Sleep(Duration::from_secs(30)));
        let config = fast_config().with_shutdown_timeout(Duration::from_millis(50));
        let queue = PriorityJobQueue::new(config, handler.clone());

        let id = queue
            .submit(JobPayload::content("https://example.com"), 1)
            .await
            .unwrap();
        queue.start(1).await;

        while queue.stats().await.processing == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let err = queue.stop().await.unwrap_err();
        assert!(matches!(err, QueueError::ShutdownTimeout(_)));

        let stats = queue.stats().await;
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.processing, 0);
        assert_eq!(stats.active_workers, 0);
        assert_eq!(queue.status(id).await.unwrap().status, JobStatus::Pending);
    }
}
