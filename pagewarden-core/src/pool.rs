//! Bounded asynchronous job pool.
//!
//! A fixed set of worker tasks drains one shared bounded queue. Submission
//! never blocks: a full queue is reported to the caller immediately. Failed
//! jobs with retryable errors are re-enqueued after a linear backoff that
//! runs off the worker, so a waiting retry never occupies a worker slot.

use crate::store::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pagewarden_scanner::ScanError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How long a timed-out handler may take to settle after its token is cancelled.
const SETTLE_GRACE: Duration = Duration::from_secs(5);

/// Routing tag of a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobType(Cow<'static, str>);

impl JobType {
    pub const ANALYZE_URL: JobType = JobType(Cow::Borrowed("analyze_url"));

    pub fn new(tag: impl Into<Cow<'static, str>>) -> Self {
        JobType(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub job_type: JobType,
    pub payload: Value,
    pub retry: u32,
    pub max_retry: u32,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(job_type: JobType, payload: Value, max_retry: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_type,
            payload,
            retry: 0,
            max_retry,
            created_at: Utc::now(),
        }
    }

    fn age(&self) -> Duration {
        (Utc::now() - self.created_at).to_std().unwrap_or_default()
    }
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("job timed out after {0:?}")]
    Timeout(Duration),

    #[error("job cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("invalid job payload: {0}")]
    InvalidPayload(String),
}

impl JobError {
    /// Only fetch-class failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::Fetch(_) | JobError::Timeout(_))
    }
}

impl From<ScanError> for JobError {
    fn from(error: ScanError) -> Self {
        match error {
            ScanError::Cancelled => JobError::Cancelled,
            ScanError::InvalidUrl(url) => JobError::InvalidPayload(format!("invalid url {}", url)),
            other => JobError::Fetch(other.to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("job queue is full")]
    QueueFull,

    #[error("worker pool is stopped")]
    Stopped,

    #[error("no handler registered for job type '{0}'")]
    UnhandledJobType(JobType),
}

/// Executes jobs of one type.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// `cancel` fires on job timeout or pool shutdown; handlers must stop promptly.
    async fn handle(&self, job: &Job, cancel: CancellationToken) -> Result<(), JobError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
    Unhandled,
    Dropped,
}

/// Terminal result of a job, broadcast to outcome subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: String,
    pub job_type: JobType,
    pub payload: Value,
    pub retries: u32,
    pub status: OutcomeStatus,
    pub error: Option<String>,
    /// Time since the job was created.
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub worker_count: usize,
    pub queue_depth: usize,
    pub queue_capacity: usize,
}

pub struct WorkerPoolBuilder {
    workers: usize,
    capacity: usize,
    job_timeout: Duration,
    retry_interval: Duration,
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl WorkerPoolBuilder {
    pub fn new(workers: usize, capacity: usize) -> Self {
        Self {
            workers: workers.max(1),
            capacity: capacity.max(1),
            job_timeout: Duration::from_secs(30),
            retry_interval: Duration::from_secs(1),
            handlers: HashMap::new(),
        }
    }

    pub fn job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Replaces any handler already registered for `job_type`.
    pub fn register_handler(mut self, job_type: JobType, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(job_type, handler);
        self
    }

    /// Freeze the registry and spawn the workers. Must run inside a tokio runtime.
    pub fn start(self, shutdown: CancellationToken) -> WorkerPool {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let (outcomes, _) = broadcast::channel(self.capacity.max(64));

        let shared = Arc::new(Shared {
            sender,
            receiver: Mutex::new(receiver),
            handlers: self.handlers,
            accepting: AtomicBool::new(true),
            token: shutdown.child_token(),
            retries: TaskTracker::new(),
            outcomes,
            job_timeout: self.job_timeout,
            retry_interval: self.retry_interval,
        });

        info!(
            "Starting worker pool with {} workers (queue capacity {})",
            self.workers, self.capacity
        );

        let workers = (0..self.workers)
            .map(|worker_id| {
                let shared = Arc::clone(&shared);
                tokio::spawn(worker_loop(worker_id, shared))
            })
            .collect();

        WorkerPool {
            shared,
            workers: Mutex::new(workers),
            worker_count: self.workers,
        }
    }
}

pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl WorkerPool {
    /// Enqueue without waiting. Fails fast when the queue is full.
    pub fn add_job(&self, job: Job) -> Result<(), PoolError> {
        if !self.shared.is_accepting() {
            return Err(PoolError::Stopped);
        }

        match self.shared.sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => {
                warn!(job_id = %job.id, "Job queue full, rejecting job");
                Err(PoolError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(PoolError::Stopped),
        }
    }

    pub fn stats(&self) -> PoolStats {
        let queue_capacity = self.shared.sender.max_capacity();
        PoolStats {
            worker_count: self.worker_count,
            queue_depth: queue_capacity - self.shared.sender.capacity(),
            queue_capacity,
        }
    }

    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<JobOutcome> {
        self.shared.outcomes.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_accepting()
    }

    /// Stop accepting jobs, cancel in-flight work and wait for workers and
    /// pending retries to finish. Jobs still queued are abandoned.
    pub async fn stop(&self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        self.shared.token.cancel();
        self.shared.retries.close();

        let workers = std::mem::take(&mut *self.workers.lock().await);
        if workers.is_empty() {
            return;
        }
        info!("Stopping worker pool");

        for worker in workers {
            if let Err(e) = worker.await {
                error!("Worker task failed: {}", e);
            }
        }
        self.shared.retries.wait().await;
        self.shared.receiver.lock().await.close();

        info!("Worker pool stopped");
    }
}

struct Shared {
    sender: mpsc::Sender<Job>,
    receiver: Mutex<mpsc::Receiver<Job>>,
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
    accepting: AtomicBool,
    token: CancellationToken,
    retries: TaskTracker,
    outcomes: broadcast::Sender<JobOutcome>,
    job_timeout: Duration,
    retry_interval: Duration,
}

async fn worker_loop(worker_id: usize, shared: Arc<Shared>) {
    debug!("Worker {} started", worker_id);

    loop {
        let job = {
            let mut receiver = shared.receiver.lock().await;
            tokio::select! {
                biased;
                _ = shared.token.cancelled() => None,
                job = receiver.recv() => job,
            }
        };

        let Some(job) = job else {
            break;
        };
        shared.run(worker_id, job).await;
    }

    debug!("Worker {} exiting", worker_id);
}

impl Shared {
    fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst) && !self.token.is_cancelled()
    }

    async fn run(self: &Arc<Self>, worker_id: usize, job: Job) {
        let Some(handler) = self.handlers.get(&job.job_type).cloned() else {
            let error = PoolError::UnhandledJobType(job.job_type.clone());
            warn!(worker_id, job_id = %job.id, "{}", error);
            self.emit(&job, OutcomeStatus::Unhandled, Some(error.to_string()));
            return;
        };

        debug!(
            worker_id,
            job_id = %job.id,
            job_type = %job.job_type,
            retry = job.retry,
            "Processing job"
        );

        let started = Instant::now();
        let cancel = self.token.child_token();
        let mut handling = handler.handle(&job, cancel.clone());

        let result = match tokio::time::timeout(self.job_timeout, &mut handling).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                // Let the handler observe the cancellation and record it
                let _ = tokio::time::timeout(SETTLE_GRACE, &mut handling).await;
                Err(JobError::Timeout(self.job_timeout))
            }
        };
        drop(handling);

        match result {
            Ok(()) => {
                debug!(
                    worker_id,
                    job_id = %job.id,
                    "Job completed in {:?}",
                    started.elapsed()
                );
                self.emit(&job, OutcomeStatus::Succeeded, None);
            }
            Err(e) if e.is_retryable() && job.retry < job.max_retry && !self.token.is_cancelled() => {
                self.schedule_retry(job, e);
            }
            Err(e) => {
                warn!(worker_id, job_id = %job.id, retries = job.retry, "Job failed: {}", e);
                self.emit(&job, OutcomeStatus::Failed, Some(e.to_string()));
            }
        }
    }

    fn schedule_retry(self: &Arc<Self>, mut job: Job, error: JobError) {
        job.retry += 1;
        let delay = self.retry_interval * job.retry;
        warn!(
            job_id = %job.id,
            "Job failed ({}), retry {}/{} in {:?}",
            error,
            job.retry,
            job.max_retry,
            delay
        );

        let shared = Arc::clone(self);
        self.retries.spawn(async move {
            tokio::select! {
                biased;
                _ = shared.token.cancelled() => {
                    shared.emit(&job, OutcomeStatus::Failed, Some("pool stopped before retry".to_string()));
                }
                _ = tokio::time::sleep(delay) => {
                    match shared.sender.try_send(job) {
                        Ok(()) => {}
                        Err(TrySendError::Full(job)) => {
                            warn!(job_id = %job.id, "Queue full on retry, dropping job");
                            shared.emit(&job, OutcomeStatus::Dropped, Some(PoolError::QueueFull.to_string()));
                        }
                        Err(TrySendError::Closed(job)) => {
                            shared.emit(&job, OutcomeStatus::Failed, Some(PoolError::Stopped.to_string()));
                        }
                    }
                }
            }
        });
    }

    fn emit(&self, job: &Job, status: OutcomeStatus, error: Option<String>) {
        let outcome = JobOutcome {
            job_id: job.id.clone(),
            job_type: job.job_type.clone(),
            payload: job.payload.clone(),
            retries: job.retry,
            status,
            error,
            duration: job.age(),
        };
        // Best effort: nobody listening is fine
        let _ = self.outcomes.send(outcome);
    }
}
