use crate::analysis::{AnalyzeHandler, AnalyzePayload};
use crate::config::AnalyzerConfig;
use crate::events::{EventKind, EventSink, StatusEvent};
use crate::fingerprint::{fingerprint, normalize_url};
use crate::model::{BrokenLink, UrlFilter, UrlPage, UrlRecord};
use crate::pool::{Job, JobOutcome, JobType, PoolError, PoolStats, WorkerPool, WorkerPoolBuilder};
use crate::store::{self, StoreError, UrlRepository};
use pagewarden_scanner::{Analyzer, ScanError};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid url: {0}")]
    Validation(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("url {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("failed to build analyzer: {0}")]
    Engine(#[from] ScanError),
}

impl From<StoreError> for ServiceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => ServiceError::NotFound(id),
            other => ServiceError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Entry point for submitting, analyzing, listing and deleting URLs.
pub struct AnalyzerService {
    repo: Arc<dyn UrlRepository>,
    events: Arc<dyn EventSink>,
    pool: WorkerPool,
    config: AnalyzerConfig,
}

impl AnalyzerService {
    /// Build the analyzer, register it with a new pool and start the workers.
    pub fn start(
        config: AnalyzerConfig,
        repo: Arc<dyn UrlRepository>,
        events: Arc<dyn EventSink>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        config.validate().map_err(ServiceError::Config)?;

        let analyzer = Analyzer::new(config.fetch.clone(), config.probe.clone())?;
        let handler = AnalyzeHandler::new(
            Arc::clone(&repo),
            Arc::clone(&events),
            analyzer,
            config.store_timeout,
        )
        .with_job_timeout(config.job_timeout);

        let pool = WorkerPoolBuilder::new(config.workers, config.queue_capacity)
            .job_timeout(config.job_timeout)
            .retry_interval(config.retry_interval)
            .register_handler(JobType::ANALYZE_URL, Arc::new(handler))
            .start(shutdown);

        Ok(Self {
            repo,
            events,
            pool,
            config,
        })
    }

    async fn store<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = store::StoreResult<T>>,
    {
        Ok(store::bounded(self.config.store_timeout, call).await?)
    }

    /// Validate and register `raw`. An equivalent URL already on file is returned as is.
    pub async fn add_url(&self, raw: &str) -> Result<UrlRecord> {
        let url = validate_url(raw)?;
        let canonical = url.as_str().to_string();
        let hash = fingerprint(&canonical);

        if let Some(existing) = self.store(self.repo.find_by_hash(&hash)).await? {
            return Ok(existing);
        }

        match self
            .store(self.repo.save(UrlRecord::new(canonical, hash.clone())))
            .await
        {
            Ok(record) => {
                info!("Added url {} as id {}", record.url, record.id);
                Ok(record)
            }
            // Lost a race with a concurrent submission of the same URL
            Err(ServiceError::Store(StoreError::Conflict(_))) => self
                .store(self.repo.find_by_hash(&hash))
                .await?
                .ok_or_else(|| ServiceError::Store(StoreError::Conflict(hash))),
            Err(e) => Err(e),
        }
    }

    pub async fn get_url(&self, id: i64) -> Result<UrlRecord> {
        self.store(self.repo.find_by_id(id)).await
    }

    pub async fn list_urls(&self, filter: UrlFilter) -> Result<UrlPage> {
        let filter = filter.normalized();
        let (records, total) = self.store(self.repo.find_all(&filter)).await?;
        Ok(UrlPage {
            records,
            total,
            page: filter.page,
            limit: filter.limit,
        })
    }

    /// Enqueue one analysis job and return its id. Does not wait for it to run.
    pub async fn analyze_url(&self, id: i64) -> Result<String> {
        let record = self.store(self.repo.find_by_id(id)).await?;

        let payload = serde_json::to_value(AnalyzePayload { url_id: record.id })
            .map_err(|e| ServiceError::Validation(e.to_string()))?;
        let job = Job::new(JobType::ANALYZE_URL, payload, self.config.max_retries);
        let job_id = job.id.clone();

        // `queued` must reach subscribers before any `processing` from a worker
        self.events
            .publish(StatusEvent::new(record.id, EventKind::Queued));
        if let Err(e) = self.pool.add_job(job) {
            // Roll the announcement back to the stored status
            self.events.publish(
                StatusEvent::new(record.id, record.status.into())
                    .with_data(json!({ "rejected": e.to_string() })),
            );
            return Err(e.into());
        }
        info!(job_id = %job_id, url_id = record.id, "Queued analysis of {}", record.url);

        Ok(job_id)
    }

    /// Enqueue each id; failures are logged and skipped.
    pub async fn analyze_urls(&self, ids: &[i64]) -> Vec<(i64, String)> {
        let mut queued = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.analyze_url(id).await {
                Ok(job_id) => queued.push((id, job_id)),
                Err(e) => warn!(url_id = id, "Could not queue analysis: {}", e),
            }
        }
        queued
    }

    pub async fn delete_url(&self, id: i64) -> Result<()> {
        self.store(self.repo.delete(id)).await?;
        self.events
            .publish(StatusEvent::new(id, EventKind::Deleted));
        Ok(())
    }

    /// Returns how many records existed and were removed.
    pub async fn delete_urls(&self, ids: &[i64]) -> Result<usize> {
        let removed = self.store(self.repo.delete_batch(ids)).await?;
        for &id in ids {
            self.events
                .publish(StatusEvent::new(id, EventKind::Deleted));
        }
        Ok(removed)
    }

    pub async fn get_broken_links(&self, id: i64) -> Result<Vec<BrokenLink>> {
        self.store(self.repo.find_by_id(id)).await?;
        self.store(self.repo.find_broken_links_by_url_id(id)).await
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Subscribe before queuing to be sure to see the outcome.
    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<JobOutcome> {
        self.pool.subscribe_outcomes()
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub async fn stop(&self) {
        self.pool.stop().await;
    }
}

/// Accept only absolute http(s) URLs with a host.
pub fn validate_url(raw: &str) -> Result<url::Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ServiceError::Validation("url is required".to_string()));
    }

    let url = normalize_url(raw).map_err(|e| ServiceError::Validation(format!("{}: {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ServiceError::Validation(format!(
            "{}: scheme must be http or https",
            raw
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ServiceError::Validation(format!("{}: missing host", raw)));
    }

    Ok(url)
}
