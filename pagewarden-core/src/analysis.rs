//! The `analyze_url` job: drives a record through
//! `queued -> processing -> completed | error` and persists the result.

use crate::events::{EventKind, EventSink, StatusEvent};
use crate::model::{BrokenLink, UrlRecord, UrlStatus};
use crate::pool::{Job, JobError, JobHandler};
use crate::store::{self, UrlRepository};
use async_trait::async_trait;
use pagewarden_scanner::{Analyzer, PageAnalysis};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzePayload {
    pub url_id: i64,
}

/// Upper bound on the time kept back from the probe phase for persisting.
const PERSIST_MARGIN: Duration = Duration::from_secs(2);

/// Probing must stop early enough for the result to be written before the
/// pool's job timeout fires.
fn probe_deadline(started: Instant, job_timeout: Duration) -> Instant {
    let margin = PERSIST_MARGIN.min(job_timeout / 5);
    started + job_timeout.saturating_sub(margin)
}

pub struct AnalyzeHandler {
    repo: Arc<dyn UrlRepository>,
    events: Arc<dyn EventSink>,
    analyzer: Analyzer,
    store_timeout: Duration,
    job_timeout: Option<Duration>,
}

impl AnalyzeHandler {
    pub fn new(
        repo: Arc<dyn UrlRepository>,
        events: Arc<dyn EventSink>,
        analyzer: Analyzer,
        store_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            events,
            analyzer,
            store_timeout,
            job_timeout: None,
        }
    }

    /// Budget link probing against the pool's per-job timeout.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    async fn store<T, F>(&self, call: F) -> Result<T, JobError>
    where
        F: Future<Output = store::StoreResult<T>>,
    {
        Ok(store::bounded(self.store_timeout, call).await?)
    }

    async fn begin(&self, url_id: i64) -> Result<UrlRecord, JobError> {
        let mut record = self.store(self.repo.find_by_id(url_id)).await?;
        record.status = UrlStatus::Processing;
        record.error_message = None;

        let record = self.store(self.repo.update(&record)).await?;
        self.events
            .publish(StatusEvent::new(url_id, EventKind::Processing));
        Ok(record)
    }

    /// Replace the broken-link set, then persist metrics and `completed` together.
    async fn complete(&self, mut record: UrlRecord, analysis: &PageAnalysis) -> Result<(), JobError> {
        self.store(self.repo.delete_broken_links_by_url_id(record.id))
            .await?;
        for outcome in &analysis.broken_links {
            let link = BrokenLink {
                error_message: outcome.error.clone(),
                ..BrokenLink::new(record.id, outcome.url.clone(), outcome.status_code)
            };
            self.store(self.repo.save_broken_link(link)).await?;
        }

        record.apply_analysis(analysis);
        record.status = UrlStatus::Completed;
        record.error_message = None;
        let record = self.store(self.repo.update(&record)).await?;

        let payload = serde_json::to_value(&record).unwrap_or_default();
        self.events
            .publish(StatusEvent::new(record.id, EventKind::Completed).with_data(payload));
        Ok(())
    }

    /// Persist `error` with no metrics left behind.
    async fn fail(&self, mut record: UrlRecord, error: &JobError) -> Result<(), JobError> {
        self.store(self.repo.delete_broken_links_by_url_id(record.id))
            .await?;

        let message = error.to_string();
        record.clear_metrics();
        record.status = UrlStatus::Error;
        record.error_message = Some(message.clone());
        self.store(self.repo.update(&record)).await?;

        self.events.publish(
            StatusEvent::new(record.id, EventKind::Error).with_data(json!({ "error": message })),
        );
        Ok(())
    }
}

#[async_trait]
impl JobHandler for AnalyzeHandler {
    async fn handle(&self, job: &Job, cancel: CancellationToken) -> Result<(), JobError> {
        let deadline = self
            .job_timeout
            .map(|timeout| probe_deadline(Instant::now(), timeout));
        let payload: AnalyzePayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| JobError::InvalidPayload(e.to_string()))?;

        let record = self.begin(payload.url_id).await?;
        debug!(job_id = %job.id, url_id = record.id, "Analyzing {}", record.url);

        let result = match Url::parse(&record.url) {
            Ok(url) => self
                .analyzer
                .analyze_until(&url, &cancel, deadline)
                .await
                .map_err(JobError::from),
            Err(e) => Err(JobError::InvalidPayload(format!(
                "stored url {} is invalid: {}",
                record.url, e
            ))),
        };

        match result {
            Ok(analysis) => self.complete(record, &analysis).await,
            Err(error) => {
                warn!(job_id = %job.id, url_id = record.id, "Analysis failed: {}", error);
                self.fail(record, &error).await?;
                Err(error)
            }
        }
    }
}
