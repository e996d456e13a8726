use crate::error::{Result, ScanError};
use crate::result::ProbeOutcome;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Error text for links the probe phase ran out of time for.
pub const UNPROBED: &str = "probe budget exhausted before the link was checked";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub head_timeout: Duration,
    /// Timeout of the single GET fallback after a failed HEAD.
    pub get_timeout: Duration,
    pub concurrency: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            head_timeout: Duration::from_secs(5),
            get_timeout: Duration::from_secs(3),
            concurrency: 10,
        }
    }
}

/// Liveness checker for outbound links.
#[derive(Clone)]
pub struct LinkProber {
    client: Client,
    config: ProbeConfig,
}

impl LinkProber {
    pub fn new(client: Client, config: ProbeConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// HEAD `url`, falling back once to GET if HEAD gets no response at all.
    pub async fn probe(&self, url: &Url) -> ProbeOutcome {
        let head = self
            .client
            .head(url.clone())
            .timeout(self.config.head_timeout)
            .send()
            .await;

        let response = match head {
            Ok(response) => Ok(response),
            Err(e) => {
                debug!("HEAD {} failed ({}), retrying with GET", url, e);
                self.client
                    .get(url.clone())
                    .timeout(self.config.get_timeout)
                    .send()
                    .await
            }
        };

        match response {
            Ok(response) => ProbeOutcome {
                url: url.to_string(),
                status_code: response.status().as_u16(),
                error: None,
            },
            Err(e) => ProbeOutcome {
                url: url.to_string(),
                status_code: 0,
                error: Some(e.to_string()),
            },
        }
    }

    /// Probe every url with bounded fan-out. Outcomes keep the input order.
    pub async fn probe_all(
        &self,
        urls: &[Url],
        cancel: &CancellationToken,
    ) -> Result<Vec<ProbeOutcome>> {
        self.probe_until(urls, cancel, None).await
    }

    /// Like [`probe_all`](Self::probe_all), but stops waiting at `deadline`.
    /// Links without an outcome by then are reported broken with status 0.
    pub async fn probe_until(
        &self,
        urls: &[Url],
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<Vec<ProbeOutcome>> {
        let concurrency = self.config.concurrency.max(1);
        let prober = self.clone();
        let mut probes = stream::iter(urls.to_vec())
            .map(move |url| {
                let prober = prober.clone();
                async move { prober.probe(&url).await }
            })
            .buffered(concurrency);

        let expired = async {
            match deadline {
                Some(deadline) => time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expired);

        let mut outcomes = Vec::with_capacity(urls.len());
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ScanError::Cancelled),
                _ = &mut expired => break,
                next = probes.next() => match next {
                    Some(outcome) => outcomes.push(outcome),
                    None => return Ok(outcomes),
                },
            }
        }

        let skipped = urls.len() - outcomes.len();
        if skipped > 0 {
            warn!("Probe budget exhausted, {} link(s) left unprobed", skipped);
        }
        outcomes.extend(urls[outcomes.len()..].iter().map(|url| ProbeOutcome {
            url: url.to_string(),
            status_code: 0,
            error: Some(UNPROBED.to_string()),
        }));
        Ok(outcomes)
    }
}
