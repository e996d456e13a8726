use pagewarden_scanner::{FetchConfig, ProbeConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pool and job settings plus the engine's fetch and probe limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub job_timeout: Duration,
    pub max_retries: u32,
    /// Base delay; retry `n` waits `n * retry_interval`.
    pub retry_interval: Duration,
    /// Upper bound on any single storage call.
    pub store_timeout: Duration,
    pub fetch: FetchConfig,
    pub probe: ProbeConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_capacity: 100,
            job_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_interval: Duration::from_secs(1),
            store_timeout: Duration::from_secs(5),
            fetch: FetchConfig::default(),
            probe: ProbeConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Raise `job_timeout` so one page fetch plus one HEAD/GET probe round
    /// fits inside it. Never lowers it.
    pub fn fit_job_timeout(&mut self) {
        if self.job_timeout < self.fetch.timeout {
            self.job_timeout = self.fetch.timeout + self.probe.head_timeout + self.probe.get_timeout;
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("workers must be at least 1".to_string());
        }
        if self.queue_capacity == 0 {
            return Err("queue capacity must be at least 1".to_string());
        }
        if self.job_timeout < self.fetch.timeout {
            return Err(format!(
                "job timeout {:?} is shorter than the fetch timeout {:?}",
                self.job_timeout, self.fetch.timeout
            ));
        }
        Ok(())
    }
}
