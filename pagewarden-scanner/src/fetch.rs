use crate::error::{Result, ScanError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

pub const DEFAULT_USER_AGENT: &str = concat!(
    "pagewarden/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/trapdoorsec/pagewarden)"
);

/// Limits applied to the page fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_redirects: usize,
    pub max_response_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            max_redirects: 5,
            max_response_bytes: 10 * 1024 * 1024,
        }
    }
}

/// A successfully fetched (2xx) page body.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects; relative links resolve against this.
    pub url: Url,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub body: String,
    /// Set when the body was cut at `max_response_bytes`.
    pub truncated: bool,
    pub response_time: Duration,
}

pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .connect_timeout(config.timeout / 2)
            .pool_max_idle_per_host(10) // Connection pooling
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    /// The underlying client, shared with the link prober for connection reuse.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// GET `url`, honoring `cancel`. Non-2xx responses are errors.
    pub async fn fetch(&self, url: &Url, cancel: &CancellationToken) -> Result<FetchedPage> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ScanError::Cancelled),
            result = self.fetch_page(url) => result,
        }
    }

    async fn fetch_page(&self, url: &Url) -> Result<FetchedPage> {
        debug!("Fetching {}", url);

        let start = Instant::now();
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let final_url = response.url().clone();
        if !status.is_success() {
            return Err(ScanError::HttpStatus {
                status: status.as_u16(),
                url: final_url.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let cap = self.config.max_response_bytes;
        let mut body: Vec<u8> = Vec::new();
        let mut truncated = false;

        while let Some(chunk) = response.chunk().await.map_err(|e| self.classify(e))? {
            let remaining = cap - body.len();
            if chunk.len() > remaining {
                body.extend_from_slice(&chunk[..remaining]);
                truncated = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }

        if truncated {
            debug!("Body of {} truncated at {} bytes", final_url, cap);
        }

        Ok(FetchedPage {
            url: final_url,
            status_code: status.as_u16(),
            content_type,
            body: String::from_utf8_lossy(&body).into_owned(),
            truncated,
            response_time: start.elapsed(),
        })
    }

    fn classify(&self, error: reqwest::Error) -> ScanError {
        if error.is_redirect() {
            ScanError::RedirectLimitExceeded(self.config.max_redirects)
        } else if error.is_timeout() {
            ScanError::Timeout(self.config.timeout)
        } else {
            ScanError::HttpError(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    fn page(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-type", "text/html")
            .set_body_bytes(body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(page("<html><title>Hi</title></html>"))
            .mount(&mock_server)
            .await;

        let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
        let url = Url::parse(&mock_server.uri()).unwrap();
        let fetched = fetcher.fetch(&url, &CancellationToken::new()).await.unwrap();

        assert_eq!(fetched.status_code, 200);
        assert!(fetched.body.contains("<title>Hi</title>"));
        assert!(!fetched.truncated);
        assert_eq!(fetched.content_type.as_deref(), Some("text/html"));
    }

    #[tokio::test]
    async fn test_fetch_non_success_is_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/missing", mock_server.uri())).unwrap();
        let err = fetcher
            .fetch(&url, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::HttpStatus { status: 404, .. }));
        assert!(err.is_fetch_failure());
    }

    #[tokio::test]
    async fn test_fetch_truncates_at_cap() {
        let mock_server = MockServer::start().await;
        let big = "a".repeat(4096);
        Mock::given(method("GET"))
            .and(path("/big"))
            .respond_with(page(&big))
            .mount(&mock_server)
            .await;

        let config = FetchConfig {
            max_response_bytes: 1000,
            ..FetchConfig::default()
        };
        let fetcher = Fetcher::new(config).unwrap();
        let url = Url::parse(&format!("{}/big", mock_server.uri())).unwrap();
        let fetched = fetcher.fetch(&url, &CancellationToken::new()).await.unwrap();

        assert_eq!(fetched.body.len(), 1000);
        assert!(fetched.truncated);
    }

    #[tokio::test]
    async fn test_fetch_redirect_limit() {
        let mock_server = MockServer::start().await;
        for i in 0..5 {
            Mock::given(method("GET"))
                .and(path(format!("/hop{}", i)))
                .respond_with(
                    ResponseTemplate::new(302)
                        .insert_header("location", format!("/hop{}", i + 1).as_str()),
                )
                .mount(&mock_server)
                .await;
        }

        let config = FetchConfig {
            max_redirects: 2,
            ..FetchConfig::default()
        };
        let fetcher = Fetcher::new(config).unwrap();
        let url = Url::parse(&format!("{}/hop0", mock_server.uri())).unwrap();
        let err = fetcher
            .fetch(&url, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::RedirectLimitExceeded(2)));
    }

    #[tokio::test]
    async fn test_fetch_cancelled() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(page("slow").set_delay(Duration::from_secs(5)))
            .mount(&mock_server)
            .await;

        let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
        let url = Url::parse(&mock_server.uri()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fetcher.fetch(&url, &cancel).await.unwrap_err();
        assert!(matches!(err, ScanError::Cancelled));
    }
}
