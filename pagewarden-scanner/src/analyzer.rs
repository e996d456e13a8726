use crate::error::{Result, ScanError};
use crate::extract::extract_signals;
use crate::fetch::{FetchConfig, Fetcher};
use crate::links::{LinkKind, resolve_links};
use crate::probe::{LinkProber, ProbeConfig};
use crate::result::PageAnalysis;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

/// Fetches one page, extracts its structure and probes its outbound links.
pub struct Analyzer {
    fetcher: Fetcher,
    prober: LinkProber,
}

impl Analyzer {
    pub fn new(fetch_config: FetchConfig, probe_config: ProbeConfig) -> Result<Self> {
        let fetcher = Fetcher::new(fetch_config)?;
        let prober = LinkProber::new(fetcher.client().clone(), probe_config);
        Ok(Self { fetcher, prober })
    }

    pub async fn analyze(&self, url: &Url, cancel: &CancellationToken) -> Result<PageAnalysis> {
        self.analyze_until(url, cancel, None).await
    }

    /// Analyze with link probing cut off at `probe_deadline`. Links still
    /// unchecked at the deadline are reported broken; the page itself
    /// still completes.
    pub async fn analyze_until(
        &self,
        url: &Url,
        cancel: &CancellationToken,
        probe_deadline: Option<Instant>,
    ) -> Result<PageAnalysis> {
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ScanError::InvalidUrl(url.to_string()));
        }

        let page = self.fetcher.fetch(url, cancel).await?;

        // Parsed document is dropped inside extract_signals, before the next await
        let signals = extract_signals(&page.body);
        let links = resolve_links(&page.url, signals.hrefs.iter().map(String::as_str));

        let internal_links = links
            .iter()
            .filter(|l| l.kind == LinkKind::Internal)
            .count();
        let external_links = links.len() - internal_links;
        debug!(
            "{}: {} internal, {} external links",
            page.url, internal_links, external_links
        );

        let targets: Vec<Url> = links
            .into_iter()
            .filter(|l| l.is_probeable())
            .map(|l| l.url)
            .collect();
        let broken_links: Vec<_> = self
            .prober
            .probe_until(&targets, cancel, probe_deadline)
            .await?
            .into_iter()
            .filter(|outcome| outcome.is_broken())
            .collect();

        info!(
            "Analyzed {} ({} probed links, {} broken)",
            url,
            targets.len(),
            broken_links.len()
        );

        Ok(PageAnalysis {
            url: url.to_string(),
            final_url: page.url.to_string(),
            title: signals.title,
            html_version: signals.html_version,
            headings: signals.headings,
            internal_links,
            external_links,
            has_login_form: signals.has_login_form,
            broken_links,
            truncated: page.truncated,
        })
    }
}
