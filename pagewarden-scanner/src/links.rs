use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Internal,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    pub url: Url,
    pub kind: LinkKind,
}

impl ResolvedLink {
    /// Only http(s) targets with a host get a liveness probe.
    pub fn is_probeable(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https") && self.url.host_str().is_some()
    }
}

/// Resolve `hrefs` against `base` (the page's final URL).
///
/// Fragments are dropped and duplicates collapse to their first
/// occurrence. Non-http schemes (`ftp:`, `data:`, ...) are kept and
/// counted; they classify as external unless host and port match.
pub fn resolve_links<'a, I>(base: &Url, hrefs: I) -> Vec<ResolvedLink>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for href in hrefs {
        let Some(url) = resolve_href(base, href) else {
            continue;
        };
        if !seen.insert(url.as_str().to_string()) {
            continue;
        }
        let kind = classify(base, &url);
        links.push(ResolvedLink { url, kind });
    }

    links
}

fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let mut url = base.join(href.trim()).ok()?;
    url.set_fragment(None);
    Some(url)
}

fn classify(base: &Url, url: &Url) -> LinkKind {
    if url.host_str() == base.host_str() && url.port_or_known_default() == base.port_or_known_default()
    {
        LinkKind::Internal
    } else {
        LinkKind::External
    }
}
