use chrono::{DateTime, Utc};
use pagewarden_scanner::{HeadingCounts, PageAnalysis};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl UrlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlStatus::Queued => "queued",
            UrlStatus::Processing => "processing",
            UrlStatus::Completed => "completed",
            UrlStatus::Error => "error",
        }
    }
}

impl FromStr for UrlStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(UrlStatus::Queued),
            "processing" => Ok(UrlStatus::Processing),
            "completed" => Ok(UrlStatus::Completed),
            "error" => Ok(UrlStatus::Error),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted URL and the metrics of its latest analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub id: i64,
    pub url: String,
    pub url_hash: String,
    pub title: Option<String>,
    pub html_version: Option<String>,
    #[serde(flatten)]
    pub headings: HeadingCounts,
    pub internal_links: u32,
    pub external_links: u32,
    pub broken_links: u32,
    pub has_login_form: bool,
    pub status: UrlStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UrlRecord {
    /// A fresh, unsaved record in the `queued` state.
    pub fn new(url: impl Into<String>, url_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            url: url.into(),
            url_hash: url_hash.into(),
            title: None,
            html_version: None,
            headings: HeadingCounts::default(),
            internal_links: 0,
            external_links: 0,
            broken_links: 0,
            has_login_form: false,
            status: UrlStatus::Queued,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn clear_metrics(&mut self) {
        self.title = None;
        self.html_version = None;
        self.headings = HeadingCounts::default();
        self.internal_links = 0;
        self.external_links = 0;
        self.broken_links = 0;
        self.has_login_form = false;
    }

    pub fn apply_analysis(&mut self, analysis: &PageAnalysis) {
        self.title = analysis.title.clone();
        self.html_version = Some(analysis.html_version.clone());
        self.headings = analysis.headings;
        self.internal_links = analysis.internal_links as u32;
        self.external_links = analysis.external_links as u32;
        self.broken_links = analysis.broken_count() as u32;
        self.has_login_form = analysis.has_login_form;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokenLink {
    pub id: i64,
    pub url_id: i64,
    pub link_url: String,
    /// 0 when no response was obtained.
    pub status_code: u16,
    pub error_message: Option<String>,
}

impl BrokenLink {
    pub fn new(url_id: i64, link_url: impl Into<String>, status_code: u16) -> Self {
        Self {
            id: 0,
            url_id,
            link_url: link_url.into(),
            status_code,
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Title,
    Url,
    HtmlVersion,
    InternalLinks,
    ExternalLinks,
    BrokenLinks,
    HasLoginForm,
    Status,
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    /// Column name; also the accepted textual form.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Title => "title",
            SortField::Url => "url",
            SortField::HtmlVersion => "html_version",
            SortField::InternalLinks => "internal_links",
            SortField::ExternalLinks => "external_links",
            SortField::BrokenLinks => "broken_links",
            SortField::HasLoginForm => "has_login_form",
            SortField::Status => "status",
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
        }
    }

    pub fn compare(&self, a: &UrlRecord, b: &UrlRecord) -> Ordering {
        match self {
            SortField::Title => a.title.cmp(&b.title),
            SortField::Url => a.url.cmp(&b.url),
            SortField::HtmlVersion => a.html_version.cmp(&b.html_version),
            SortField::InternalLinks => a.internal_links.cmp(&b.internal_links),
            SortField::ExternalLinks => a.external_links.cmp(&b.external_links),
            SortField::BrokenLinks => a.broken_links.cmp(&b.broken_links),
            SortField::HasLoginForm => a.has_login_form.cmp(&b.has_login_form),
            SortField::Status => a.status.as_str().cmp(b.status.as_str()),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let field = match s.to_lowercase().as_str() {
            "title" => SortField::Title,
            "url" => SortField::Url,
            "html_version" => SortField::HtmlVersion,
            "internal_links" | "internal_links_count" => SortField::InternalLinks,
            "external_links" | "external_links_count" => SortField::ExternalLinks,
            "broken_links" | "broken_links_count" => SortField::BrokenLinks,
            "has_login_form" => SortField::HasLoginForm,
            "status" => SortField::Status,
            "created_at" => SortField::CreatedAt,
            "updated_at" => SortField::UpdatedAt,
            other => return Err(format!("unknown sort field '{}'", other)),
        };
        Ok(field)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Listing criteria. Every `Some` field narrows the result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrlFilter {
    /// Matches url, title or html version.
    pub search: Option<String>,
    pub status: Option<UrlStatus>,
    pub title: Option<String>,
    pub html_version: Option<String>,
    pub internal_links: Option<u32>,
    pub min_internal_links: Option<u32>,
    pub max_internal_links: Option<u32>,
    pub external_links: Option<u32>,
    pub min_external_links: Option<u32>,
    pub max_external_links: Option<u32>,
    pub broken_links: Option<u32>,
    pub min_broken_links: Option<u32>,
    pub max_broken_links: Option<u32>,
    pub has_login_form: Option<bool>,
    /// `None` means newest first.
    pub sort_by: Option<SortField>,
    pub sort_direction: SortDirection,
    pub page: u32,
    pub limit: u32,
}

impl UrlFilter {
    /// Clamp paging: page < 1 becomes 1, a limit outside 1..=100 becomes 10.
    pub fn normalized(mut self) -> Self {
        if self.page < 1 {
            self.page = 1;
        }
        if self.limit < 1 || self.limit > MAX_PAGE_LIMIT {
            self.limit = DEFAULT_PAGE_LIMIT;
        }
        self
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.limit as usize
    }

    /// Effective ordering.
    pub fn ordering(&self) -> (SortField, SortDirection) {
        match self.sort_by {
            Some(field) => (field, self.sort_direction),
            None => (SortField::CreatedAt, SortDirection::Desc),
        }
    }

    pub fn matches(&self, record: &UrlRecord) -> bool {
        if let Some(search) = &self.search {
            let hit = contains_ci(Some(&record.url), search)
                || contains_ci(record.title.as_deref(), search)
                || contains_ci(record.html_version.as_deref(), search);
            if !hit {
                return false;
            }
        }
        if let Some(status) = self.status
            && record.status != status
        {
            return false;
        }
        if let Some(title) = &self.title
            && !contains_ci(record.title.as_deref(), title)
        {
            return false;
        }
        if let Some(version) = &self.html_version
            && !contains_ci(record.html_version.as_deref(), version)
        {
            return false;
        }
        if let Some(flag) = self.has_login_form
            && record.has_login_form != flag
        {
            return false;
        }

        in_range(
            record.internal_links,
            self.internal_links,
            self.min_internal_links,
            self.max_internal_links,
        ) && in_range(
            record.external_links,
            self.external_links,
            self.min_external_links,
            self.max_external_links,
        ) && in_range(
            record.broken_links,
            self.broken_links,
            self.min_broken_links,
            self.max_broken_links,
        )
    }
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack
        .map(|h| h.to_lowercase().contains(&needle.to_lowercase()))
        .unwrap_or(false)
}

fn in_range(value: u32, exact: Option<u32>, min: Option<u32>, max: Option<u32>) -> bool {
    exact.is_none_or(|e| value == e) && min.is_none_or(|m| value >= m) && max.is_none_or(|m| value <= m)
}

/// One page of listing results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlPage {
    pub records: Vec<UrlRecord>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
}
