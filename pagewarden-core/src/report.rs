// Report rendering for analyzed URLs

use crate::model::{BrokenLink, UrlPage, UrlRecord, UrlStatus};
use colored::Colorize;
use serde::{Deserialize, Serialize};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

/// A record together with its current broken links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlReport {
    #[serde(flatten)]
    pub record: UrlRecord,
    pub broken_link_details: Vec<BrokenLink>,
}

pub fn render_report(report: &UrlReport, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(report)),
        ReportFormat::Json => serde_json::to_string_pretty(report),
    }
}

pub fn render_reports(reports: &[UrlReport], format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(reports.iter().map(generate_text_report).collect()),
        ReportFormat::Json => serde_json::to_string_pretty(reports),
    }
}

pub fn render_page(page: &UrlPage, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_list_text(page)),
        ReportFormat::Json => serde_json::to_string_pretty(page),
    }
}

fn status_label(status: UrlStatus) -> String {
    let label = status.as_str().to_uppercase();
    match status {
        UrlStatus::Completed => label.green().to_string(),
        UrlStatus::Error => label.red().to_string(),
        UrlStatus::Processing => label.yellow().to_string(),
        UrlStatus::Queued => label.dimmed().to_string(),
    }
}

pub fn generate_text_report(report: &UrlReport) -> String {
    let record = &report.record;
    let mut out = String::new();

    out.push_str(RULE);
    out.push_str(&format!("[{}] {}\n", record.id, record.url.bold()));
    out.push_str(RULE);

    out.push_str(&format!("Status:         {}\n", status_label(record.status)));
    if let Some(error) = &record.error_message {
        out.push_str(&format!("Error:          {}\n", error.red()));
    }
    out.push_str(&format!(
        "Title:          {}\n",
        record.title.as_deref().unwrap_or("-")
    ));
    out.push_str(&format!(
        "HTML Version:   {}\n",
        record.html_version.as_deref().unwrap_or("-")
    ));

    let h = &record.headings;
    out.push_str(&format!(
        "Headings:       h1={} h2={} h3={} h4={} h5={} h6={}\n",
        h.h1, h.h2, h.h3, h.h4, h.h5, h.h6
    ));
    out.push_str(&format!("Internal Links: {}\n", record.internal_links));
    out.push_str(&format!("External Links: {}\n", record.external_links));
    out.push_str(&format!("Broken Links:   {}\n", record.broken_links));
    out.push_str(&format!(
        "Login Form:     {}\n",
        if record.has_login_form { "yes" } else { "no" }
    ));
    out.push_str(&format!(
        "Updated:        {}\n",
        record.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    if !report.broken_link_details.is_empty() {
        out.push('\n');
        for link in &report.broken_link_details {
            let code = if link.status_code == 0 {
                "---".to_string()
            } else {
                link.status_code.to_string()
            };
            out.push_str(&format!("  {} {}", code.red(), link.link_url));
            if let Some(error) = &link.error_message {
                out.push_str(&format!("  ({})", error));
            }
            out.push('\n');
        }
    }
    out.push('\n');
    out
}

fn generate_list_text(page: &UrlPage) -> String {
    let mut out = String::new();

    if page.records.is_empty() {
        out.push_str("No URLs found.\n");
        return out;
    }

    out.push_str(&format!(
        "{:>5}  {:<10}  {:>5}  {:>5}  {:>6}  {}\n",
        "ID", "STATUS", "INT", "EXT", "BROKEN", "URL"
    ));
    for record in &page.records {
        out.push_str(&format!(
            "{:>5}  {:<10}  {:>5}  {:>5}  {:>6}  {}\n",
            record.id,
            record.status.as_str(),
            record.internal_links,
            record.external_links,
            record.broken_links,
            record.url
        ));
    }

    let pages = page.total.div_ceil(page.limit.max(1) as usize).max(1);
    out.push_str(&format!(
        "\nPage {} of {} ({} total)\n",
        page.page, pages, page.total
    ));
    out
}
