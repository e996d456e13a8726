use serde::{Deserialize, Serialize};

/// Heading tag counts for a single page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingCounts {
    pub h1: u32,
    pub h2: u32,
    pub h3: u32,
    pub h4: u32,
    pub h5: u32,
    pub h6: u32,
}

impl HeadingCounts {
    /// Increment the counter for heading level 1..=6. Other levels are ignored.
    pub fn record(&mut self, level: u8) {
        match level {
            1 => self.h1 += 1,
            2 => self.h2 += 1,
            3 => self.h3 += 1,
            4 => self.h4 += 1,
            5 => self.h5 += 1,
            6 => self.h6 += 1,
            _ => {}
        }
    }

    pub fn total(&self) -> u32 {
        self.h1 + self.h2 + self.h3 + self.h4 + self.h5 + self.h6
    }
}

/// Result of probing one outbound link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub url: String,
    /// Final status code, 0 when no response was obtained.
    pub status_code: u16,
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn is_broken(&self) -> bool {
        self.status_code == 0 || self.status_code >= 400
    }
}

/// Aggregated analysis of a single fetched page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub url: String,
    pub final_url: String,
    pub title: Option<String>,
    pub html_version: String,
    pub headings: HeadingCounts,
    pub internal_links: usize,
    pub external_links: usize,
    pub has_login_form: bool,
    /// Broken links in link-discovery order.
    pub broken_links: Vec<ProbeOutcome>,
    pub truncated: bool,
}

impl PageAnalysis {
    pub fn broken_count(&self) -> usize {
        self.broken_links.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_counts_record() {
        let mut counts = HeadingCounts::default();
        counts.record(1);
        counts.record(3);
        counts.record(3);
        counts.record(7);

        assert_eq!(counts.h1, 1);
        assert_eq!(counts.h3, 2);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_probe_outcome_broken() {
        let ok = ProbeOutcome {
            url: "https://example.com/".to_string(),
            status_code: 200,
            error: None,
        };
        let missing = ProbeOutcome {
            url: "https://example.com/gone".to_string(),
            status_code: 404,
            error: None,
        };
        let unreachable = ProbeOutcome {
            url: "https://nowhere.invalid/".to_string(),
            status_code: 0,
            error: Some("connection refused".to_string()),
        };

        assert!(!ok.is_broken());
        assert!(missing.is_broken());
        assert!(unreachable.is_broken());
    }
}
