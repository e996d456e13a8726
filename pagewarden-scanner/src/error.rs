use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Redirect limit exceeded after {0} redirects")]
    RedirectLimitExceeded(usize),

    #[error("HTTP error: {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Other error: {0}")]
    Other(String),
}

impl ScanError {
    /// True for failures of the page fetch itself (network, status, limits).
    pub fn is_fetch_failure(&self) -> bool {
        !matches!(self, ScanError::Cancelled | ScanError::InvalidUrl(_))
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
