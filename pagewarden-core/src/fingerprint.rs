//! URL normalization and fingerprinting.
//!
//! Two submissions that normalize to the same string share a fingerprint
//! and therefore a single record.

use sha2::{Digest, Sha256};
use url::Url;

/// Parse and canonicalize `raw`: surrounding whitespace trimmed, fragment dropped.
///
/// Scheme and host validation is left to the caller.
pub fn normalize_url(raw: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(raw.trim())?;
    url.set_fragment(None);
    Ok(url)
}

/// Lowercase hex SHA-256 of the canonical URL string.
pub fn fingerprint(canonical: &str) -> String {
    hex::encode(Sha256::digest(canonical.as_bytes()))
}
