//! Persistence gateway for URL records and their broken links.

mod memory;
mod sqlite;

pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;

use crate::model::{BrokenLink, UrlFilter, UrlRecord};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(i64),

    #[error("duplicate url fingerprint: {0}")]
    Conflict(String),

    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("storage error: {0}")]
    Other(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait UrlRepository: Send + Sync {
    /// Insert a new record, assigning its id. A fingerprint collision is `Conflict`.
    async fn save(&self, record: UrlRecord) -> StoreResult<UrlRecord>;

    async fn find_by_id(&self, id: i64) -> StoreResult<UrlRecord>;

    async fn find_by_hash(&self, hash: &str) -> StoreResult<Option<UrlRecord>>;

    /// One page of matching records plus the total match count.
    async fn find_all(&self, filter: &UrlFilter) -> StoreResult<(Vec<UrlRecord>, usize)>;

    /// Overwrite every mutable field of an existing record; bumps `updated_at`.
    async fn update(&self, record: &UrlRecord) -> StoreResult<UrlRecord>;

    /// Deletes the record and its broken links.
    async fn delete(&self, id: i64) -> StoreResult<()>;

    /// Returns how many records were removed. Unknown ids are skipped.
    async fn delete_batch(&self, ids: &[i64]) -> StoreResult<usize>;

    async fn save_broken_link(&self, link: BrokenLink) -> StoreResult<BrokenLink>;

    async fn find_broken_links_by_url_id(&self, url_id: i64) -> StoreResult<Vec<BrokenLink>>;

    async fn delete_broken_links_by_url_id(&self, url_id: i64) -> StoreResult<()>;
}

/// Run a storage call with an upper bound on its duration.
pub async fn bounded<T, F>(timeout: Duration, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, StoreError>(())
        };
        let result = bounded(Duration::from_secs(1), slow).await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let result = bounded(Duration::from_secs(1), async { Ok::<_, StoreError>(5) }).await;
        assert_eq!(result.unwrap(), 5);

        let result: StoreResult<()> =
            bounded(Duration::from_secs(1), async { Err(StoreError::NotFound(9)) }).await;
        assert!(matches!(result, Err(StoreError::NotFound(9))));
    }
}
