use super::{StoreError, StoreResult, UrlRepository};
use crate::model::{BrokenLink, SortDirection, UrlFilter, UrlRecord};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    urls: BTreeMap<i64, UrlRecord>,
    hashes: HashMap<String, i64>,
    broken_links: BTreeMap<i64, BrokenLink>,
    next_url_id: i64,
    next_link_id: i64,
}

/// In-process store for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UrlRepository for MemoryRepository {
    async fn save(&self, mut record: UrlRecord) -> StoreResult<UrlRecord> {
        let mut tables = self.tables.write().await;
        if tables.hashes.contains_key(&record.url_hash) {
            return Err(StoreError::Conflict(record.url_hash));
        }

        tables.next_url_id += 1;
        record.id = tables.next_url_id;
        tables.hashes.insert(record.url_hash.clone(), record.id);
        tables.urls.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<UrlRecord> {
        self.tables
            .read()
            .await
            .urls
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn find_by_hash(&self, hash: &str) -> StoreResult<Option<UrlRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .hashes
            .get(hash)
            .and_then(|id| tables.urls.get(id))
            .cloned())
    }

    async fn find_all(&self, filter: &UrlFilter) -> StoreResult<(Vec<UrlRecord>, usize)> {
        let tables = self.tables.read().await;
        let mut matched: Vec<&UrlRecord> =
            tables.urls.values().filter(|r| filter.matches(r)).collect();
        let total = matched.len();

        let (field, direction) = filter.ordering();
        matched.sort_by(|a, b| {
            let ordering = field.compare(a, b).then(a.id.cmp(&b.id));
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        let records = matched
            .into_iter()
            .skip(filter.offset())
            .take(filter.limit as usize)
            .cloned()
            .collect();
        Ok((records, total))
    }

    async fn update(&self, record: &UrlRecord) -> StoreResult<UrlRecord> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .urls
            .get_mut(&record.id)
            .ok_or(StoreError::NotFound(record.id))?;

        let created_at = stored.created_at;
        *stored = record.clone();
        stored.created_at = created_at;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let record = tables.urls.remove(&id).ok_or(StoreError::NotFound(id))?;
        tables.hashes.remove(&record.url_hash);
        tables.broken_links.retain(|_, link| link.url_id != id);
        Ok(())
    }

    async fn delete_batch(&self, ids: &[i64]) -> StoreResult<usize> {
        let mut tables = self.tables.write().await;
        let mut removed = 0;
        for id in ids {
            if let Some(record) = tables.urls.remove(id) {
                tables.hashes.remove(&record.url_hash);
                tables.broken_links.retain(|_, link| link.url_id != *id);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn save_broken_link(&self, mut link: BrokenLink) -> StoreResult<BrokenLink> {
        let mut tables = self.tables.write().await;
        if !tables.urls.contains_key(&link.url_id) {
            return Err(StoreError::NotFound(link.url_id));
        }

        tables.next_link_id += 1;
        link.id = tables.next_link_id;
        tables.broken_links.insert(link.id, link.clone());
        Ok(link)
    }

    async fn find_broken_links_by_url_id(&self, url_id: i64) -> StoreResult<Vec<BrokenLink>> {
        Ok(self
            .tables
            .read()
            .await
            .broken_links
            .values()
            .filter(|link| link.url_id == url_id)
            .cloned()
            .collect())
    }

    async fn delete_broken_links_by_url_id(&self, url_id: i64) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .broken_links
            .retain(|_, link| link.url_id != url_id);
        Ok(())
    }
}
