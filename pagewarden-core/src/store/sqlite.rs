use super::{StoreError, StoreResult, UrlRepository};
use crate::model::{BrokenLink, UrlFilter, UrlRecord, UrlStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pagewarden_scanner::HeadingCounts;
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params, params_from_iter};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

const URL_COLUMNS: &str = "id, url, url_hash, title, html_version, \
    h1_count, h2_count, h3_count, h4_count, h5_count, h6_count, \
    internal_links, external_links, broken_links, has_login_form, \
    status, error_message, created_at, updated_at";

/// SQLite-backed store. Calls run on the blocking pool.
#[derive(Clone)]
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn remove(path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)
    }

    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn call<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| StoreError::Other("connection mutex poisoned".to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Other(format!("storage task failed: {}", e)))?
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS urls (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL,
            url_hash TEXT NOT NULL UNIQUE,
            title TEXT,
            html_version TEXT,
            h1_count INTEGER NOT NULL DEFAULT 0,
            h2_count INTEGER NOT NULL DEFAULT 0,
            h3_count INTEGER NOT NULL DEFAULT 0,
            h4_count INTEGER NOT NULL DEFAULT 0,
            h5_count INTEGER NOT NULL DEFAULT 0,
            h6_count INTEGER NOT NULL DEFAULT 0,
            internal_links INTEGER NOT NULL DEFAULT 0,
            external_links INTEGER NOT NULL DEFAULT 0,
            broken_links INTEGER NOT NULL DEFAULT 0,
            has_login_form BOOLEAN NOT NULL DEFAULT 0,
            status TEXT NOT NULL CHECK(status IN ('queued', 'processing', 'completed', 'error')),
            error_message TEXT,
            created_at INTEGER NOT NULL,  -- unix millis
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS broken_links (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url_id INTEGER NOT NULL,
            link_url TEXT NOT NULL,
            status_code INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            FOREIGN KEY(url_id) REFERENCES urls(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_urls_status ON urls(status);
        CREATE INDEX IF NOT EXISTS idx_urls_created_at ON urls(created_at);
        CREATE INDEX IF NOT EXISTS idx_broken_links_url_id ON broken_links(url_id);
        ",
    )
}

fn to_millis(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(idx: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp {} out of range", millis).into(),
        )
    })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<UrlRecord> {
    let status: String = row.get(15)?;
    let status = status
        .parse::<UrlStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(15, Type::Text, e.into()))?;

    Ok(UrlRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        url_hash: row.get(2)?,
        title: row.get(3)?,
        html_version: row.get(4)?,
        headings: HeadingCounts {
            h1: row.get(5)?,
            h2: row.get(6)?,
            h3: row.get(7)?,
            h4: row.get(8)?,
            h5: row.get(9)?,
            h6: row.get(10)?,
        },
        internal_links: row.get(11)?,
        external_links: row.get(12)?,
        broken_links: row.get(13)?,
        has_login_form: row.get(14)?,
        status,
        error_message: row.get(16)?,
        created_at: from_millis(17, row.get(17)?)?,
        updated_at: from_millis(18, row.get(18)?)?,
    })
}

fn row_to_broken_link(row: &Row<'_>) -> rusqlite::Result<BrokenLink> {
    Ok(BrokenLink {
        id: row.get(0)?,
        url_id: row.get(1)?,
        link_url: row.get(2)?,
        status_code: row.get(3)?,
        error_message: row.get(4)?,
    })
}

fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn select_record(conn: &Connection, id: i64) -> StoreResult<UrlRecord> {
    conn.query_row(
        &format!("SELECT {} FROM urls WHERE id = ?1", URL_COLUMNS),
        [id],
        row_to_record,
    )
    .optional()?
    .ok_or(StoreError::NotFound(id))
}

/// Substring LIKE pattern with `%`, `_` and `\` taken literally.
/// Pair with `ESCAPE '\'`.
fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// WHERE clause and its positional arguments for `filter`.
fn where_clause(filter: &UrlFilter) -> (String, Vec<Value>) {
    let mut clause = String::from("WHERE 1=1");
    let mut args: Vec<Value> = Vec::new();

    if let Some(search) = &filter.search {
        clause.push_str(
            " AND (url LIKE ? ESCAPE '\\' OR title LIKE ? ESCAPE '\\' OR html_version LIKE ? ESCAPE '\\')",
        );
        let pattern = like_pattern(search);
        for _ in 0..3 {
            args.push(Value::Text(pattern.clone()));
        }
    }
    if let Some(status) = filter.status {
        clause.push_str(" AND status = ?");
        args.push(Value::Text(status.as_str().to_string()));
    }
    if let Some(title) = &filter.title {
        clause.push_str(" AND title LIKE ? ESCAPE '\\'");
        args.push(Value::Text(like_pattern(title)));
    }
    if let Some(version) = &filter.html_version {
        clause.push_str(" AND html_version LIKE ? ESCAPE '\\'");
        args.push(Value::Text(like_pattern(version)));
    }

    let ranges = [
        ("internal_links", filter.internal_links, filter.min_internal_links, filter.max_internal_links),
        ("external_links", filter.external_links, filter.min_external_links, filter.max_external_links),
        ("broken_links", filter.broken_links, filter.min_broken_links, filter.max_broken_links),
    ];
    for (column, exact, min, max) in ranges {
        for (op, bound) in [("=", exact), (">=", min), ("<=", max)] {
            if let Some(bound) = bound {
                clause.push_str(&format!(" AND {} {} ?", column, op));
                args.push(Value::Integer(bound as i64));
            }
        }
    }

    if let Some(flag) = filter.has_login_form {
        clause.push_str(" AND has_login_form = ?");
        args.push(Value::Integer(flag as i64));
    }

    (clause, args)
}

#[async_trait]
impl UrlRepository for SqliteRepository {
    async fn save(&self, record: UrlRecord) -> StoreResult<UrlRecord> {
        self.call(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO urls (url, url_hash, title, html_version,
                    h1_count, h2_count, h3_count, h4_count, h5_count, h6_count,
                    internal_links, external_links, broken_links, has_login_form,
                    status, error_message, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                params![
                    record.url,
                    record.url_hash,
                    record.title,
                    record.html_version,
                    record.headings.h1,
                    record.headings.h2,
                    record.headings.h3,
                    record.headings.h4,
                    record.headings.h5,
                    record.headings.h6,
                    record.internal_links,
                    record.external_links,
                    record.broken_links,
                    record.has_login_form,
                    record.status.as_str(),
                    record.error_message,
                    to_millis(&record.created_at),
                    to_millis(&record.updated_at),
                ],
            );

            match inserted {
                Ok(_) => {
                    let id = conn.last_insert_rowid();
                    debug!("Saved url {} as id {}", record.url, id);
                    Ok(UrlRecord { id, ..record })
                }
                Err(e) if is_constraint_violation(&e) => Err(StoreError::Conflict(record.url_hash)),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<UrlRecord> {
        self.call(move |conn| select_record(conn, id)).await
    }

    async fn find_by_hash(&self, hash: &str) -> StoreResult<Option<UrlRecord>> {
        let hash = hash.to_string();
        self.call(move |conn| {
            let record = conn
                .query_row(
                    &format!("SELECT {} FROM urls WHERE url_hash = ?1", URL_COLUMNS),
                    [hash],
                    row_to_record,
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    async fn find_all(&self, filter: &UrlFilter) -> StoreResult<(Vec<UrlRecord>, usize)> {
        let filter = filter.clone();
        self.call(move |conn| {
            let (clause, args) = where_clause(&filter);

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM urls {}", clause),
                params_from_iter(args.iter()),
                |row| row.get(0),
            )?;

            let (field, direction) = filter.ordering();
            let sql = format!(
                "SELECT {} FROM urls {} ORDER BY {} {}, id {} LIMIT ? OFFSET ?",
                URL_COLUMNS,
                clause,
                field.as_str(),
                direction.as_str(),
                direction.as_str()
            );

            let mut page_args = args;
            page_args.push(Value::Integer(filter.limit as i64));
            page_args.push(Value::Integer(filter.offset() as i64));

            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map(params_from_iter(page_args.iter()), row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok((records, total as usize))
        })
        .await
    }

    async fn update(&self, record: &UrlRecord) -> StoreResult<UrlRecord> {
        let record = record.clone();
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE urls SET url = ?1, title = ?2, html_version = ?3,
                    h1_count = ?4, h2_count = ?5, h3_count = ?6,
                    h4_count = ?7, h5_count = ?8, h6_count = ?9,
                    internal_links = ?10, external_links = ?11, broken_links = ?12,
                    has_login_form = ?13, status = ?14, error_message = ?15, updated_at = ?16
                 WHERE id = ?17",
                params![
                    record.url,
                    record.title,
                    record.html_version,
                    record.headings.h1,
                    record.headings.h2,
                    record.headings.h3,
                    record.headings.h4,
                    record.headings.h5,
                    record.headings.h6,
                    record.internal_links,
                    record.external_links,
                    record.broken_links,
                    record.has_login_form,
                    record.status.as_str(),
                    record.error_message,
                    to_millis(&Utc::now()),
                    record.id,
                ],
            )?;

            if changed == 0 {
                return Err(StoreError::NotFound(record.id));
            }
            select_record(conn, record.id)
        })
        .await
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        self.call(move |conn| {
            let changed = conn.execute("DELETE FROM urls WHERE id = ?1", [id])?;
            if changed == 0 {
                return Err(StoreError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn delete_batch(&self, ids: &[i64]) -> StoreResult<usize> {
        let ids = ids.to_vec();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            {
                let mut stmt = tx.prepare("DELETE FROM urls WHERE id = ?1")?;
                for id in &ids {
                    removed += stmt.execute([id])?;
                }
            }
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn save_broken_link(&self, link: BrokenLink) -> StoreResult<BrokenLink> {
        self.call(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO broken_links (url_id, link_url, status_code, error_message)
                 VALUES (?1, ?2, ?3, ?4)",
                params![link.url_id, link.link_url, link.status_code, link.error_message],
            );

            match inserted {
                Ok(_) => Ok(BrokenLink {
                    id: conn.last_insert_rowid(),
                    ..link
                }),
                Err(e) if is_constraint_violation(&e) => Err(StoreError::NotFound(link.url_id)),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn find_broken_links_by_url_id(&self, url_id: i64) -> StoreResult<Vec<BrokenLink>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, url_id, link_url, status_code, error_message
                 FROM broken_links WHERE url_id = ?1 ORDER BY id",
            )?;
            let links = stmt
                .query_map([url_id], row_to_broken_link)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(links)
        })
        .await
    }

    async fn delete_broken_links_by_url_id(&self, url_id: i64) -> StoreResult<()> {
        self.call(move |conn| {
            conn.execute("DELETE FROM broken_links WHERE url_id = ?1", [url_id])?;
            Ok(())
        })
        .await
    }
}
