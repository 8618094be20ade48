//! SQLite storage implementation
//!
//! One connection behind a mutex serves both the page store and the recrawl
//! schedule. Statements are short, so they run inline on the calling task.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{IndexSink, IndexedPage, RecrawlSource, StoreError, StoreResult};
use crate::url::{domain_key, origin_of};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// A page as stored in the `pages` table
#[derive(Debug, Clone)]
pub struct StoredPage {
    pub id: String,
    pub url: String,
    pub domain: String,
    pub fetched_at: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: String,
    pub links: Vec<String>,
}

/// SQLite-backed page store and recrawl schedule
pub struct SqliteStore {
    conn: Mutex<Connection>,
    default_interval: Duration,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `default_interval` - Recrawl interval given to newly seen domains
    pub fn open(path: &Path, default_interval: Duration) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            default_interval,
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory(default_interval: Duration) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            default_interval,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a domain to the recrawl schedule, or updates its schedule
    ///
    /// # Arguments
    ///
    /// * `domain` - Site origin (`https://example.com`); a bare domain key
    ///   is recrawled over HTTPS
    /// * `interval` - Time between crawls of the domain
    /// * `next_crawl_at` - When the domain is first due
    pub fn register_domain(
        &self,
        domain: &str,
        interval: Duration,
        next_crawl_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.conn().execute(
            "INSERT INTO domains (domain, next_crawl_at, recrawl_interval_secs)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(domain) DO UPDATE SET
                next_crawl_at = excluded.next_crawl_at,
                recrawl_interval_secs = excluded.recrawl_interval_secs",
            params![domain, timestamp(next_crawl_at), interval.as_secs() as i64],
        )?;
        Ok(())
    }

    /// Number of indexed pages
    pub fn count_pages(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Looks up an indexed page by URL
    pub fn get_page(&self, url: &str) -> StoreResult<Option<StoredPage>> {
        let page = self
            .conn()
            .query_row(
                "SELECT id, url, domain, fetched_at, title, description, content, links
                 FROM pages WHERE id = ?1",
                params![page_id(url)],
                |row| {
                    let links: String = row.get(7)?;
                    Ok(StoredPage {
                        id: row.get(0)?,
                        url: row.get(1)?,
                        domain: row.get(2)?,
                        fetched_at: row.get(3)?,
                        title: row.get(4)?,
                        description: row.get(5)?,
                        content: row.get(6)?,
                        links: links.lines().map(|l| l.to_string()).collect(),
                    })
                },
            )
            .optional()?;
        Ok(page)
    }

    /// Returns the next crawl time recorded for a domain
    pub fn next_crawl_at(&self, domain: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let value: Option<String> = self
            .conn()
            .query_row(
                "SELECT next_crawl_at FROM domains WHERE domain = ?1",
                params![domain],
                |row| row.get(0),
            )
            .optional()?;

        value.map(|v| parse_timestamp(&v)).transpose()
    }
}

#[async_trait]
impl IndexSink for SqliteStore {
    async fn index_page(&self, page: IndexedPage) -> StoreResult<()> {
        let url = page.url.as_str();
        let domain = domain_key(&page.url).unwrap_or_default();
        let origin = origin_of(&page.url).unwrap_or_default();
        let links = page
            .extracted_links
            .iter()
            .map(|link| link.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let open_graph = page
            .metadata
            .open_graph
            .iter()
            .map(|(property, content)| format!("{}\t{}", property, content))
            .collect::<Vec<_>>()
            .join("\n");
        let next_crawl = page.fetched_at
            + chrono::Duration::seconds(self.default_interval.as_secs() as i64);

        let conn = self.conn();
        conn.execute(
            "INSERT INTO pages (id, url, domain, fetched_at, title, description, keywords,
                                author, language, open_graph, content, raw_html, links)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                fetched_at = excluded.fetched_at,
                title = excluded.title,
                description = excluded.description,
                keywords = excluded.keywords,
                author = excluded.author,
                language = excluded.language,
                open_graph = excluded.open_graph,
                content = excluded.content,
                raw_html = excluded.raw_html,
                links = excluded.links",
            params![
                page_id(url),
                url,
                domain,
                timestamp(page.fetched_at),
                page.metadata.title,
                page.metadata.description,
                page.metadata.keywords,
                page.metadata.author,
                page.metadata.language,
                open_graph,
                page.metadata.text,
                page.raw_content,
                links,
            ],
        )?;

        // First page of a site puts its origin on the recrawl schedule
        conn.execute(
            "INSERT OR IGNORE INTO domains (domain, next_crawl_at, recrawl_interval_secs)
             VALUES (?1, ?2, ?3)",
            params![
                origin,
                timestamp(next_crawl),
                self.default_interval.as_secs() as i64
            ],
        )?;

        debug!("Stored page {}", url);
        Ok(())
    }
}

#[async_trait]
impl RecrawlSource for SqliteStore {
    async fn domains_due_for_recrawl(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT domain FROM domains WHERE next_crawl_at <= ?1 ORDER BY next_crawl_at",
        )?;

        let domains = stmt
            .query_map(params![timestamp(Utc::now())], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(domains)
    }

    async fn record_crawl_completed(&self, domain: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let conn = self.conn();

        let interval_secs: i64 = conn
            .query_row(
                "SELECT recrawl_interval_secs FROM domains WHERE domain = ?1",
                params![domain],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(self.default_interval.as_secs() as i64);

        let next = at + chrono::Duration::seconds(interval_secs);

        conn.execute(
            "INSERT INTO domains (domain, last_crawled_at, next_crawl_at, recrawl_interval_secs)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(domain) DO UPDATE SET
                last_crawled_at = excluded.last_crawled_at,
                next_crawl_at = excluded.next_crawl_at",
            params![domain, timestamp(at), timestamp(next), interval_secs],
        )?;

        Ok(())
    }
}

/// Page ids are the hex SHA-256 of the URL
fn page_id(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fixed-width UTC timestamps, so text comparison orders them
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("{}: {}", value, e)))
}
