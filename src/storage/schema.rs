//! Database schema definitions
//!
//! This module contains the SQL schema for the page store and the recrawl
//! schedule.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Indexed pages, keyed by the SHA-256 of their URL
CREATE TABLE IF NOT EXISTS pages (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL UNIQUE,
    domain TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    title TEXT,
    description TEXT,
    keywords TEXT,
    author TEXT,
    language TEXT,
    open_graph TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL,
    raw_html TEXT NOT NULL,
    links TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_pages_domain ON pages(domain);

-- Recrawl schedule, keyed by site origin (scheme, host, port)
CREATE TABLE IF NOT EXISTS domains (
    domain TEXT PRIMARY KEY,
    last_crawled_at TEXT,
    next_crawl_at TEXT NOT NULL,
    recrawl_interval_secs INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_domains_next_crawl ON domains(next_crawl_at);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
