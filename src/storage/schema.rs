//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the catalog database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Brand profiles with current-shape extraction rules
CREATE TABLE IF NOT EXISTS brand_profiles (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    domain_root TEXT NOT NULL,
    auth_required INTEGER NOT NULL DEFAULT 0,
    credential_id TEXT,
    login_url TEXT,
    requires_rendering INTEGER NOT NULL DEFAULT 0,
    rules_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Crawl jobs and their durable counters
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    job_type TEXT NOT NULL,
    profile_id TEXT NOT NULL,
    entry_urls_json TEXT NOT NULL,
    recipe_json TEXT NOT NULL,
    status TEXT NOT NULL,
    total INTEGER NOT NULL DEFAULT 0,
    processed INTEGER NOT NULL DEFAULT 0,
    items_found INTEGER NOT NULL DEFAULT 0,
    total_products INTEGER NOT NULL DEFAULT 0,
    products_processed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    error_text TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
CREATE INDEX IF NOT EXISTS idx_jobs_profile ON jobs(profile_id);

-- In-flight extraction results, one row per job and canonical URL
CREATE TABLE IF NOT EXISTS staged_products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL REFERENCES jobs(id),
    canonical_url TEXT NOT NULL,
    name TEXT,
    code TEXT,
    category_path TEXT,
    record_json TEXT NOT NULL,
    status TEXT NOT NULL,
    error_text TEXT,
    staged_at TEXT NOT NULL,
    UNIQUE(job_id, canonical_url)
);

CREATE INDEX IF NOT EXISTS idx_staged_job ON staged_products(job_id);

-- Permanent catalog, deduplicated per profile
CREATE TABLE IF NOT EXISTS catalog_products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    profile_id TEXT NOT NULL,
    canonical_url TEXT NOT NULL,
    name TEXT,
    code TEXT,
    category_path TEXT,
    record_json TEXT NOT NULL,
    first_seen_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    UNIQUE(profile_id, canonical_url)
);

CREATE INDEX IF NOT EXISTS idx_catalog_profile ON catalog_products(profile_id);
CREATE INDEX IF NOT EXISTS idx_catalog_code ON catalog_products(profile_id, code);

-- Code lookups that found no product page
CREATE TABLE IF NOT EXISTS missing_products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    profile_id TEXT NOT NULL,
    searched_code TEXT NOT NULL,
    occurrence_count INTEGER NOT NULL DEFAULT 1,
    last_seen_at TEXT NOT NULL,
    UNIQUE(profile_id, searched_code)
);

-- Files linked from committed products, and their local downloads
CREATE TABLE IF NOT EXISTS assets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    profile_id TEXT NOT NULL,
    original_url TEXT NOT NULL,
    product_url TEXT NOT NULL,
    product_code TEXT,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    local_path TEXT,
    file_hash TEXT,
    http_status INTEGER,
    error_text TEXT,
    job_id TEXT,
    last_checked_at TEXT,
    first_seen_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    UNIQUE(profile_id, original_url)
);

CREATE INDEX IF NOT EXISTS idx_assets_profile ON assets(profile_id, kind);

-- Saved taxonomy trees
CREATE TABLE IF NOT EXISTS taxonomy_nodes (
    profile_id TEXT NOT NULL,
    id TEXT NOT NULL,
    parent_id TEXT,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    url TEXT,
    kind TEXT NOT NULL,
    product_count INTEGER,
    product_urls_json TEXT NOT NULL,
    PRIMARY KEY (profile_id, id)
);

CREATE INDEX IF NOT EXISTS idx_taxonomy_parent ON taxonomy_nodes(profile_id, parent_id);
"#;

/// Columns added after a table was first released: (table, column, definition)
const ADDED_COLUMNS: &[(&str, &str, &str)] = &[(
    "brand_profiles",
    "requires_rendering",
    "INTEGER NOT NULL DEFAULT 0",
)];

/// Initializes the database schema
///
/// Creates all tables and indexes if they don't exist, then adds any
/// columns missing from databases created by earlier versions.
pub fn initialize_schema(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    for (table, column, definition) in ADDED_COLUMNS {
        if !has_column(conn, table, column)? {
            conn.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {} {};",
                table, column, definition
            ))?;
        }
    }
    Ok(())
}

fn has_column(conn: &rusqlite::Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}
