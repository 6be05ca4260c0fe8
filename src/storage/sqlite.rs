//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.

use crate::extract::{FileKind, ProductRecord, FALLBACK_FILE_NAME};
use crate::jobs::{JobStatus, JobType};
use crate::profile::{BrandProfile, ExtractionRules};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    AssetStore, CatalogStore, JobStore, ProfileStore, StagingStore, StorageError, StorageResult,
    TaxonomyStore,
};
use crate::storage::{
    build_category_tree, AssetRecord, CatalogPage, CatalogProduct, CategoryNode, ExtractionStatus,
    JobCounters, JobRecord, MissingProductRef, StagedProduct,
};
use crate::taxonomy::{NodeKind, TaxonomyNode};
use crate::CatalogError;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;

const JOB_COLUMNS: &str = "id, job_type, profile_id, entry_urls_json, recipe_json, status, total, \
     processed, items_found, total_products, products_processed, created_at, updated_at, error_text";

const STAGED_COLUMNS: &str =
    "job_id, canonical_url, record_json, status, error_text, staged_at";

const CATALOG_COLUMNS: &str =
    "profile_id, canonical_url, record_json, first_seen_at, last_seen_at";

const PROFILE_COLUMNS: &str =
    "id, name, domain_root, auth_required, credential_id, login_url, requires_rendering, rules_json";

const ASSET_COLUMNS: &str = "profile_id, original_url, product_url, product_code, kind, name, \
     local_path, file_hash, http_status, error_text, job_id, last_checked_at, first_seen_at, last_seen_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> Result<Self, CatalogError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(StorageError::Corrupt(message)))
}

fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn job_from_row(row: &Row) -> rusqlite::Result<JobRecord> {
    let job_type: String = row.get(1)?;
    let recipe: String = row.get(4)?;
    let status: String = row.get(5)?;

    Ok(JobRecord {
        id: row.get(0)?,
        job_type: JobType::from_db_string(&job_type)
            .ok_or_else(|| conversion_error(1, format!("unknown job type {}", job_type)))?,
        profile_id: row.get(2)?,
        entry_urls: json_column(row, 3)?,
        rules: ExtractionRules::from_json(&recipe)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
        status: JobStatus::from_db_string(&status)
            .ok_or_else(|| conversion_error(5, format!("unknown job status {}", status)))?,
        counters: JobCounters {
            total: row.get(6)?,
            processed: row.get(7)?,
            items_found: row.get(8)?,
            total_products: row.get(9)?,
            products_processed: row.get(10)?,
        },
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        error_text: row.get(13)?,
    })
}

fn staged_from_row(row: &Row) -> rusqlite::Result<StagedProduct> {
    let status: String = row.get(3)?;
    Ok(StagedProduct {
        job_id: row.get(0)?,
        canonical_url: row.get(1)?,
        record: json_column(row, 2)?,
        status: ExtractionStatus::from_db_string(&status)
            .ok_or_else(|| conversion_error(3, format!("unknown extraction status {}", status)))?,
        error_text: row.get(4)?,
        staged_at: row.get(5)?,
    })
}

fn catalog_from_row(row: &Row) -> rusqlite::Result<CatalogProduct> {
    Ok(CatalogProduct {
        profile_id: row.get(0)?,
        canonical_url: row.get(1)?,
        record: json_column(row, 2)?,
        first_seen_at: row.get(3)?,
        last_seen_at: row.get(4)?,
    })
}

fn profile_from_row(row: &Row) -> rusqlite::Result<BrandProfile> {
    let rules: String = row.get(7)?;
    Ok(BrandProfile {
        id: row.get(0)?,
        name: row.get(1)?,
        domain_root: row.get(2)?,
        auth_required: row.get(3)?,
        credential_id: row.get(4)?,
        login_url: row.get(5)?,
        requires_rendering: row.get(6)?,
        rules: ExtractionRules::from_json(&rules)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?,
    })
}

fn asset_from_row(row: &Row) -> rusqlite::Result<AssetRecord> {
    let kind: String = row.get(4)?;
    Ok(AssetRecord {
        profile_id: row.get(0)?,
        original_url: row.get(1)?,
        product_url: row.get(2)?,
        product_code: row.get(3)?,
        kind: FileKind::from_db_string(&kind)
            .ok_or_else(|| conversion_error(4, format!("unknown asset kind {}", kind)))?,
        name: row.get(5)?,
        local_path: row.get(6)?,
        file_hash: row.get(7)?,
        http_status: row.get(8)?,
        error_text: row.get(9)?,
        job_id: row.get(10)?,
        last_checked_at: row.get(11)?,
        first_seen_at: row.get(12)?,
        last_seen_at: row.get(13)?,
    })
}

/// Registers the files linked from a job's `ok` rows
///
/// A known file keeps its download state; a real link label replaces the
/// fallback name.
fn register_job_assets(tx: &Transaction, job_id: &str, profile_id: &str, now: &str) -> StorageResult<usize> {
    let mut select = tx.prepare(
        "SELECT canonical_url, record_json FROM staged_products WHERE job_id = ?1 AND status = ?2",
    )?;
    let rows = select
        .query_map(params![job_id, ExtractionStatus::Ok.to_db_string()], |row| {
            Ok((row.get::<_, String>(0)?, json_column::<ProductRecord>(row, 1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut upsert = tx.prepare(
        "INSERT INTO assets
            (profile_id, original_url, product_url, product_code, kind, name, job_id, first_seen_at, last_seen_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
         ON CONFLICT(profile_id, original_url) DO UPDATE SET
            product_url = excluded.product_url,
            product_code = COALESCE(excluded.product_code, product_code),
            kind = excluded.kind,
            name = CASE WHEN excluded.name = ?9 THEN name ELSE excluded.name END,
            job_id = excluded.job_id,
            last_seen_at = excluded.last_seen_at",
    )?;

    let mut registered = 0;
    for (product_url, record) in &rows {
        for file in &record.files {
            registered += upsert.execute(params![
                profile_id,
                file.url,
                product_url,
                record.code,
                file.kind.to_db_string(),
                file.name,
                job_id,
                now,
                FALLBACK_FILE_NAME,
            ])?;
        }
    }
    Ok(registered)
}

/// Reads a job's status inside a transaction
fn job_status(tx: &Transaction, job_id: &str) -> StorageResult<JobStatus> {
    let status: Option<String> = tx
        .query_row("SELECT status FROM jobs WHERE id = ?1", params![job_id], |row| row.get(0))
        .optional()?;
    let status = status.ok_or_else(|| StorageError::JobNotFound(job_id.to_string()))?;
    JobStatus::from_db_string(&status)
        .ok_or_else(|| StorageError::Corrupt(format!("job {} has status {}", job_id, status)))
}

/// Checks and writes a transition inside a transaction
fn write_transition(
    tx: &Transaction,
    job_id: &str,
    next: JobStatus,
    error_text: Option<&str>,
) -> StorageResult<JobStatus> {
    let current = job_status(tx, job_id)?;
    if !current.can_transition_to(next) {
        return Err(StorageError::InvalidTransition { from: current, to: next });
    }
    tx.execute(
        "UPDATE jobs SET status = ?1, updated_at = ?2, error_text = COALESCE(?3, error_text)
         WHERE id = ?4",
        params![next.to_db_string(), now(), error_text, job_id],
    )?;
    Ok(current)
}

fn upsert_staged_row(conn: &Connection, product: &StagedProduct) -> StorageResult<()> {
    let record = &product.record;
    conn.execute(
        "INSERT INTO staged_products
            (job_id, canonical_url, name, code, category_path, record_json, status, error_text, staged_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(job_id, canonical_url) DO UPDATE SET
            name = excluded.name,
            code = excluded.code,
            category_path = excluded.category_path,
            record_json = excluded.record_json,
            status = excluded.status,
            error_text = excluded.error_text,
            staged_at = excluded.staged_at",
        params![
            product.job_id,
            product.canonical_url,
            record.name,
            record.code,
            record.category_path,
            serde_json::to_string(record)?,
            product.status.to_db_string(),
            product.error_text,
            now(),
        ],
    )?;
    Ok(())
}

fn write_counters(conn: &Connection, job_id: &str, counters: &JobCounters) -> StorageResult<()> {
    let changed = conn.execute(
        "UPDATE jobs SET total = ?1, processed = ?2, items_found = ?3, total_products = ?4,
         products_processed = ?5, updated_at = ?6 WHERE id = ?7",
        params![
            counters.total,
            counters.processed,
            counters.items_found,
            counters.total_products,
            counters.products_processed,
            now(),
            job_id
        ],
    )?;
    if changed == 0 {
        return Err(StorageError::JobNotFound(job_id.to_string()));
    }
    Ok(())
}

fn append_urls(conn: &Connection, job_id: &str, urls: &[String]) -> StorageResult<()> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT entry_urls_json FROM jobs WHERE id = ?1",
            params![job_id],
            |row| row.get(0),
        )
        .optional()?;
    let raw = raw.ok_or_else(|| StorageError::JobNotFound(job_id.to_string()))?;

    let mut entry_urls: Vec<String> = serde_json::from_str(&raw)?;
    entry_urls.extend(urls.iter().cloned());

    conn.execute(
        "UPDATE jobs SET entry_urls_json = ?1, updated_at = ?2 WHERE id = ?3",
        params![serde_json::to_string(&entry_urls)?, now(), job_id],
    )?;
    Ok(())
}

fn like_pattern(query: &str) -> String {
    let escaped = query
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

impl JobStore for SqliteStorage {
    // ===== Job Management =====

    fn create_job(&mut self, job: &JobRecord) -> StorageResult<()> {
        let now = now();
        self.conn.execute(
            &format!(
                "INSERT INTO jobs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                JOB_COLUMNS
            ),
            params![
                job.id,
                job.job_type.to_db_string(),
                job.profile_id,
                serde_json::to_string(&job.entry_urls)?,
                job.rules.to_json()?,
                JobStatus::Pending.to_db_string(),
                job.counters.total,
                job.counters.processed,
                job.counters.items_found,
                job.counters.total_products,
                job.counters.products_processed,
                now,
                now,
                job.error_text,
            ],
        )?;
        Ok(())
    }

    fn get_job(&self, job_id: &str) -> StorageResult<JobRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                params![job_id],
                job_from_row,
            )
            .optional()?
            .ok_or_else(|| StorageError::JobNotFound(job_id.to_string()))
    }

    fn list_jobs_by_status(&self, statuses: &[JobStatus]) -> StorageResult<Vec<JobRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM jobs ORDER BY created_at, rowid",
            JOB_COLUMNS
        ))?;

        let jobs = stmt
            .query_map([], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(jobs
            .into_iter()
            .filter(|job| statuses.contains(&job.status))
            .collect())
    }

    fn transition_job(
        &mut self,
        job_id: &str,
        next: JobStatus,
        error_text: Option<&str>,
    ) -> StorageResult<JobStatus> {
        let tx = self.conn.transaction()?;
        let previous = write_transition(&tx, job_id, next, error_text)?;
        tx.commit()?;
        Ok(previous)
    }

    fn update_counters(&mut self, job_id: &str, counters: &JobCounters) -> StorageResult<()> {
        write_counters(&self.conn, job_id, counters)
    }

    fn append_entry_urls(&mut self, job_id: &str, urls: &[String]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        append_urls(&tx, job_id, urls)?;
        tx.commit()?;
        Ok(())
    }

    fn fail_interrupted_jobs(&mut self, error_text: &str) -> StorageResult<Vec<String>> {
        let tx = self.conn.transaction()?;
        let ids = {
            let mut stmt = tx.prepare("SELECT id FROM jobs WHERE status IN (?1, ?2) ORDER BY created_at")?;
            let ids = stmt
                .query_map(
                    params![JobStatus::Running.to_db_string(), JobStatus::Paused.to_db_string()],
                    |row| row.get::<_, String>(0),
                )?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };

        for id in &ids {
            write_transition(&tx, id, JobStatus::Failed, Some(error_text))?;
        }
        tx.commit()?;
        Ok(ids)
    }
}

impl StagingStore for SqliteStorage {
    // ===== Staging =====

    fn upsert_staged(&mut self, product: &StagedProduct) -> StorageResult<()> {
        upsert_staged_row(&self.conn, product)
    }

    fn stage_processed(
        &mut self,
        product: &StagedProduct,
        counters: &JobCounters,
        discovered_urls: &[String],
    ) -> StorageResult<bool> {
        let tx = self.conn.transaction()?;
        let status = job_status(&tx, &product.job_id)?;
        if !matches!(status, JobStatus::Running | JobStatus::Paused) {
            return Ok(false);
        }

        upsert_staged_row(&tx, product)?;
        write_counters(&tx, &product.job_id, counters)?;
        if !discovered_urls.is_empty() {
            append_urls(&tx, &product.job_id, discovered_urls)?;
        }
        tx.commit()?;
        Ok(true)
    }

    fn list_staged(&self, job_id: &str) -> StorageResult<Vec<StagedProduct>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM staged_products WHERE job_id = ?1 ORDER BY id",
            STAGED_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![job_id], staged_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn delete_staged(&mut self, job_id: &str) -> StorageResult<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM staged_products WHERE job_id = ?1", params![job_id])?;
        Ok(deleted)
    }

    fn stop_job(&mut self, job_id: &str, purge: bool) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        write_transition(&tx, job_id, JobStatus::Stopped, None)?;
        let purged = if purge {
            tx.execute("DELETE FROM staged_products WHERE job_id = ?1", params![job_id])?
        } else {
            0
        };
        tx.commit()?;
        Ok(purged)
    }

    fn promote(&mut self, job_id: &str) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;

        let current = job_status(&tx, job_id)?;
        if current != JobStatus::WaitingCommit {
            return Err(StorageError::InvalidTransition {
                from: current,
                to: JobStatus::Completed,
            });
        }
        let profile_id: String = tx.query_row(
            "SELECT profile_id FROM jobs WHERE id = ?1",
            params![job_id],
            |row| row.get(0),
        )?;

        let now = now();
        let applied = tx.execute(
            "INSERT INTO catalog_products
                (profile_id, canonical_url, name, code, category_path, record_json, first_seen_at, last_seen_at)
             SELECT ?1, canonical_url, name, code, category_path, record_json, ?2, ?2
             FROM staged_products WHERE job_id = ?3 AND status = ?4
             ON CONFLICT(profile_id, canonical_url) DO UPDATE SET
                name = excluded.name,
                code = excluded.code,
                category_path = excluded.category_path,
                record_json = excluded.record_json,
                last_seen_at = excluded.last_seen_at",
            params![profile_id, now, job_id, ExtractionStatus::Ok.to_db_string()],
        )?;
        let assets = register_job_assets(&tx, job_id, &profile_id, &now)?;
        tracing::debug!(job_id, applied, assets, "promoting staged rows");

        write_transition(&tx, job_id, JobStatus::Completed, None)?;
        tx.commit()?;
        Ok(applied)
    }
}

impl CatalogStore for SqliteStorage {
    // ===== Catalog =====

    fn get_product(&self, profile_id: &str, canonical_url: &str) -> StorageResult<Option<CatalogProduct>> {
        let product = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM catalog_products WHERE profile_id = ?1 AND canonical_url = ?2",
                    CATALOG_COLUMNS
                ),
                params![profile_id, canonical_url],
                catalog_from_row,
            )
            .optional()?;
        Ok(product)
    }

    fn search_catalog(
        &self,
        profile_id: &str,
        query: &str,
        page: u32,
        page_size: u32,
    ) -> StorageResult<CatalogPage> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 500);
        let pattern = like_pattern(query);
        let filter = "profile_id = ?1 AND (name LIKE ?2 ESCAPE '\\' OR code LIKE ?2 ESCAPE '\\'
                      OR canonical_url LIKE ?2 ESCAPE '\\')";

        let total: u32 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM catalog_products WHERE {}", filter),
            params![profile_id, pattern],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM catalog_products WHERE {} ORDER BY name, canonical_url LIMIT ?3 OFFSET ?4",
            CATALOG_COLUMNS, filter
        ))?;
        let offset = (page - 1).saturating_mul(page_size);
        let items = stmt
            .query_map(params![profile_id, pattern, page_size, offset], catalog_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CatalogPage {
            items,
            total,
            page,
            page_size,
        })
    }

    fn category_tree(&self, profile_id: &str) -> StorageResult<Vec<CategoryNode>> {
        let mut stmt = self.conn.prepare(
            "SELECT category_path, COUNT(*) FROM catalog_products
             WHERE profile_id = ?1 AND category_path IS NOT NULL AND category_path != ''
             GROUP BY category_path ORDER BY category_path",
        )?;
        let paths = stmt
            .query_map(params![profile_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(build_category_tree(&paths))
    }

    fn count_products(&self, profile_id: &str) -> StorageResult<u32> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM catalog_products WHERE profile_id = ?1",
            params![profile_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn delete_product(&mut self, profile_id: &str, canonical_url: &str) -> StorageResult<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM catalog_products WHERE profile_id = ?1 AND canonical_url = ?2",
            params![profile_id, canonical_url],
        )?;
        Ok(deleted > 0)
    }

    fn clear_profile_products(&mut self, profile_id: &str) -> StorageResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM catalog_products WHERE profile_id = ?1",
            params![profile_id],
        )?;
        Ok(deleted)
    }

    // ===== Missing Products =====

    fn record_missing(&mut self, profile_id: &str, code: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO missing_products (profile_id, searched_code, occurrence_count, last_seen_at)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(profile_id, searched_code) DO UPDATE SET
                occurrence_count = occurrence_count + 1,
                last_seen_at = excluded.last_seen_at",
            params![profile_id, code.trim(), now()],
        )?;
        Ok(())
    }

    fn list_missing(&self, profile_id: &str) -> StorageResult<Vec<MissingProductRef>> {
        let mut stmt = self.conn.prepare(
            "SELECT profile_id, searched_code, occurrence_count, last_seen_at
             FROM missing_products WHERE profile_id = ?1
             ORDER BY occurrence_count DESC, searched_code",
        )?;
        let rows = stmt
            .query_map(params![profile_id], |row| {
                Ok(MissingProductRef {
                    profile_id: row.get(0)?,
                    searched_code: row.get(1)?,
                    occurrence_count: row.get(2)?,
                    last_seen_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl AssetStore for SqliteStorage {
    // ===== Assets =====

    fn list_assets(&self, profile_id: &str, kinds: &[FileKind]) -> StorageResult<Vec<AssetRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM assets WHERE profile_id = ?1 ORDER BY id",
            ASSET_COLUMNS
        ))?;
        let assets = stmt
            .query_map(params![profile_id], asset_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(assets
            .into_iter()
            .filter(|a| kinds.is_empty() || kinds.contains(&a.kind))
            .collect())
    }

    fn mark_asset_downloaded(
        &mut self,
        profile_id: &str,
        original_url: &str,
        local_path: &str,
        file_hash: &str,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE assets SET local_path = ?1, file_hash = ?2, http_status = 200, error_text = NULL,
                last_checked_at = ?3
             WHERE profile_id = ?4 AND original_url = ?5",
            params![local_path, file_hash, now(), profile_id, original_url],
        )?;
        Ok(())
    }

    fn mark_asset_failed(
        &mut self,
        profile_id: &str,
        original_url: &str,
        http_status: Option<u16>,
        error: &str,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE assets SET http_status = ?1, error_text = ?2, last_checked_at = ?3
             WHERE profile_id = ?4 AND original_url = ?5",
            params![http_status, error, now(), profile_id, original_url],
        )?;
        Ok(())
    }

    fn touch_asset(&mut self, profile_id: &str, original_url: &str) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE assets SET last_checked_at = ?1 WHERE profile_id = ?2 AND original_url = ?3",
            params![now(), profile_id, original_url],
        )?;
        Ok(())
    }
}

impl TaxonomyStore for SqliteStorage {
    fn save_tree(&mut self, profile_id: &str, root: &TaxonomyNode) -> StorageResult<()> {
        fn insert(
            tx: &Transaction,
            profile_id: &str,
            node: &TaxonomyNode,
            parent_id: Option<&str>,
            position: usize,
        ) -> StorageResult<()> {
            tx.execute(
                "INSERT OR REPLACE INTO taxonomy_nodes
                    (profile_id, id, parent_id, position, name, url, kind, product_count, product_urls_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    profile_id,
                    node.id,
                    parent_id,
                    position as i64,
                    node.name,
                    node.url,
                    node.kind.to_db_string(),
                    node.product_count,
                    serde_json::to_string(&node.product_urls)?,
                ],
            )?;
            for (idx, child) in node.children.iter().enumerate() {
                insert(tx, profile_id, child, Some(&node.id), idx)?;
            }
            Ok(())
        }

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM taxonomy_nodes WHERE profile_id = ?1", params![profile_id])?;
        insert(&tx, profile_id, root, None, 0)?;
        tx.commit()?;
        Ok(())
    }

    fn load_tree(&self, profile_id: &str) -> StorageResult<Option<TaxonomyNode>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, parent_id, name, url, kind, product_count, product_urls_json
             FROM taxonomy_nodes WHERE profile_id = ?1 ORDER BY position",
        )?;
        let nodes = stmt
            .query_map(params![profile_id], |row| {
                let kind: String = row.get(4)?;
                Ok(TaxonomyNode {
                    id: row.get(0)?,
                    parent_id: row.get(1)?,
                    name: row.get(2)?,
                    url: row.get(3)?,
                    kind: NodeKind::from_db_string(&kind)
                        .ok_or_else(|| conversion_error(4, format!("unknown node kind {}", kind)))?,
                    product_count: row.get(5)?,
                    children: Vec::new(),
                    product_urls: json_column(row, 6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut by_parent: HashMap<Option<String>, Vec<TaxonomyNode>> = HashMap::new();
        for node in nodes {
            by_parent.entry(node.parent_id.clone()).or_default().push(node);
        }

        fn assemble(node: &mut TaxonomyNode, by_parent: &mut HashMap<Option<String>, Vec<TaxonomyNode>>) {
            if let Some(mut children) = by_parent.remove(&Some(node.id.clone())) {
                for child in children.iter_mut() {
                    assemble(child, by_parent);
                }
                node.children = children;
            }
        }

        let Some(mut root) = by_parent.remove(&None).and_then(|mut roots| roots.pop()) else {
            return Ok(None);
        };
        assemble(&mut root, &mut by_parent);
        Ok(Some(root))
    }
}

impl ProfileStore for SqliteStorage {
    fn upsert_profile(&mut self, profile: &BrandProfile) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO brand_profiles
                (id, name, domain_root, auth_required, credential_id, login_url, requires_rendering,
                 rules_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                domain_root = excluded.domain_root,
                auth_required = excluded.auth_required,
                credential_id = excluded.credential_id,
                login_url = excluded.login_url,
                requires_rendering = excluded.requires_rendering,
                rules_json = excluded.rules_json,
                updated_at = excluded.updated_at",
            params![
                profile.id,
                profile.name,
                profile.domain_root,
                profile.auth_required,
                profile.credential_id,
                profile.login_url,
                profile.requires_rendering,
                profile.rules.to_json()?,
                now(),
            ],
        )?;
        Ok(())
    }

    fn get_profile(&self, profile_id: &str) -> StorageResult<BrandProfile> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM brand_profiles WHERE id = ?1", PROFILE_COLUMNS),
                params![profile_id],
                profile_from_row,
            )
            .optional()?
            .ok_or_else(|| StorageError::ProfileNotFound(profile_id.to_string()))
    }

    fn list_profiles(&self) -> StorageResult<Vec<BrandProfile>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM brand_profiles ORDER BY id", PROFILE_COLUMNS))?;
        let profiles = stmt
            .query_map([], profile_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(profiles)
    }

    fn set_requires_rendering(&mut self, profile_id: &str, requires_rendering: bool) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE brand_profiles SET requires_rendering = ?1, updated_at = ?2 WHERE id = ?3",
            params![requires_rendering, now(), profile_id],
        )?;
        if updated == 0 {
            return Err(StorageError::ProfileNotFound(profile_id.to_string()));
        }
        Ok(())
    }
}
