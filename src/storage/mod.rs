//! Storage module for jobs, staging, and the permanent catalog
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Job records and their durable counters
//! - Per-job staging of extracted products
//! - Atomic promotion of staged rows into the catalog
//! - The asset registry of files linked from committed products
//! - Taxonomy trees and brand profiles

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{
    AssetStore, CatalogStore, JobStore, ProfileStore, StagingStore, Storage, StorageError,
    StorageResult, TaxonomyStore,
};

use crate::extract::{FileKind, ProductRecord};
use crate::jobs::{JobStatus, JobType};
use crate::profile::ExtractionRules;
use crate::CatalogError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Opens (or creates) the database at `path`
pub fn open_storage(path: &Path) -> Result<SqliteStorage, CatalogError> {
    SqliteStorage::new(path)
}

/// Durable job counters; the single source of truth for progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    /// Entry URLs known to the job
    pub total: u32,
    /// Entry URLs fully processed and persisted
    pub processed: u32,
    /// Processed URLs that produced product data
    pub items_found: u32,
    /// Products discovered, including appended associated products
    pub total_products: u32,
    pub products_processed: u32,
}

/// A crawl job as stored
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: String,
    pub job_type: JobType,
    pub profile_id: String,
    pub entry_urls: Vec<String>,
    pub rules: ExtractionRules,
    pub status: JobStatus,
    pub counters: JobCounters,
    pub created_at: String,
    pub updated_at: String,
    pub error_text: Option<String>,
}

/// Outcome of extracting one entry URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Ok,
    Error,
    NotFound,
}

impl ExtractionStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::NotFound => "not_found",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(Self::Ok),
            "error" => Some(Self::Error),
            "not_found" => Some(Self::NotFound),
            _ => None,
        }
    }
}

/// One staged row per (job, canonical URL)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedProduct {
    pub job_id: String,
    pub canonical_url: String,
    pub record: ProductRecord,
    pub status: ExtractionStatus,
    pub error_text: Option<String>,
    pub staged_at: String,
}

impl StagedProduct {
    /// A successful or empty extraction, depending on whether data was found
    pub fn extracted(job_id: &str, canonical_url: &str, record: ProductRecord) -> Self {
        let status = if record.has_product_data() {
            ExtractionStatus::Ok
        } else {
            ExtractionStatus::NotFound
        };
        Self {
            job_id: job_id.to_string(),
            canonical_url: canonical_url.to_string(),
            record,
            status,
            error_text: None,
            staged_at: String::new(),
        }
    }

    /// A failed URL, recorded so the job can continue
    pub fn failed(job_id: &str, canonical_url: &str, status: ExtractionStatus, error: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            canonical_url: canonical_url.to_string(),
            record: ProductRecord {
                url: canonical_url.to_string(),
                ..ProductRecord::default()
            },
            status,
            error_text: Some(error.to_string()),
            staged_at: String::new(),
        }
    }
}

/// A permanent catalog entry, unique per (profile, canonical URL)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub profile_id: String,
    pub canonical_url: String,
    pub record: ProductRecord,
    pub first_seen_at: String,
    pub last_seen_at: String,
}

/// A code lookup that found no product page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingProductRef {
    pub profile_id: String,
    pub searched_code: String,
    pub occurrence_count: u32,
    pub last_seen_at: String,
}

/// A file linked from a committed product, unique per (profile, file URL)
///
/// `local_path` is set once the file has been downloaded; a failed download
/// keeps any earlier path and records the error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub profile_id: String,
    pub original_url: String,
    pub product_url: String,
    pub product_code: Option<String>,
    pub kind: FileKind,
    pub name: String,
    pub local_path: Option<String>,
    pub file_hash: Option<String>,
    pub http_status: Option<u16>,
    pub error_text: Option<String>,
    pub job_id: Option<String>,
    pub last_checked_at: Option<String>,
    pub first_seen_at: String,
    pub last_seen_at: String,
}

/// One page of catalog search results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogPage {
    pub items: Vec<CatalogProduct>,
    pub total: u32,
    pub page: u32,
    pub page_size: u32,
}

/// Category tree derived from committed products' category paths
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryNode {
    pub name: String,
    pub count: u32,
    pub children: Vec<CategoryNode>,
}

/// Splits category paths on `>` or `/` and folds them into a counted tree
pub fn build_category_tree(paths: &[(String, u32)]) -> Vec<CategoryNode> {
    #[derive(Default)]
    struct Branch {
        count: u32,
        children: BTreeMap<String, Branch>,
    }

    fn into_nodes(children: BTreeMap<String, Branch>) -> Vec<CategoryNode> {
        children
            .into_iter()
            .map(|(name, branch)| CategoryNode {
                name,
                count: branch.count,
                children: into_nodes(branch.children),
            })
            .collect()
    }

    let mut root: BTreeMap<String, Branch> = BTreeMap::new();
    for (path, count) in paths {
        let mut level = &mut root;
        for part in path
            .split(|c| c == '>' || c == '/')
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            let branch = level.entry(part.to_string()).or_default();
            branch.count += count;
            level = &mut branch.children;
        }
    }
    into_nodes(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_status_roundtrip() {
        for status in [ExtractionStatus::Ok, ExtractionStatus::Error, ExtractionStatus::NotFound] {
            assert_eq!(ExtractionStatus::from_db_string(status.to_db_string()), Some(status));
        }
        assert_eq!(ExtractionStatus::from_db_string("invalid"), None);
    }

    #[test]
    fn test_staged_status_follows_data() {
        let found = StagedProduct::extracted(
            "j",
            "https://x.com/p/1",
            ProductRecord {
                name: Some("Drill".to_string()),
                ..ProductRecord::default()
            },
        );
        assert_eq!(found.status, ExtractionStatus::Ok);

        let empty = StagedProduct::extracted("j", "https://x.com/p/2", ProductRecord::default());
        assert_eq!(empty.status, ExtractionStatus::NotFound);
    }

    #[test]
    fn test_category_tree() {
        let tree = build_category_tree(&[
            ("Tools > Drills".to_string(), 3),
            ("Tools / Saws".to_string(), 2),
            ("Garden".to_string(), 1),
        ]);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].name, "Garden");
        let tools = &tree[1];
        assert_eq!(tools.count, 5);
        assert_eq!(
            tools.children.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["Drills", "Saws"]
        );
    }
}
