use crate::extract::FileKind;
use crate::fetcher::{FetchedFile, SessionFetcher};
use crate::profile::BrandProfile;
use crate::storage::{AssetRecord, AssetStore, SqliteStorage, StorageError, StorageResult};
use crate::{CatalogError, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const MAX_FILE_NAME_LEN: usize = 120;

/// Counts from one download run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadSummary {
    pub downloaded: usize,
    /// Already on disk
    pub skipped: usize,
    pub failed: usize,
}

/// Fetches registered product files that are not yet on disk
pub struct AssetDownloader {
    pages: SessionFetcher,
    storage: Arc<Mutex<SqliteStorage>>,
    root: PathBuf,
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '_' || c == '.');
    trimmed.chars().take(MAX_FILE_NAME_LEN).collect()
}

/// Last path segment of the URL, when it looks like a file name
fn url_basename(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.last()?;
    let decoded = percent_encoding::percent_decode_str(segment).decode_utf8_lossy();
    let name = sanitize(&decoded);
    name.contains('.').then_some(name)
}

/// File name for a downloaded asset
///
/// Prefers the URL's basename, then the server's `Content-Disposition`
/// name, then the product code (or the asset name) with the kind's default
/// extension. A short hash of the URL is prefixed so different URLs with
/// the same basename never collide.
pub fn asset_file_name(asset: &AssetRecord, served_name: Option<&str>) -> String {
    let digest = Sha256::digest(asset.original_url.as_bytes());
    let prefix = hex::encode(&digest[..4]);

    let name = url_basename(&asset.original_url)
        .or_else(|| served_name.map(sanitize).filter(|n| !n.is_empty()))
        .unwrap_or_else(|| {
            let stem = sanitize(asset.product_code.as_deref().unwrap_or(&asset.name));
            let stem = if stem.is_empty() { "file".to_string() } else { stem };
            format!("{}.{}", stem, asset.kind.default_extension())
        });
    format!("{}_{}", prefix, name)
}

fn failure_status(err: &CatalogError) -> Option<u16> {
    match err {
        CatalogError::NotFound { .. } | CatalogError::AuthRequired { .. } => {
            Some(err.status_code())
        }
        _ => None,
    }
}

impl AssetDownloader {
    pub fn new(
        pages: SessionFetcher,
        storage: Arc<Mutex<SqliteStorage>>,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pages,
            storage,
            root: root.into(),
        }
    }

    fn with_storage<T>(
        &self,
        op: impl FnOnce(&mut SqliteStorage) -> StorageResult<T>,
    ) -> Result<T> {
        let mut storage = self.storage.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(op(&mut storage)?)
    }

    fn profile_dir(&self, profile_id: &str) -> PathBuf {
        self.root.join(sanitize(profile_id))
    }

    /// Downloads every asset of `profile` (restricted to `kinds` unless
    /// empty) that has no file on disk yet
    ///
    /// Failures are recorded on the asset row and counted; they do not stop
    /// the run. Only storage and filesystem errors are returned.
    pub async fn download_missing(
        &self,
        profile: &BrandProfile,
        kinds: &[FileKind],
    ) -> Result<DownloadSummary> {
        let assets = self.with_storage(|s| s.list_assets(&profile.id, kinds))?;
        let auth = profile.auth_required.then_some(profile.id.as_str());
        let dir = self.profile_dir(&profile.id);
        tokio::fs::create_dir_all(&dir).await?;

        let mut summary = DownloadSummary::default();
        for asset in &assets {
            if self.already_on_disk(asset).await? {
                summary.skipped += 1;
                continue;
            }

            match self.pages.download(&asset.original_url, auth).await {
                Ok(file) => {
                    let path = dir.join(asset_file_name(asset, file.file_name.as_deref()));
                    let hash = write_file(&path, &file).await?;
                    let local_path = path.to_string_lossy().into_owned();
                    self.with_storage(|s| {
                        s.mark_asset_downloaded(&profile.id, &asset.original_url, &local_path, &hash)
                    })?;
                    tracing::debug!(url = %asset.original_url, path = %local_path, "asset downloaded");
                    summary.downloaded += 1;
                }
                Err(err) => {
                    tracing::warn!(url = %asset.original_url, error = %err, "asset download failed");
                    let message = err.to_string();
                    let status = failure_status(&err);
                    self.with_storage(|s| {
                        s.mark_asset_failed(&profile.id, &asset.original_url, status, &message)
                    })?;
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            profile_id = %profile.id,
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            failed = summary.failed,
            "asset download finished"
        );
        Ok(summary)
    }

    /// True when the asset's file exists, either at its recorded path or at
    /// the path its URL alone determines
    async fn already_on_disk(&self, asset: &AssetRecord) -> Result<bool> {
        if let Some(local) = asset.local_path.as_deref() {
            if tokio::fs::try_exists(local).await? {
                self.with_storage(|s| s.touch_asset(&asset.profile_id, &asset.original_url))?;
                return Ok(true);
            }
        }

        if url_basename(&asset.original_url).is_none() {
            return Ok(false);
        }
        let path = self.profile_dir(&asset.profile_id).join(asset_file_name(asset, None));
        if !tokio::fs::try_exists(&path).await? {
            return Ok(false);
        }
        let bytes = tokio::fs::read(&path).await?;
        let hash = hex::encode(Sha256::digest(&bytes));
        let local_path = path.to_string_lossy().into_owned();
        self.with_storage(|s| {
            s.mark_asset_downloaded(&asset.profile_id, &asset.original_url, &local_path, &hash)
        })?;
        Ok(true)
    }
}

/// Writes to a `.part` sibling and renames it into place; returns the
/// SHA-256 of the content
async fn write_file(path: &Path, file: &FetchedFile) -> Result<String> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    tokio::fs::write(&partial, &file.bytes).await?;
    tokio::fs::rename(&partial, path).await?;
    Ok(hex::encode(Sha256::digest(&file.bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserAgentConfig;
    use crate::extract::{FileRef, ProductRecord, FALLBACK_FILE_NAME};
    use crate::fetcher::{build_http_client, HttpFetcher};
    use crate::jobs::{JobStatus, JobType, SessionGate};
    use crate::profile::{ExtractionRules, StaticCredentialStore};
    use crate::storage::{JobCounters, JobRecord, JobStore, StagedProduct, StagingStore};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn asset(url: &str, code: Option<&str>, kind: FileKind) -> AssetRecord {
        AssetRecord {
            profile_id: "acme".to_string(),
            original_url: url.to_string(),
            product_url: "https://x.com/p/1".to_string(),
            product_code: code.map(str::to_string),
            kind,
            name: FALLBACK_FILE_NAME.to_string(),
            local_path: None,
            file_hash: None,
            http_status: None,
            error_text: None,
            job_id: None,
            last_checked_at: None,
            first_seen_at: String::new(),
            last_seen_at: String::new(),
        }
    }

    #[test]
    fn test_file_name_sources() {
        let by_url = asset_file_name(&asset("https://x.com/docs/Drill%20Manual.pdf", None, FileKind::Document), None);
        assert!(by_url.ends_with("_Drill_Manual.pdf"));
        assert_eq!(by_url.len(), 8 + 1 + "Drill_Manual.pdf".len());

        let served = asset_file_name(&asset("https://x.com/files/42", None, FileKind::Cad), Some("drill 42.stp"));
        assert!(served.ends_with("_drill_42.stp"));

        let fallback = asset_file_name(&asset("https://x.com/files/42", Some("DR/42"), FileKind::Cad), None);
        assert!(fallback.ends_with("_DR_42.stp"));
    }

    #[test]
    fn test_same_basename_different_urls_do_not_collide() {
        let a = asset_file_name(&asset("https://x.com/a/manual.pdf", None, FileKind::Document), None);
        let b = asset_file_name(&asset("https://x.com/b/manual.pdf", None, FileKind::Document), None);
        assert_ne!(a, b);
    }

    fn committed_storage(files: &[(String, FileKind)]) -> Arc<Mutex<SqliteStorage>> {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .create_job(&JobRecord {
                id: "j1".to_string(),
                job_type: JobType::Enrich,
                profile_id: "acme".to_string(),
                entry_urls: vec!["https://x.com/p/1".to_string()],
                rules: ExtractionRules::default(),
                status: JobStatus::Pending,
                counters: JobCounters::default(),
                created_at: String::new(),
                updated_at: String::new(),
                error_text: None,
            })
            .unwrap();
        let record = ProductRecord {
            url: "https://x.com/p/1".to_string(),
            code: Some("DR-1".to_string()),
            files: files
                .iter()
                .map(|(url, kind)| FileRef {
                    url: url.clone(),
                    name: FALLBACK_FILE_NAME.to_string(),
                    kind: *kind,
                })
                .collect(),
            ..ProductRecord::default()
        };
        storage
            .upsert_staged(&StagedProduct::extracted("j1", "https://x.com/p/1", record))
            .unwrap();
        storage.transition_job("j1", JobStatus::Running, None).unwrap();
        storage.transition_job("j1", JobStatus::WaitingCommit, None).unwrap();
        storage.promote("j1").unwrap();
        Arc::new(Mutex::new(storage))
    }

    fn downloader(storage: Arc<Mutex<SqliteStorage>>, root: &Path) -> AssetDownloader {
        let config = UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        };
        let client = build_http_client(&config, 5).unwrap();
        let fetcher = HttpFetcher::new(client, Arc::new(StaticCredentialStore::new()));
        let pages = SessionFetcher::new(Arc::new(fetcher), Arc::new(SessionGate::new()));
        AssetDownloader::new(pages, storage, root)
    }

    #[tokio::test]
    async fn test_downloads_then_skips_existing_files() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs/manual.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cad/gone.stp"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let manual = format!("{}/docs/manual.pdf", server.uri());
        let gone = format!("{}/cad/gone.stp", server.uri());
        let storage = committed_storage(&[(manual.clone(), FileKind::Document), (gone.clone(), FileKind::Cad)]);
        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(storage.clone(), dir.path());
        let profile = BrandProfile::public("acme", "Acme", "127.0.0.1");

        let first = downloader.download_missing(&profile, &[]).await.unwrap();
        assert_eq!(first, DownloadSummary { downloaded: 1, skipped: 0, failed: 1 });

        let assets = storage.lock().unwrap().list_assets("acme", &[]).unwrap();
        let pdf = assets.iter().find(|a| a.original_url == manual).unwrap();
        let local = pdf.local_path.clone().unwrap();
        assert_eq!(std::fs::read(&local).unwrap(), b"%PDF-1.4");
        assert_eq!(pdf.file_hash.as_deref(), Some(hex::encode(Sha256::digest(b"%PDF-1.4")).as_str()));
        let missing = assets.iter().find(|a| a.original_url == gone).unwrap();
        assert_eq!(missing.http_status, Some(404));
        assert!(missing.local_path.is_none());

        // The mock expects exactly one request for the PDF
        let second = downloader.download_missing(&profile, &[FileKind::Document]).await.unwrap();
        assert_eq!(second, DownloadSummary { downloaded: 0, skipped: 1, failed: 0 });
        let touched = storage.lock().unwrap().list_assets("acme", &[FileKind::Document]).unwrap();
        assert!(touched[0].last_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_file_on_disk_without_record_is_adopted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"PK".to_vec(), "application/zip"))
            .expect(0)
            .mount(&server)
            .await;

        let url = format!("{}/kits/kit.zip", server.uri());
        let storage = committed_storage(&[(url.clone(), FileKind::Archive)]);
        let dir = tempfile::tempdir().unwrap();
        let existing = storage.lock().unwrap().list_assets("acme", &[]).unwrap().remove(0);
        let target = dir.path().join("acme").join(asset_file_name(&existing, None));
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, b"PK-old").unwrap();

        let profile = BrandProfile::public("acme", "Acme", "127.0.0.1");
        let summary = downloader(storage.clone(), dir.path())
            .download_missing(&profile, &[])
            .await
            .unwrap();
        assert_eq!(summary.skipped, 1);

        let adopted = storage.lock().unwrap().list_assets("acme", &[]).unwrap().remove(0);
        assert_eq!(adopted.local_path.as_deref(), Some(target.to_str().unwrap()));
        assert_eq!(adopted.file_hash.as_deref(), Some(hex::encode(Sha256::digest(b"PK-old")).as_str()));
    }
}
