//! Job lifecycle against a mock brand site

use crate::{http_fetcher, mount_page, product_page};
use catalog_crawl::config::CrawlerConfig;
use catalog_crawl::jobs::{BroadcastNotifier, EntryUrl, JobType, Orchestrator, ProgressTopic};
use catalog_crawl::profile::BrandProfile;
use catalog_crawl::storage::{CatalogStore, ExtractionStatus, SqliteStorage};
use catalog_crawl::{CatalogError, JobStatus};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn crawler_config() -> CrawlerConfig {
    CrawlerConfig {
        worker_pool_size: 2,
        max_fetch_attempts: 3,
        retry_backoff_ms: 5,
        stop_grace_period_ms: 500,
        ..CrawlerConfig::default()
    }
}

struct Harness {
    orchestrator: Orchestrator,
    notifier: BroadcastNotifier,
    storage: Arc<Mutex<SqliteStorage>>,
    _dir: TempDir,
}

fn harness() -> Harness {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let storage = SqliteStorage::new(&dir.path().join("catalog.db")).expect("Failed to open db");
    let storage = Arc::new(Mutex::new(storage));
    let notifier = BroadcastNotifier::new(256);
    let orchestrator = Orchestrator::new(
        crawler_config(),
        storage.clone(),
        http_fetcher(),
        Arc::new(notifier.clone()),
    );
    Harness {
        orchestrator,
        notifier,
        storage,
        _dir: dir,
    }
}

fn profile(server: &MockServer) -> BrandProfile {
    let host = url::Url::parse(&server.uri())
        .expect("Failed to parse base URL")
        .host_str()
        .expect("Failed to extract host")
        .to_string();
    BrandProfile::public("acme", "Acme Tools", &host)
}

#[tokio::test]
async fn test_failing_url_recorded_and_job_awaits_commit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p/a"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;
    mount_page(&server, "/p/b", &product_page("Cordless Drill", "DR-18V")).await;

    let h = harness();
    let base = server.uri();
    let job_id = h
        .orchestrator
        .enqueue(
            &profile(&server),
            JobType::Enrich,
            vec![
                EntryUrl::new(&format!("{}/p/a", base)),
                EntryUrl::new(&format!("{}/p/b", base)),
            ],
        )
        .unwrap();

    let job = h.orchestrator.wait(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::WaitingCommit);
    assert_eq!(job.counters.total, 2);
    assert_eq!(job.counters.processed, 2);
    assert_eq!(job.counters.items_found, 1);

    let staged = h.orchestrator.list_staged(&job_id).unwrap();
    assert_eq!(staged.len(), 2);
    let a = staged.iter().find(|r| r.canonical_url.ends_with("/p/a")).unwrap();
    let b = staged.iter().find(|r| r.canonical_url.ends_with("/p/b")).unwrap();
    assert_eq!(a.status, ExtractionStatus::Error);
    assert!(a.error_text.is_some());
    assert_eq!(b.status, ExtractionStatus::Ok);
    assert_eq!(b.record.name.as_deref(), Some("Cordless Drill"));
    assert_eq!(b.record.code.as_deref(), Some("DR-18V"));
}

#[tokio::test]
async fn test_commit_promotes_into_catalog() {
    let server = MockServer::start().await;
    mount_page(&server, "/p/1", &product_page("Hammer", "HM-1")).await;
    mount_page(&server, "/p/2", &product_page("Wrench", "WR-2")).await;

    let h = harness();
    let base = server.uri();
    let job_id = h
        .orchestrator
        .enqueue(
            &profile(&server),
            JobType::Enrich,
            vec![
                EntryUrl::new(&format!("{}/p/1", base)),
                EntryUrl::new(&format!("{}/p/2", base)),
            ],
        )
        .unwrap();
    h.orchestrator.wait(&job_id).await.unwrap();

    let applied = h.orchestrator.commit(&job_id).unwrap();
    assert_eq!(applied, 2);
    assert_eq!(
        h.orchestrator.get_job(&job_id).unwrap().status,
        JobStatus::Completed
    );

    let storage = h.storage.lock().unwrap();
    assert_eq!(storage.count_products("acme").unwrap(), 2);
    let found = storage.search_catalog("acme", "wrench", 1, 10).unwrap();
    assert_eq!(found.total, 1);
    assert_eq!(found.items[0].record.code.as_deref(), Some("WR-2"));
    drop(storage);

    // Committing again is rejected and changes nothing
    assert!(matches!(
        h.orchestrator.commit(&job_id),
        Err(CatalogError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_commit_while_running_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(product_page("Slow", "SL-1"), "text/html")
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;

    let h = harness();
    let job_id = h
        .orchestrator
        .enqueue(
            &profile(&server),
            JobType::Enrich,
            vec![EntryUrl::new(&format!("{}/p/slow", server.uri()))],
        )
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let result = h.orchestrator.commit(&job_id);
    assert!(matches!(
        result,
        Err(CatalogError::InvalidTransition {
            from: JobStatus::Running,
            to: JobStatus::Completed,
        })
    ));
    assert_eq!(
        h.orchestrator.get_job(&job_id).unwrap().status,
        JobStatus::Running
    );

    let job = h.orchestrator.wait(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::WaitingCommit);
}

#[tokio::test]
async fn test_stop_with_purge_removes_staged_rows() {
    let server = MockServer::start().await;
    let mut entries = Vec::new();
    for n in 0..5 {
        let route = format!("/p/{}", n);
        mount_page(&server, &route, &product_page("Clamp", &format!("CL-{}", n))).await;
        entries.push(EntryUrl::new(&format!("{}{}", server.uri(), route)));
    }

    let h = harness();
    let mut events = h.notifier.subscribe();
    let job_id = h
        .orchestrator
        .enqueue(&profile(&server), JobType::Enrich, entries)
        .unwrap();
    h.orchestrator.wait(&job_id).await.unwrap();
    assert_eq!(h.orchestrator.list_staged(&job_id).unwrap().len(), 5);

    let purged = h.orchestrator.stop(&job_id, true).await.unwrap();
    assert_eq!(purged, 5);
    assert_eq!(
        h.orchestrator.get_job(&job_id).unwrap().status,
        JobStatus::Stopped
    );
    assert!(h.orchestrator.list_staged(&job_id).unwrap().is_empty());

    let mut last_processed = 0;
    let mut stopped = false;
    while let Ok(event) = events.try_recv() {
        assert!(event.processed >= last_processed);
        assert!(event.processed <= event.total);
        last_processed = event.processed;
        stopped |= event.topic == ProgressTopic::Stopped;
    }
    assert_eq!(last_processed, 5);
    assert!(stopped);
}

#[tokio::test]
async fn test_stop_without_purge_keeps_rows() {
    let server = MockServer::start().await;
    mount_page(&server, "/p/1", &product_page("Level", "LV-1")).await;

    let h = harness();
    let job_id = h
        .orchestrator
        .enqueue(
            &profile(&server),
            JobType::Enrich,
            vec![EntryUrl::new(&format!("{}/p/1", server.uri()))],
        )
        .unwrap();
    h.orchestrator.wait(&job_id).await.unwrap();

    assert_eq!(h.orchestrator.stop(&job_id, false).await.unwrap(), 0);
    assert_eq!(h.orchestrator.list_staged(&job_id).unwrap().len(), 1);
    assert!(h.orchestrator.list_active_jobs().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let h = harness();
    assert!(matches!(
        h.orchestrator.commit("missing"),
        Err(CatalogError::JobNotFound(_))
    ));
    assert!(matches!(
        h.orchestrator.stop("missing", true).await,
        Err(CatalogError::JobNotFound(_))
    ));
}
