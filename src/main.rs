//! Catalog-Crawl main entry point
//!
//! This is the command-line interface for the catalog crawl engine.

use anyhow::{Context, Result};
use catalog_crawl::config::{load_config_with_hash, Config};
use catalog_crawl::assets::AssetDownloader;
use catalog_crawl::extract::FileKind;
use catalog_crawl::fetcher::{
    build_http_client, check_site, HttpFetcher, PageFetcher, SessionFetcher,
};
use catalog_crawl::jobs::{
    BroadcastNotifier, EntryUrl, JobStatus, JobType, Orchestrator, SessionGate,
};
use catalog_crawl::pattern::{apply, detect, SampleRow, UrlPattern};
use catalog_crawl::profile::{BrandProfile, EnvCredentialStore};
use catalog_crawl::storage::{
    AssetStore, CatalogStore, CategoryNode, JobRecord, ProfileStore, SqliteStorage, StorageError,
    TaxonomyStore,
};
use catalog_crawl::taxonomy::{NodeKind, TaxonomyNode, TaxonomyScanner};
use catalog_crawl::CatalogError;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Catalog-Crawl: turns brand product websites into a structured catalog
///
/// Learns URL templates from one example, discovers category trees, and
/// runs crawl jobs whose results are staged until committed.
#[derive(Parser, Debug)]
#[command(name = "catalog-crawl")]
#[command(version = "1.0.0")]
#[command(about = "Catalog crawl and extraction engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Learn a URL template from one product code, name and URL
    Detect {
        #[arg(long)]
        code: String,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long)]
        url: String,
    },

    /// Generate product URLs from a template and codes
    Apply {
        #[arg(long)]
        template: String,
        #[arg(required = true)]
        codes: Vec<String>,
    },

    /// Discover a site's category tree
    Scan {
        url: String,
        /// Recurse into every hub instead of visiting the root's links only
        #[arg(long)]
        deep: bool,
        /// Scan inside this profile's session and store the tree
        #[arg(long)]
        profile: Option<String>,
    },

    /// Expand one category node
    Expand {
        url: String,
        #[arg(long)]
        profile: Option<String>,
    },

    /// Run a crawl job and wait until it awaits commit
    Run {
        #[arg(long)]
        profile: String,
        #[arg(long = "type", value_enum, default_value_t = JobKind::Enrich)]
        job_type: JobKind,
        /// Treat inputs as product codes for the profile's web pattern
        #[arg(long)]
        codes: bool,
        /// Delete staged rows when interrupted with Ctrl-C
        #[arg(long)]
        purge_on_interrupt: bool,
        #[arg(required = true)]
        inputs: Vec<String>,
    },

    /// Promote a job's staged rows into the catalog
    Commit { job: String },

    /// Stop a job
    Stop {
        job: String,
        /// Delete the job's staged rows
        #[arg(long)]
        purge: bool,
    },

    /// List active jobs
    Jobs,

    /// List a job's staged rows
    Staged { job: String },

    /// Search the committed catalog
    Search {
        #[arg(long)]
        profile: String,
        #[arg(default_value = "")]
        query: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 25)]
        page_size: u32,
    },

    /// Show the catalog's category tree
    Categories {
        #[arg(long)]
        profile: String,
    },

    /// Check whether a site answers and needs a JavaScript renderer
    CheckSite {
        url: String,
        /// Record the result on this profile
        #[arg(long)]
        profile: Option<String>,
    },

    /// Download a profile's linked files that are not on disk yet
    Assets {
        #[arg(long)]
        profile: String,
        /// Restrict to these file kinds (all kinds when omitted)
        #[arg(long = "kind", value_enum)]
        kinds: Vec<AssetKind>,
        /// List registered files instead of downloading
        #[arg(long)]
        list: bool,
    },

    /// Manage brand profiles
    Profiles {
        #[command(subcommand)]
        action: ProfilesAction,
    },
}

#[derive(Subcommand, Debug)]
enum ProfilesAction {
    /// Upsert the config file's profiles into the database
    Sync,
    /// List stored profiles
    List,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum JobKind {
    Enrich,
    Update,
    Analyze,
    Bulk,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum AssetKind {
    Document,
    Cad,
    Archive,
}

impl From<AssetKind> for FileKind {
    fn from(kind: AssetKind) -> Self {
        match kind {
            AssetKind::Document => FileKind::Document,
            AssetKind::Cad => FileKind::Cad,
            AssetKind::Archive => FileKind::Archive,
        }
    }
}

impl From<JobKind> for JobType {
    fn from(kind: JobKind) -> Self {
        match kind {
            JobKind::Enrich => JobType::Enrich,
            JobKind::Update => JobType::Update,
            JobKind::Analyze => JobType::Analyze,
            JobKind::Bulk => JobType::Bulk,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let status = e
                .downcast_ref::<CatalogError>()
                .map(CatalogError::status_code)
                .unwrap_or(500);
            tracing::error!("{:#}", e);
            eprintln!("error [{}]: {:#}", status, e);
            ExitCode::from(exit_code(status))
        }
    }
}

/// Process exit code for an HTTP-style status: 2 for caller errors, 1 otherwise
fn exit_code(status: u16) -> u8 {
    match status {
        400..=499 => 2,
        _ => 1,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_crawl=info,warn"),
            1 => EnvFilter::new("catalog_crawl=debug,info"),
            2 => EnvFilter::new("catalog_crawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    tracing::debug!("Configuration loaded (hash: {})", config_hash);

    match cli.command {
        Command::Detect { code, name, url } => handle_detect(&code, &name, &url),
        Command::Apply { template, codes } => handle_apply(&template, &codes),
        Command::Scan { url, deep, profile } => handle_scan(&config, &url, deep, profile).await,
        Command::Expand { url, profile } => handle_expand(&config, &url, profile).await,
        Command::Run {
            profile,
            job_type,
            codes,
            purge_on_interrupt,
            inputs,
        } => {
            handle_run(
                &config,
                &profile,
                job_type.into(),
                codes,
                purge_on_interrupt,
                &inputs,
            )
            .await
        }
        Command::Commit { job } => {
            let orchestrator = build_orchestrator(&config)?;
            let applied = orchestrator.commit(&job)?;
            println!("✓ Committed job {} ({} catalog rows applied)", job, applied);
            Ok(())
        }
        Command::Stop { job, purge } => {
            let orchestrator = build_orchestrator(&config)?;
            let purged = orchestrator.stop(&job, purge).await?;
            println!("✓ Stopped job {} ({} staged rows deleted)", job, purged);
            Ok(())
        }
        Command::Jobs => {
            let orchestrator = build_orchestrator(&config)?;
            let jobs = orchestrator.list_active_jobs()?;
            println!("Active jobs ({}):", jobs.len());
            for job in &jobs {
                print_job(job);
            }
            Ok(())
        }
        Command::Staged { job } => {
            let orchestrator = build_orchestrator(&config)?;
            let rows = orchestrator.list_staged(&job)?;
            println!("Staged rows for {} ({}):", job, rows.len());
            for row in &rows {
                println!(
                    "  [{}] {} {}",
                    row.status.to_db_string(),
                    row.canonical_url,
                    row.record
                        .name
                        .as_deref()
                        .or(row.error_text.as_deref())
                        .unwrap_or("")
                );
            }
            Ok(())
        }
        Command::Search {
            profile,
            query,
            page,
            page_size,
        } => {
            let storage = open_storage(&config)?;
            let results = storage.search_catalog(&profile, &query, page, page_size)?;
            println!(
                "{} matches (page {}, {} per page):",
                results.total, results.page, results.page_size
            );
            for item in &results.items {
                println!(
                    "  {} | {} | {}",
                    item.record.code.as_deref().unwrap_or("-"),
                    item.record.name.as_deref().unwrap_or("-"),
                    item.canonical_url
                );
            }
            Ok(())
        }
        Command::Categories { profile } => {
            let storage = open_storage(&config)?;
            let tree = storage.category_tree(&profile)?;
            for node in &tree {
                print_category(node, 0);
            }
            Ok(())
        }
        Command::CheckSite { url, profile } => handle_check_site(&config, &url, profile).await,
        Command::Assets {
            profile,
            kinds,
            list,
        } => {
            let kinds: Vec<FileKind> = kinds.into_iter().map(FileKind::from).collect();
            handle_assets(&config, &profile, &kinds, list).await
        }
        Command::Profiles { action } => handle_profiles(&config, action),
    }
}

fn open_storage(config: &Config) -> Result<SqliteStorage> {
    let path = Path::new(&config.storage.database_path);
    SqliteStorage::new(path).with_context(|| format!("opening database {}", path.display()))
}

fn build_fetcher(config: &Config) -> Result<Arc<dyn PageFetcher>> {
    let client = build_http_client(&config.user_agent, config.crawler.request_timeout_secs)
        .context("building HTTP client")?;
    let profiles = config.profiles.iter().map(BrandProfile::from);
    Ok(Arc::new(
        HttpFetcher::new(client, Arc::new(EnvCredentialStore)).with_profiles(profiles),
    ))
}

fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let storage = Arc::new(Mutex::new(open_storage(config)?));
    let notifier = BroadcastNotifier::new(config.crawler.progress_channel_capacity);
    Ok(Orchestrator::new(
        config.crawler.clone(),
        storage,
        build_fetcher(config)?,
        Arc::new(notifier),
    ))
}

/// Gated fetcher with the crawler's retry settings, for work outside jobs
fn build_session_fetcher(config: &Config) -> Result<SessionFetcher> {
    Ok(
        SessionFetcher::new(build_fetcher(config)?, Arc::new(SessionGate::new()))
            .with_retry(config.crawler.max_fetch_attempts, config.crawler.retry_backoff_ms),
    )
}

fn build_scanner(config: &Config) -> Result<TaxonomyScanner> {
    Ok(TaxonomyScanner::with_fetcher(
        build_session_fetcher(config)?,
        config.taxonomy.clone(),
    ))
}

/// Finds a profile in the config file, then in the database
///
/// A config-file profile still picks up the rendering flag recorded by
/// `check-site`.
fn resolve_profile(config: &Config, profile_id: &str) -> Result<BrandProfile> {
    let storage = open_storage(config)?;
    let stored = match storage.get_profile(profile_id) {
        Ok(profile) => Some(profile),
        Err(StorageError::ProfileNotFound(_)) => None,
        Err(e) => return Err(e.into()),
    };
    match (config.profiles.iter().find(|p| p.id == profile_id), stored) {
        (Some(entry), stored) => {
            let mut profile = BrandProfile::from(entry);
            profile.requires_rendering |= stored.map_or(false, |p| p.requires_rendering);
            Ok(profile)
        }
        (None, Some(profile)) => Ok(profile),
        (None, None) => Err(CatalogError::ProfileNotFound(profile_id.to_string()).into()),
    }
}

fn handle_detect(code: &str, name: &str, url: &str) -> Result<()> {
    let pattern = detect(&SampleRow::new(code, name), url)?;
    println!("Template: {}", pattern.template);
    println!("Placeholders: {}", pattern.placeholders.join(", "));
    for token in &pattern.matched_tokens {
        println!("  {} <- {:?}", token.token, token.literal);
    }
    Ok(())
}

fn handle_apply(template: &str, codes: &[String]) -> Result<()> {
    let urls = apply(&UrlPattern::from_template(template), codes)?;
    for url in urls {
        println!("{}", url);
    }
    Ok(())
}

async fn handle_scan(
    config: &Config,
    url: &str,
    deep: bool,
    profile_id: Option<String>,
) -> Result<()> {
    let auth_profile = match &profile_id {
        Some(id) => resolve_profile(config, id)?.auth_required.then(|| id.clone()),
        None => None,
    };
    let scanner = build_scanner(config)?
        .with_auth_profile(auth_profile);

    tracing::info!("Scanning {} ({})", url, if deep { "deep" } else { "shallow" });
    let root = scanner.scan(url, deep).await?;
    print_tree(&root, 0);
    println!("\n{} nodes", root.node_count());

    if let Some(id) = profile_id {
        let mut storage = open_storage(config)?;
        storage.save_tree(&id, &root)?;
        println!("✓ Tree stored for profile {}", id);
    }
    Ok(())
}

async fn handle_expand(config: &Config, url: &str, profile_id: Option<String>) -> Result<()> {
    let auth_profile = match &profile_id {
        Some(id) => resolve_profile(config, id)?.auth_required.then(|| id.clone()),
        None => None,
    };
    let scanner = build_scanner(config)?
        .with_auth_profile(auth_profile);

    let node = TaxonomyNode::for_url(url, url, NodeKind::Collection);
    let children = scanner.expand_node(&node).await?;
    for child in &children {
        print_tree(child, 0);
    }
    Ok(())
}

async fn handle_run(
    config: &Config,
    profile_id: &str,
    job_type: JobType,
    codes: bool,
    purge_on_interrupt: bool,
    inputs: &[String],
) -> Result<()> {
    let profile = resolve_profile(config, profile_id)?;

    let storage = Arc::new(Mutex::new(open_storage(config)?));
    let notifier = BroadcastNotifier::new(config.crawler.progress_channel_capacity);
    let orchestrator = Orchestrator::new(
        config.crawler.clone(),
        storage,
        build_fetcher(config)?,
        Arc::new(notifier.clone()),
    );

    for job_id in orchestrator.recover_interrupted()? {
        println!("Marked interrupted job {} as failed", job_id);
    }

    let job_id = if codes {
        orchestrator.enqueue_codes(&profile, job_type, inputs)?
    } else {
        let entries = inputs.iter().map(|url| EntryUrl::new(url)).collect();
        orchestrator.enqueue(&profile, job_type, entries)?
    };
    println!("Job {} started ({} entries)", job_id, inputs.len());

    // Progress stream is best effort; lagged events are skipped
    let mut events = notifier.subscribe();
    let reporter = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(
                    job_id = %event.job_id,
                    status = %event.status,
                    "Progress {}/{} ({} found)",
                    event.processed,
                    event.total,
                    event.items_found
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let job = tokio::select! {
        job = orchestrator.wait(&job_id) => job?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, stopping job {}", job_id);
            let purged = orchestrator.stop(&job_id, purge_on_interrupt).await?;
            if purge_on_interrupt {
                println!("Deleted {} staged rows", purged);
            }
            orchestrator.get_job(&job_id)?
        }
    };
    reporter.abort();

    print_job(&job);
    if job.status == JobStatus::WaitingCommit {
        println!("\nReview with `staged {}`, then `commit {}`", job.id, job.id);
    }
    Ok(())
}

async fn handle_check_site(config: &Config, url: &str, profile_id: Option<String>) -> Result<()> {
    let client = build_http_client(&config.user_agent, config.crawler.request_timeout_secs)
        .context("building HTTP client")?;
    let result = check_site(&client, url).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if let Some(id) = profile_id {
        let mut profile = resolve_profile(config, &id)?;
        profile.requires_rendering = result.requires_rendering;
        let mut storage = open_storage(config)?;
        match storage.set_requires_rendering(&id, result.requires_rendering) {
            Err(StorageError::ProfileNotFound(_)) => storage.upsert_profile(&profile)?,
            other => other?,
        }
        println!("✓ Profile {} requires rendering: {}", id, result.requires_rendering);
    }
    Ok(())
}

async fn handle_assets(
    config: &Config,
    profile_id: &str,
    kinds: &[FileKind],
    list: bool,
) -> Result<()> {
    let profile = resolve_profile(config, profile_id)?;
    let storage = Arc::new(Mutex::new(open_storage(config)?));

    if list {
        let guard = storage.lock().map_err(|_| StorageError::LockPoisoned)?;
        for asset in guard.list_assets(&profile.id, kinds)? {
            println!(
                "  [{}] {} {}",
                asset.kind.to_db_string(),
                asset.original_url,
                asset
                    .local_path
                    .as_deref()
                    .or(asset.error_text.as_deref())
                    .unwrap_or("")
            );
        }
        return Ok(());
    }

    let downloader = AssetDownloader::new(
        build_session_fetcher(config)?,
        storage,
        &config.storage.asset_dir,
    );
    let summary = downloader.download_missing(&profile, kinds).await?;
    println!(
        "✓ {} downloaded, {} already on disk, {} failed",
        summary.downloaded, summary.skipped, summary.failed
    );
    Ok(())
}

fn handle_profiles(config: &Config, action: ProfilesAction) -> Result<()> {
    let mut storage = open_storage(config)?;
    match action {
        ProfilesAction::Sync => {
            for entry in &config.profiles {
                storage.upsert_profile(&BrandProfile::from(entry))?;
                println!("✓ {} ({})", entry.id, entry.name);
            }
            println!("Synced {} profiles", config.profiles.len());
        }
        ProfilesAction::List => {
            for profile in storage.list_profiles()? {
                println!(
                    "{}: {} [{}]{}",
                    profile.id,
                    profile.name,
                    profile.domain_root,
                    if profile.auth_required { " (login)" } else { "" }
                );
            }
        }
    }
    Ok(())
}

fn print_job(job: &JobRecord) {
    let c = &job.counters;
    println!(
        "  {} [{}] {} profile={} processed={}/{} found={} products={}/{}",
        job.id,
        job.status,
        job.job_type,
        job.profile_id,
        c.processed,
        c.total,
        c.items_found,
        c.products_processed,
        c.total_products
    );
    if let Some(error) = &job.error_text {
        println!("    error: {}", error);
    }
}

fn print_tree(node: &TaxonomyNode, depth: usize) {
    let count = node
        .product_count
        .map(|n| format!(" ({} products)", n))
        .unwrap_or_default();
    println!(
        "{}- {} [{}]{} {}",
        "  ".repeat(depth),
        node.name,
        node.kind.to_db_string(),
        count,
        node.url.as_deref().unwrap_or("")
    );
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}

fn print_category(node: &CategoryNode, depth: usize) {
    println!("{}{} ({})", "  ".repeat(depth), node.name, node.count);
    for child in &node.children {
        print_category(child, depth + 1);
    }
}
