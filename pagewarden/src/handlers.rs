use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use pagewarden_core::report::{self, ReportFormat, UrlReport};
use pagewarden_core::{
    AnalyzerConfig, AnalyzerService, JobOutcome, NullSink, OutcomeStatus, SortDirection,
    SortField, SqliteRepository, UrlFilter, UrlStatus,
};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Process exit status for a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Clean,
    BrokenLinks,
    Failed,
}

impl RunStatus {
    pub fn code(&self) -> u8 {
        match self {
            RunStatus::Clean => 0,
            RunStatus::BrokenLinks => 1,
            RunStatus::Failed => 2,
        }
    }
}

// Helper functions for URL input

/// Load URLs from either a file or positional arguments
pub fn load_urls_from_source(
    urls: Option<Vec<String>>,
    file: Option<&PathBuf>,
) -> Result<Vec<String>, String> {
    if let Some(path) = file {
        load_urls_from_file(path)
    } else if let Some(urls) = urls
        && !urls.is_empty()
    {
        Ok(urls)
    } else {
        Err("Either URL arguments or --file must be provided".to_string())
    }
}

/// Load and parse URLs from a file
pub fn load_urls_from_file(path: &PathBuf) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read URL file {}: {}", path.display(), e))?;

    let urls: Vec<String> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| parse_url_line(line.trim()))
        .collect();

    if urls.is_empty() {
        return Err(format!("No valid URLs found in {}", path.display()));
    }

    Ok(urls)
}

/// Parse a single line as a URL, adding http:// when it has no scheme
pub fn parse_url_line(line: &str) -> Option<String> {
    let candidate = if line.contains("://") {
        line.to_string()
    } else {
        format!("http://{}", line)
    };

    match Url::parse(&candidate) {
        Ok(url) if url.host_str().is_some() => Some(candidate),
        _ => {
            warn!("Skipping invalid URL '{}'", line);
            None
        }
    }
}

/// Tilde-expand the database location.
pub fn resolve_db_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

/// Pool and engine settings from command flags (or their env vars).
pub fn config_from_args(args: &ArgMatches) -> AnalyzerConfig {
    let mut config = AnalyzerConfig::default();

    if let Some(workers) = args.get_one::<usize>("workers") {
        config.workers = *workers;
    }
    if let Some(size) = args.get_one::<usize>("queue-size") {
        config.queue_capacity = *size;
    }
    if let Some(retries) = args.get_one::<u32>("retries") {
        config.max_retries = *retries;
    }
    if let Some(secs) = args.get_one::<u64>("timeout") {
        config.fetch.timeout = Duration::from_secs(*secs);
    }
    if let Some(redirects) = args.get_one::<usize>("max-redirects") {
        config.fetch.max_redirects = *redirects;
    }
    if let Some(bytes) = args.get_one::<usize>("max-bytes") {
        config.fetch.max_response_bytes = *bytes;
    }
    if let Some(concurrency) = args.get_one::<usize>("probe-concurrency") {
        config.probe.concurrency = *concurrency;
    }
    match args.get_one::<u64>("job-timeout") {
        Some(secs) => config.job_timeout = Duration::from_secs(*secs),
        None => config.fit_job_timeout(),
    }

    config
}

pub fn format_from_args(args: &ArgMatches) -> ReportFormat {
    args.get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text)
}

pub fn filter_from_args(args: &ArgMatches) -> Result<UrlFilter> {
    let status = args
        .get_one::<String>("status")
        .map(|s| s.parse::<UrlStatus>())
        .transpose()
        .map_err(|e| anyhow!(e))?;
    let sort_by = args
        .get_one::<String>("sort")
        .map(|s| s.parse::<SortField>())
        .transpose()
        .map_err(|e| anyhow!(e))?;
    let sort_direction = if args.get_flag("desc") {
        SortDirection::Desc
    } else {
        SortDirection::Asc
    };

    Ok(UrlFilter {
        search: args.get_one::<String>("search").cloned(),
        status,
        sort_by,
        sort_direction,
        page: args.get_one::<u32>("page").copied().unwrap_or(1),
        limit: args.get_one::<u32>("limit").copied().unwrap_or(10),
        ..UrlFilter::default()
    })
}

fn open_repository(db_path: &Path) -> Result<Arc<SqliteRepository>> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let repo = SqliteRepository::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    Ok(Arc::new(repo))
}

fn start_service(db_path: &Path, config: AnalyzerConfig) -> Result<AnalyzerService> {
    let repo = open_repository(db_path)?;
    let service = AnalyzerService::start(config, repo, Arc::new(NullSink), CancellationToken::new())?;
    Ok(service)
}

fn spinner(quiet: bool, message: &str) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(message.to_string());
    spinner
}

/// Collect the terminal outcome of every job in `pending`.
pub async fn wait_for_jobs(
    outcomes: &mut broadcast::Receiver<JobOutcome>,
    mut pending: HashSet<String>,
    progress: &ProgressBar,
) -> Vec<JobOutcome> {
    let total = pending.len();
    let mut finished = Vec::with_capacity(total);

    while !pending.is_empty() {
        match outcomes.recv().await {
            Ok(outcome) => {
                if pending.remove(&outcome.job_id) {
                    debug!(job_id = %outcome.job_id, "Job finished: {:?}", outcome.status);
                    finished.push(outcome);
                    progress.set_message(format!("Analyzed {}/{}", finished.len(), total));
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Missed {} job outcomes", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }

    finished
}

/// Fold outcomes and records into an exit status: failures beat broken links.
pub fn run_status(outcomes: &[JobOutcome], reports: &[UrlReport]) -> RunStatus {
    let failed = outcomes
        .iter()
        .any(|o| o.status != OutcomeStatus::Succeeded)
        || reports.iter().any(|r| r.record.status == UrlStatus::Error);

    if failed {
        RunStatus::Failed
    } else if reports.iter().any(|r| r.record.broken_links > 0) {
        RunStatus::BrokenLinks
    } else {
        RunStatus::Clean
    }
}

async fn build_report(service: &AnalyzerService, id: i64) -> Result<UrlReport> {
    let record = service.get_url(id).await?;
    let broken_link_details = service.get_broken_links(id).await?;
    Ok(UrlReport {
        record,
        broken_link_details,
    })
}

// Command handlers

pub fn handle_init(args: &ArgMatches, db_path: &Path, quiet: bool) -> Result<RunStatus> {
    let force = args.get_flag("force");

    if SqliteRepository::exists(db_path) {
        if !force {
            bail!(
                "A database already exists at {} (use --force to overwrite)",
                db_path.display()
            );
        }
        SqliteRepository::remove(db_path)
            .with_context(|| format!("Failed to remove {}", db_path.display()))?;
        for suffix in ["-wal", "-shm"] {
            let sidecar = PathBuf::from(format!("{}{}", db_path.display(), suffix));
            if sidecar.exists() {
                fs::remove_file(&sidecar)
                    .with_context(|| format!("Failed to remove {}", sidecar.display()))?;
            }
        }
    }

    open_repository(db_path)?;
    if !quiet {
        println!(
            "{} Database created at {}",
            "✓".green().bold(),
            db_path.display().to_string().bright_white()
        );
    }
    Ok(RunStatus::Clean)
}

pub async fn handle_add(args: &ArgMatches, db_path: &Path, quiet: bool) -> Result<RunStatus> {
    let urls = args
        .get_many::<String>("URL")
        .map(|values| values.cloned().collect::<Vec<_>>());
    let file = args.get_one::<PathBuf>("file");
    let urls = load_urls_from_source(urls, file).map_err(|e| anyhow!(e))?;

    let service = start_service(db_path, AnalyzerConfig::default())?;
    let mut status = RunStatus::Clean;

    for raw in &urls {
        match service.add_url(raw).await {
            Ok(record) => {
                if !quiet {
                    println!("{} [{}] {}", "✓".green().bold(), record.id, record.url);
                }
            }
            Err(e) => {
                eprintln!("{} {}: {}", "✗".red().bold(), raw, e);
                status = RunStatus::Failed;
            }
        }
    }

    service.stop().await;
    Ok(status)
}

pub async fn handle_analyze(args: &ArgMatches, db_path: &Path, quiet: bool) -> Result<RunStatus> {
    let ids: Vec<i64> = args
        .get_many::<i64>("ID")
        .map(|values| values.copied().collect())
        .unwrap_or_default();
    let format = format_from_args(args);

    let service = start_service(db_path, config_from_args(args))?;
    let mut outcomes = service.subscribe_outcomes();

    let queued = service.analyze_urls(&ids).await;
    if queued.is_empty() {
        service.stop().await;
        bail!("None of the requested URLs could be queued");
    }

    let progress = spinner(quiet, &format!("Analyzing {} URL(s)", queued.len()));
    let pending = queued.iter().map(|(_, job_id)| job_id.clone()).collect();
    let finished = wait_for_jobs(&mut outcomes, pending, &progress).await;
    progress.finish_and_clear();

    let mut reports = Vec::with_capacity(queued.len());
    for (id, _) in &queued {
        reports.push(build_report(&service, *id).await?);
    }
    service.stop().await;

    println!("{}", report::render_reports(&reports, format)?);

    let status = run_status(&finished, &reports);
    if queued.len() < ids.len() {
        return Ok(RunStatus::Failed);
    }
    Ok(status)
}

pub async fn handle_check(args: &ArgMatches, db_path: &Path, quiet: bool) -> Result<RunStatus> {
    let raw = args
        .get_one::<String>("URL")
        .ok_or_else(|| anyhow!("a URL is required"))?;
    let format = format_from_args(args);

    let service = start_service(db_path, config_from_args(args))?;
    let mut outcomes = service.subscribe_outcomes();

    let record = service.add_url(raw).await?;
    let job_id = service.analyze_url(record.id).await?;

    let progress = spinner(quiet, &format!("Checking {}", record.url));
    let finished = wait_for_jobs(&mut outcomes, HashSet::from([job_id]), &progress).await;
    progress.finish_and_clear();

    let url_report = build_report(&service, record.id).await?;
    service.stop().await;

    println!("{}", report::render_report(&url_report, format)?);
    Ok(run_status(&finished, std::slice::from_ref(&url_report)))
}

pub async fn handle_list(args: &ArgMatches, db_path: &Path) -> Result<RunStatus> {
    let filter = filter_from_args(args)?;
    let format = format_from_args(args);

    let service = start_service(db_path, AnalyzerConfig::default())?;
    let page = service.list_urls(filter).await?;
    service.stop().await;

    println!("{}", report::render_page(&page, format)?);
    Ok(RunStatus::Clean)
}

pub async fn handle_show(args: &ArgMatches, db_path: &Path) -> Result<RunStatus> {
    let id = *args
        .get_one::<i64>("ID")
        .ok_or_else(|| anyhow!("an id is required"))?;
    let format = format_from_args(args);

    let service = start_service(db_path, AnalyzerConfig::default())?;
    let url_report = build_report(&service, id).await;
    service.stop().await;

    println!("{}", report::render_report(&url_report?, format)?);
    Ok(RunStatus::Clean)
}

pub async fn handle_delete(args: &ArgMatches, db_path: &Path, quiet: bool) -> Result<RunStatus> {
    let ids: Vec<i64> = args
        .get_many::<i64>("ID")
        .map(|values| values.copied().collect())
        .unwrap_or_default();

    let service = start_service(db_path, AnalyzerConfig::default())?;
    let removed = service.delete_urls(&ids).await?;
    service.stop().await;

    if !quiet {
        println!("{} Deleted {} of {} URL(s)", "✓".green().bold(), removed, ids.len());
    }
    if removed < ids.len() {
        return Ok(RunStatus::Failed);
    }
    Ok(RunStatus::Clean)
}
