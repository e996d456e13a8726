use pagewarden::commands::command_argument_builder;
use pagewarden::handlers::*;
use pagewarden_core::report::UrlReport;
use pagewarden_core::{
    JobOutcome, JobType, OutcomeStatus, SortDirection, SortField, UrlRecord, UrlStatus,
};
use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use tokio::sync::broadcast;

#[test]
fn test_parse_url_line_with_scheme() {
    let result = parse_url_line("https://example.com");
    assert_eq!(result, Some("https://example.com".to_string()));
}

#[test]
fn test_parse_url_line_without_scheme() {
    let result = parse_url_line("example.com/docs");
    assert_eq!(result, Some("http://example.com/docs".to_string()));
}

#[test]
fn test_parse_url_line_invalid() {
    assert_eq!(parse_url_line("not a valid url!!!"), None);
}

#[test]
fn test_load_urls_from_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut temp_file = NamedTempFile::new()?;
    writeln!(temp_file, "https://example.com")?;
    writeln!(temp_file, "example.org")?;
    writeln!(temp_file)?;
    writeln!(temp_file, "   ")?;
    writeln!(temp_file, "  https://example.net/about  ")?;

    let urls = load_urls_from_file(&temp_file.path().to_path_buf())?;
    assert_eq!(
        urls,
        vec![
            "https://example.com".to_string(),
            "http://example.org".to_string(),
            "https://example.net/about".to_string(),
        ]
    );
    Ok(())
}

#[test]
fn test_load_urls_from_empty_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut temp_file = NamedTempFile::new()?;
    writeln!(temp_file)?;

    let result = load_urls_from_file(&temp_file.path().to_path_buf());
    assert!(result.unwrap_err().contains("No valid URLs"));
    Ok(())
}

#[test]
fn test_load_urls_from_missing_file() {
    let result = load_urls_from_file(&PathBuf::from("/nonexistent/urls.txt"));
    assert!(result.unwrap_err().contains("Failed to read"));
}

#[test]
fn test_load_urls_from_source() {
    let urls = vec!["https://example.com".to_string()];
    assert_eq!(
        load_urls_from_source(Some(urls.clone()), None).unwrap(),
        urls
    );
    assert!(load_urls_from_source(None, None).is_err());
    assert!(load_urls_from_source(Some(vec![]), None).is_err());
}

#[test]
fn test_resolve_db_path_expands_tilde() {
    let path = resolve_db_path("~/pagewarden.db");
    assert!(!path.to_string_lossy().starts_with('~'));
    assert!(path.ends_with("pagewarden.db"));

    assert_eq!(
        resolve_db_path("/tmp/pw.db"),
        PathBuf::from("/tmp/pw.db")
    );
}

#[test]
fn test_config_from_args() {
    let matches = command_argument_builder().get_matches_from([
        "pagewarden",
        "analyze",
        "1",
        "2",
        "--workers",
        "4",
        "--queue-size",
        "8",
        "--retries",
        "1",
        "--timeout",
        "12",
        "--max-redirects",
        "2",
        "--probe-concurrency",
        "3",
    ]);
    let (_, args) = matches.subcommand().unwrap();
    let config = config_from_args(args);

    assert_eq!(config.workers, 4);
    assert_eq!(config.queue_capacity, 8);
    assert_eq!(config.max_retries, 1);
    assert_eq!(config.fetch.timeout, Duration::from_secs(12));
    assert_eq!(config.fetch.max_redirects, 2);
    assert_eq!(config.fetch.max_response_bytes, 10 * 1024 * 1024);
    assert_eq!(config.probe.concurrency, 3);
    assert_eq!(config.job_timeout, Duration::from_secs(30));
}

fn check_config(extra: &[&str]) -> pagewarden_core::AnalyzerConfig {
    let mut argv = vec!["pagewarden", "check", "http://x.test/"];
    argv.extend_from_slice(extra);
    let matches = command_argument_builder().get_matches_from(argv);
    let (_, args) = matches.subcommand().unwrap();
    config_from_args(args)
}

#[test]
fn test_long_fetch_timeout_raises_job_timeout() {
    let config = check_config(&["--timeout", "60"]);
    assert_eq!(config.fetch.timeout, Duration::from_secs(60));
    assert!(config.job_timeout > config.fetch.timeout);
    assert!(config.validate().is_ok());
}

#[test]
fn test_explicit_job_timeout() {
    let config = check_config(&["--timeout", "60", "--job-timeout", "90"]);
    assert_eq!(config.job_timeout, Duration::from_secs(90));

    let config = check_config(&["--timeout", "60", "--job-timeout", "10"]);
    assert!(config.validate().is_err());
}

#[test]
fn test_filter_from_args() {
    let matches = command_argument_builder().get_matches_from([
        "pagewarden",
        "list",
        "--search",
        "docs",
        "--status",
        "error",
        "--sort",
        "broken_links",
        "--desc",
        "--page",
        "2",
        "--limit",
        "25",
    ]);
    let (_, args) = matches.subcommand().unwrap();
    let filter = filter_from_args(args).unwrap();

    assert_eq!(filter.search.as_deref(), Some("docs"));
    assert_eq!(filter.status, Some(UrlStatus::Error));
    assert_eq!(filter.sort_by, Some(SortField::BrokenLinks));
    assert_eq!(filter.sort_direction, SortDirection::Desc);
    assert_eq!(filter.page, 2);
    assert_eq!(filter.limit, 25);
}

#[test]
fn test_add_rejects_urls_with_file() {
    let result = command_argument_builder().try_get_matches_from([
        "pagewarden",
        "add",
        "https://example.com",
        "--file",
        "urls.txt",
    ]);
    assert!(result.is_err());
}

fn outcome(job_id: &str, status: OutcomeStatus) -> JobOutcome {
    JobOutcome {
        job_id: job_id.to_string(),
        job_type: JobType::ANALYZE_URL,
        payload: serde_json::Value::Null,
        retries: 0,
        status,
        error: None,
        duration: Duration::from_millis(5),
    }
}

fn report(status: UrlStatus, broken: u32) -> UrlReport {
    let mut record = UrlRecord::new("https://example.com/", "hash");
    record.status = status;
    record.broken_links = broken;
    UrlReport {
        record,
        broken_link_details: vec![],
    }
}

#[test]
fn test_run_status() {
    let ok = [outcome("a", OutcomeStatus::Succeeded)];

    assert_eq!(
        run_status(&ok, &[report(UrlStatus::Completed, 0)]),
        RunStatus::Clean
    );
    assert_eq!(
        run_status(&ok, &[report(UrlStatus::Completed, 2)]),
        RunStatus::BrokenLinks
    );
    assert_eq!(
        run_status(
            &ok,
            &[report(UrlStatus::Completed, 2), report(UrlStatus::Error, 0)]
        ),
        RunStatus::Failed
    );
    assert_eq!(
        run_status(
            &[outcome("a", OutcomeStatus::Dropped)],
            &[report(UrlStatus::Completed, 0)]
        ),
        RunStatus::Failed
    );
    assert_eq!(RunStatus::BrokenLinks.code(), 1);
}

#[tokio::test]
async fn test_wait_for_jobs_ignores_unrelated_outcomes() {
    let (tx, mut rx) = broadcast::channel(16);
    tx.send(outcome("other", OutcomeStatus::Succeeded)).unwrap();
    tx.send(outcome("a", OutcomeStatus::Succeeded)).unwrap();
    tx.send(outcome("b", OutcomeStatus::Failed)).unwrap();

    let pending = HashSet::from(["a".to_string(), "b".to_string()]);
    let finished = wait_for_jobs(&mut rx, pending, &indicatif::ProgressBar::hidden()).await;

    let ids: Vec<_> = finished.iter().map(|o| o.job_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn test_wait_for_jobs_stops_when_closed() {
    let (tx, mut rx) = broadcast::channel::<JobOutcome>(4);
    drop(tx);

    let pending = HashSet::from(["a".to_string()]);
    let finished = wait_for_jobs(&mut rx, pending, &indicatif::ProgressBar::hidden()).await;
    assert!(finished.is_empty());
}

#[test]
fn test_init_refuses_existing_database_without_force() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("pagewarden.db");

    let init = |args: &[&str]| {
        let matches = command_argument_builder().get_matches_from(args);
        let (_, sub) = matches.subcommand().unwrap();
        handle_init(sub, &db_path, true)
    };

    assert_eq!(init(&["pagewarden", "init"]).unwrap(), RunStatus::Clean);
    assert!(db_path.exists());
    assert!(init(&["pagewarden", "init"]).is_err());
    assert_eq!(
        init(&["pagewarden", "init", "--force"]).unwrap(),
        RunStatus::Clean
    );
}

#[tokio::test]
async fn test_add_then_delete() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("pagewarden.db");

    let matches = command_argument_builder().get_matches_from([
        "pagewarden",
        "add",
        "https://example.com/a",
        "https://example.com/a#top",
        "ftp://example.com",
    ]);
    let (_, sub) = matches.subcommand().unwrap();
    let status = handle_add(sub, &db_path, true).await.unwrap();
    assert_eq!(status, RunStatus::Failed);

    let matches =
        command_argument_builder().get_matches_from(["pagewarden", "delete", "1", "99"]);
    let (_, sub) = matches.subcommand().unwrap();
    assert_eq!(
        handle_delete(sub, &db_path, true).await.unwrap(),
        RunStatus::Failed
    );

    let matches = command_argument_builder().get_matches_from(["pagewarden", "show", "1"]);
    let (_, sub) = matches.subcommand().unwrap();
    assert!(handle_show(sub, &db_path).await.is_err());
}
