// End-to-end tests for page analysis against a mock server

use pagewarden_scanner::{Analyzer, FetchConfig, ProbeConfig, ScanError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_bytes(body.as_bytes().to_vec())
}

fn analyzer() -> Analyzer {
    let probe = ProbeConfig {
        head_timeout: Duration::from_secs(2),
        get_timeout: Duration::from_secs(2),
        concurrency: 4,
    };
    Analyzer::new(FetchConfig::default(), probe).unwrap()
}

// ============================================================================
// Full Page Analysis
// ============================================================================

#[tokio::test]
async fn test_analyze_page_metrics_and_broken_links() {
    let mock_server = MockServer::start().await;

    let page = r##"<!DOCTYPE html>
<html>
<head><title> Welcome </title></head>
<body>
  <h1>Main</h1>
  <h2>One</h2><h2>Two</h2>
  <a href="/about">About</a>
  <a href="/gone">Gone</a>
  <a href="/about#team">About again</a>
  <a href="#top">Top</a>
  <a href="mailto:hello@example.com">Mail</a>
  <a href="http://127.0.0.1:1/unreachable">Dead host</a>
  <form id="login"><input type="text" name="q"></form>
</body>
</html>"##;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(page))
        .mount(&mock_server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/about"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let url = Url::parse(&format!("{}/", mock_server.uri())).unwrap();
    let analysis = analyzer()
        .analyze(&url, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(analysis.title.as_deref(), Some("Welcome"));
    assert_eq!(analysis.html_version, "HTML5");
    assert_eq!(analysis.headings.h1, 1);
    assert_eq!(analysis.headings.h2, 2);
    assert_eq!(analysis.internal_links, 2);
    assert_eq!(analysis.external_links, 1);
    assert!(analysis.has_login_form);
    assert!(!analysis.truncated);

    assert_eq!(analysis.broken_count(), 2);
    assert!(analysis.broken_links[0].url.ends_with("/gone"));
    assert_eq!(analysis.broken_links[0].status_code, 404);
    assert_eq!(analysis.broken_links[1].status_code, 0);
    assert!(analysis.broken_links[1].error.is_some());
}

#[tokio::test]
async fn test_non_http_links_counted_but_not_probed() {
    let mock_server = MockServer::start().await;
    let page = r#"<html><body>
  <a href="/ok">ok</a>
  <a href="ftp://files.example.com/pub/readme.txt">ftp</a>
  <a href="data:text/plain,hello">data</a>
</body></html>"#;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(page))
        .mount(&mock_server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let url = Url::parse(&format!("{}/", mock_server.uri())).unwrap();
    let analysis = analyzer()
        .analyze(&url, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(analysis.internal_links, 1);
    assert_eq!(analysis.external_links, 2);
    assert!(analysis.broken_links.is_empty());
}

#[tokio::test]
async fn test_links_resolve_against_final_url() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/docs/index.html"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docs/index.html"))
        .respond_with(html(r#"<a href="guide.html">Guide</a>"#))
        .mount(&mock_server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/docs/guide.html"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let url = Url::parse(&format!("{}/start", mock_server.uri())).unwrap();
    let analysis = analyzer()
        .analyze(&url, &CancellationToken::new())
        .await
        .unwrap();

    assert!(analysis.final_url.ends_with("/docs/index.html"));
    assert_eq!(analysis.broken_count(), 1);
    assert!(analysis.broken_links[0].url.ends_with("/docs/guide.html"));
}

#[tokio::test]
async fn test_page_without_links() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<html><body><p>plain</p></body></html>"))
        .mount(&mock_server)
        .await;

    let url = Url::parse(&mock_server.uri()).unwrap();
    let analysis = analyzer()
        .analyze(&url, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(analysis.title, None);
    assert_eq!(analysis.internal_links + analysis.external_links, 0);
    assert_eq!(analysis.broken_count(), 0);
    assert!(!analysis.has_login_form);
}

// ============================================================================
// Fetch Failures
// ============================================================================

#[tokio::test]
async fn test_page_server_error_aborts_analysis() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let url = Url::parse(&mock_server.uri()).unwrap();
    let err = analyzer()
        .analyze(&url, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ScanError::HttpStatus { status: 500, .. }));
    assert!(err.is_fetch_failure());
}

#[tokio::test]
async fn test_cancelled_analysis() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("<html></html>").set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let url = Url::parse(&mock_server.uri()).unwrap();
    let err = analyzer().analyze(&url, &cancel).await.unwrap_err();
    assert!(matches!(err, ScanError::Cancelled));
}
