//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! crawl jobs end-to-end through the public manager API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nova_crawler::config::{Config, CrawlerConfig, RobotsConfig, SitemapConfig};
use nova_crawler::crawler::{build_http_client, HttpFetcher};
use nova_crawler::robots::RobotsCache;
use nova_crawler::sitemap::SitemapResolver;
use nova_crawler::storage::{IndexSink, IndexedPage, RecrawlSource, StoreError, StoreResult};
use nova_crawler::{CrawlError, CrawlManager, JobState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Sink and recrawl source that records everything it is handed
#[derive(Default)]
struct RecordingSink {
    pages: Mutex<Vec<(String, Instant)>>,
    due: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn with_due(domains: Vec<String>) -> Self {
        Self {
            due: Mutex::new(domains),
            ..Self::default()
        }
    }

    fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .pages
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect();
        urls.sort();
        urls
    }

    fn index_times(&self) -> Vec<Instant> {
        self.pages.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl IndexSink for RecordingSink {
    async fn index_page(&self, page: IndexedPage) -> StoreResult<()> {
        self.pages
            .lock()
            .unwrap()
            .push((page.url.to_string(), Instant::now()));
        Ok(())
    }
}

#[async_trait]
impl RecrawlSource for RecordingSink {
    async fn domains_due_for_recrawl(&self) -> StoreResult<Vec<String>> {
        Ok(self.due.lock().unwrap().clone())
    }

    async fn record_crawl_completed(&self, domain: &str, _at: DateTime<Utc>) -> StoreResult<()> {
        self.completed.lock().unwrap().push(domain.to_string());
        Ok(())
    }
}

/// Creates a fast test configuration
fn create_test_config(workers: usize, max_depth: u32, max_pages: u64) -> Config {
    Config {
        crawler: CrawlerConfig {
            workers,
            max_depth,
            max_pages,
            min_delay_ms: 0,
            fetch_timeout_secs: 5,
            ..CrawlerConfig::default()
        },
        robots: RobotsConfig {
            fetch_timeout_secs: 2,
            ..RobotsConfig::default()
        },
        sitemap: SitemapConfig {
            requests_per_second: 100,
            ..SitemapConfig::default()
        },
        ..Config::default()
    }
}

fn create_manager(config: Config, sink: &Arc<RecordingSink>) -> CrawlManager {
    CrawlManager::new(config, sink.clone(), sink.clone()).expect("Failed to create manager")
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/html")
}

fn xml(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "application/xml")
}

async fn mount_page(server: &MockServer, page_path: &str, links: &[&str]) {
    let anchors: String = links
        .iter()
        .map(|link| format!(r#"<a href="{}">{}</a>"#, link, link))
        .collect();
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(html(format!(
            "<html><head><title>{}</title></head><body><main>{}</main></body></html>",
            page_path, anchors
        )))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_single_domain() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .mount(&mock_server)
        .await;

    mount_page(&mock_server, "/", &["/page1", "/page2"]).await;
    mount_page(&mock_server, "/page1", &["/", "/page2"]).await;
    mount_page(&mock_server, "/page2", &["/page1"]).await;

    let sink = Arc::new(RecordingSink::default());
    let manager = create_manager(create_test_config(2, 3, 100), &sink);

    let job_id = manager
        .start_crawling(&[format!("{}/", base_url)], None)
        .await
        .expect("Failed to start crawl");
    let status = manager.wait(job_id).await.expect("Job should exist");

    assert_eq!(status.status, JobState::Completed);
    assert_eq!(status.pages_crawled, 3);
    assert_eq!(status.queue_size, 0);
    assert!(status.finished_at.is_some());
    assert_eq!(
        sink.urls(),
        vec![
            format!("{}/", base_url),
            format!("{}/page1", base_url),
            format!("{}/page2", base_url),
        ]
    );
}

#[tokio::test]
async fn test_robots_txt_respect() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"),
        )
        .mount(&mock_server)
        .await;

    mount_page(&mock_server, "/", &["/public", "/private/secret"]).await;
    mount_page(&mock_server, "/public", &[]).await;

    Mock::given(method("GET"))
        .and(path("/private/secret"))
        .respond_with(html("<html><body>secret</body></html>".to_string()))
        .expect(0)
        .mount(&mock_server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let manager = create_manager(create_test_config(2, 3, 100), &sink);

    let job_id = manager
        .start_crawling(&[format!("{}/", base_url)], None)
        .await
        .unwrap();
    let status = manager.wait(job_id).await.unwrap();

    assert_eq!(status.status, JobState::Completed);
    assert_eq!(
        sink.urls(),
        vec![format!("{}/", base_url), format!("{}/public", base_url)]
    );
}

#[tokio::test]
async fn test_robots_timeout_allows_then_retries() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // First fetch hangs past the robots timeout, the retry answers
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("User-agent: *\nAllow: /")
                .set_delay(Duration::from_secs(5)),
        )
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"),
        )
        .mount(&mock_server)
        .await;

    let crawler = CrawlerConfig::default();
    let robots_config = RobotsConfig {
        fetch_timeout_secs: 1,
        failure_cooldown_secs: 60,
        ..RobotsConfig::default()
    };
    let client = build_http_client(&Config::default().user_agent, &crawler).unwrap();
    let robots = RobotsCache::new(
        HttpFetcher::from_config(client, &crawler),
        "NovaSearchBot",
        &robots_config,
    );

    let private = Url::parse(&format!("{}/private/page", base_url)).unwrap();

    let start = Instant::now();
    assert!(robots.can_fetch(&private).await);
    assert!(start.elapsed() < Duration::from_secs(3));

    // A timeout sets no cooldown, so the next check fetches again
    assert!(!robots.can_fetch(&private).await);
}

#[tokio::test]
async fn test_sitemap_index_recursion() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/sitemap_index.xml"))
        .respond_with(xml(format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <sitemap><loc>{0}/sitemap1.xml</loc></sitemap>
              <sitemap><loc>{0}/sitemap2.xml</loc></sitemap>
              <sitemap><loc>{0}/sitemap1.xml</loc></sitemap>
            </sitemapindex>"#,
            base_url
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    for (sitemap, pages) in [("/sitemap1.xml", ["a", "b", "c"]), ("/sitemap2.xml", ["d", "e", "f"])] {
        let entries: String = pages
            .iter()
            .map(|p| format!("<url><loc>{}/{}</loc></url>", base_url, p))
            .collect();
        Mock::given(method("GET"))
            .and(path(sitemap))
            .respond_with(xml(format!(
                r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{}</urlset>"#,
                entries
            )))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let config = create_test_config(1, 3, 100);
    let client = build_http_client(&config.user_agent, &config.crawler).unwrap();
    let resolver = SitemapResolver::new(
        HttpFetcher::from_config(client, &config.crawler),
        None,
        config.sitemap.clone(),
        config.crawler.max_body_bytes,
    );

    let seed = Url::parse(&format!("{}/sitemap_index.xml", base_url)).unwrap();
    let urls = resolver.resolve(&[seed]).await.expect("Resolution should succeed");

    let mut urls: Vec<String> = urls.into_iter().map(String::from).collect();
    urls.sort();
    let expected: Vec<String> = ["a", "b", "c", "d", "e", "f"]
        .iter()
        .map(|p| format!("{}/{}", base_url, p))
        .collect();
    assert_eq!(urls, expected);
}

#[tokio::test]
async fn test_sitemap_seed_crawls_listed_pages() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(xml(format!(
            r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>{0}/one</loc></url>
              <url><loc>{0}/two</loc></url>
            </urlset>"#,
            base_url
        )))
        .mount(&mock_server)
        .await;

    mount_page(&mock_server, "/one", &[]).await;
    mount_page(&mock_server, "/two", &[]).await;

    let sink = Arc::new(RecordingSink::default());
    let manager = create_manager(create_test_config(2, 0, 100), &sink);

    let job_id = manager
        .start_crawling(&[format!("{}/sitemap.xml", base_url)], None)
        .await
        .unwrap();
    let status = manager.wait(job_id).await.unwrap();

    assert_eq!(status.status, JobState::Completed);
    assert_eq!(
        sink.urls(),
        vec![format!("{}/one", base_url), format!("{}/two", base_url)]
    );
}

#[tokio::test]
async fn test_same_domain_fetches_are_spaced() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/", &["/a", "/b", "/c"]).await;
    for page in ["/a", "/b", "/c"] {
        mount_page(&mock_server, page, &[]).await;
    }

    let mut config = create_test_config(4, 1, 100);
    config.crawler.min_delay_ms = 200;

    let sink = Arc::new(RecordingSink::default());
    let manager = create_manager(config, &sink);

    let job_id = manager
        .start_crawling(&[format!("{}/", base_url)], None)
        .await
        .unwrap();
    manager.wait(job_id).await.unwrap();

    let mut times = sink.index_times();
    times.sort();
    assert_eq!(times.len(), 4);
    for pair in times.windows(2) {
        // Index times trail fetch starts by the response time
        assert!(
            pair[1] - pair[0] >= Duration::from_millis(150),
            "fetches {:?} apart",
            pair[1] - pair[0]
        );
    }
}

#[tokio::test]
async fn test_cancellation_finishes_in_flight_fetch() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            html(format!(
                r#"<html><body><a href="{0}/next1">1</a><a href="{0}/next2">2</a></body></html>"#,
                base_url
            ))
            .set_delay(Duration::from_millis(800)),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/next1"))
        .respond_with(html("<html></html>".to_string()))
        .expect(0)
        .mount(&mock_server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let manager = create_manager(create_test_config(2, 3, 100), &sink);

    let job_id = manager
        .start_crawling(&[format!("{}/slow", base_url)], None)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(manager.cancel_crawling(job_id));

    let status = manager.wait(job_id).await.unwrap();
    assert_eq!(status.status, JobState::Cancelled);
    assert_eq!(sink.urls(), vec![format!("{}/slow", base_url)]);
    assert_eq!(status.pages_crawled, 1);
    assert_eq!(status.queue_size, 0);

    // Finished jobs cannot be cancelled again
    assert!(!manager.cancel_crawling(job_id));
    assert!(sink.completed().is_empty());
}

#[tokio::test]
async fn test_crawl_with_depth_limit() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/", &["/level1"]).await;
    mount_page(&mock_server, "/level1", &["/level2"]).await;

    Mock::given(method("GET"))
        .and(path("/level2"))
        .respond_with(html("<html></html>".to_string()))
        .expect(0)
        .mount(&mock_server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let manager = create_manager(create_test_config(2, 3, 100), &sink);

    let job_id = manager
        .start_crawling(&[format!("{}/", base_url)], Some(1))
        .await
        .unwrap();
    let status = manager.wait(job_id).await.unwrap();

    assert_eq!(status.max_depth, 1);
    assert_eq!(
        sink.urls(),
        vec![format!("{}/", base_url), format!("{}/level1", base_url)]
    );
}

#[tokio::test]
async fn test_page_budget() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    let links: Vec<String> = (0..10).map(|i| format!("/p{}", i)).collect();
    let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();
    mount_page(&mock_server, "/", &link_refs).await;
    for link in &links {
        mount_page(&mock_server, link, &[]).await;
    }

    let sink = Arc::new(RecordingSink::default());
    let manager = create_manager(create_test_config(4, 3, 3), &sink);

    let job_id = manager
        .start_crawling(&[format!("{}/", base_url)], None)
        .await
        .unwrap();
    let status = manager.wait(job_id).await.unwrap();

    assert_eq!(status.status, JobState::Completed);
    assert_eq!(status.pages_crawled, 3);
    assert_eq!(sink.urls().len(), 3);
}

#[tokio::test]
async fn test_invalid_seeds_fail_setup() {
    let sink = Arc::new(RecordingSink::default());
    let manager = create_manager(create_test_config(1, 1, 10), &sink);

    let result = manager
        .start_crawling(&["not a url", "ftp://example.com/file"], None)
        .await;

    let job_id = match result {
        Err(CrawlError::Setup { job_id, .. }) => job_id,
        other => panic!("expected setup failure, got {:?}", other),
    };

    let status = manager.get_status(job_id).expect("Failed job stays queryable");
    assert_eq!(status.status, JobState::Failed);
    assert!(status.errors.len() >= 2);
    assert!(manager.evict_job(job_id));
    assert!(manager.get_status(job_id).is_none());
}

#[tokio::test]
async fn test_unknown_job() {
    let sink = Arc::new(RecordingSink::default());
    let manager = create_manager(create_test_config(1, 1, 10), &sink);
    let unknown = uuid::Uuid::new_v4();

    assert!(manager.get_status(unknown).is_none());
    assert!(!manager.cancel_crawling(unknown));
    assert!(matches!(
        manager.wait(unknown).await,
        Err(CrawlError::JobNotFound(id)) if id == unknown
    ));
}

#[tokio::test]
async fn test_recrawl_cycle_starts_due_domains() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            html("<html><body>home</body></html>".to_string())
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&mock_server)
        .await;

    let sink = Arc::new(RecordingSink::with_due(vec![base_url.clone()]));
    let manager = create_manager(create_test_config(1, 0, 10), &sink);

    assert_eq!(manager.run_recrawl_cycle().await, 1);

    // Still running, so the domain is skipped
    assert_eq!(manager.run_recrawl_cycle().await, 0);

    let jobs = manager.list_jobs();
    assert_eq!(jobs.len(), 1);
    let status = manager.wait(jobs[0].job_id).await.unwrap();

    assert_eq!(status.status, JobState::Completed);
    assert_eq!(sink.urls(), vec![format!("{}/", base_url)]);
    // The schedule is keyed by origin, so the scheme survives the recrawl
    assert_eq!(sink.completed(), vec![base_url]);
}

/// Responds slowly and records when each request arrived
struct SlowArrivals {
    arrivals: Arc<Mutex<Vec<Instant>>>,
    delay: Duration,
}

impl Respond for SlowArrivals {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        html("<html><body>slow</body></html>".to_string()).set_delay(self.delay)
    }
}

#[tokio::test]
async fn test_same_domain_fetches_never_overlap() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let arrivals = Arc::new(Mutex::new(Vec::new()));

    mount_page(&mock_server, "/", &["/a", "/b", "/c"]).await;
    for page in ["/a", "/b", "/c"] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(SlowArrivals {
                arrivals: arrivals.clone(),
                delay: Duration::from_millis(600),
            })
            .mount(&mock_server)
            .await;
    }

    let mut config = create_test_config(3, 1, 100);
    config.crawler.min_delay_ms = 100;

    let sink = Arc::new(RecordingSink::default());
    let manager = create_manager(config, &sink);

    let job_id = manager
        .start_crawling(&[format!("{}/", base_url)], None)
        .await
        .unwrap();
    manager.wait(job_id).await.unwrap();

    let mut arrivals = arrivals.lock().unwrap().clone();
    arrivals.sort();
    assert_eq!(arrivals.len(), 3);
    for pair in arrivals.windows(2) {
        // Each request waits for the previous response
        assert!(
            pair[1] - pair[0] >= Duration::from_millis(590),
            "requests {:?} apart",
            pair[1] - pair[0]
        );
    }
}

#[tokio::test]
async fn test_shared_link_indexed_once() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    let links: Vec<String> = (0..8).map(|i| format!("/p{}", i)).collect();
    let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();
    mount_page(&mock_server, "/", &link_refs).await;
    for link in &links {
        mount_page(&mock_server, link, &["/", "/shared", "/shared/", "/shared#top"]).await;
    }

    Mock::given(method("GET"))
        .and(path("/shared"))
        .respond_with(html("<html><body>shared</body></html>".to_string()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let manager = create_manager(create_test_config(4, 3, 100), &sink);

    let job_id = manager
        .start_crawling(&[format!("{}/", base_url)], None)
        .await
        .unwrap();
    let status = manager.wait(job_id).await.unwrap();

    let urls = sink.urls();
    let mut unique = urls.clone();
    unique.dedup();
    assert_eq!(urls, unique);
    assert_eq!(urls.len(), 10);
    assert_eq!(status.pages_crawled, 10);
}

#[tokio::test]
async fn test_redirect_to_known_url_indexed_once() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/", &["/old", "/new"]).await;
    mount_page(&mock_server, "/new", &[]).await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .mount(&mock_server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let manager = create_manager(create_test_config(2, 3, 100), &sink);

    let job_id = manager
        .start_crawling(&[format!("{}/", base_url)], None)
        .await
        .unwrap();
    manager.wait(job_id).await.unwrap();

    assert_eq!(
        sink.urls(),
        vec![format!("{}/", base_url), format!("{}/new", base_url)]
    );
}

#[tokio::test]
async fn test_cross_host_redirect_respects_target_robots() {
    let origin_server = MockServer::start().await;
    let target_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/go"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("{}/private/page", target_server.uri()).as_str()),
        )
        .mount(&origin_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"),
        )
        .mount(&target_server)
        .await;
    mount_page(&target_server, "/private/page", &[]).await;

    let sink = Arc::new(RecordingSink::default());
    let manager = create_manager(create_test_config(1, 1, 10), &sink);

    let job_id = manager
        .start_crawling(&[format!("{}/go", origin_server.uri())], None)
        .await
        .unwrap();
    let status = manager.wait(job_id).await.unwrap();

    assert_eq!(status.status, JobState::Completed);
    assert!(sink.urls().is_empty());
}

#[tokio::test]
async fn test_sitemap_named_html_seed_is_crawled() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/blog/sitemap-tips", &[]).await;

    let sink = Arc::new(RecordingSink::default());
    let manager = create_manager(create_test_config(1, 0, 10), &sink);

    let job_id = manager
        .start_crawling(&[format!("{}/blog/sitemap-tips", base_url)], None)
        .await
        .expect("An HTML seed is crawlable");
    let status = manager.wait(job_id).await.unwrap();

    assert_eq!(status.status, JobState::Completed);
    assert_eq!(sink.urls(), vec![format!("{}/blog/sitemap-tips", base_url)]);
}

#[tokio::test]
async fn test_finished_jobs_evicted_oldest_first() {
    let sink = Arc::new(RecordingSink::default());
    let manager = create_manager(create_test_config(1, 1, 10), &sink);

    let mut failed = Vec::new();
    for _ in 0..3 {
        if let Err(CrawlError::Setup { job_id, .. }) =
            manager.start_crawling(&["not a url"], None).await
        {
            failed.push(job_id);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(failed.len(), 3);

    assert_eq!(manager.evict_finished_jobs(1), 2);
    let remaining: Vec<_> = manager.list_jobs().iter().map(|s| s.job_id).collect();
    assert_eq!(remaining, vec![failed[2]]);
    assert_eq!(manager.evict_finished_jobs(1), 0);
}

/// Recrawl source whose first check fails
#[derive(Default)]
struct FlakyRecrawlSource {
    checks: AtomicUsize,
}

#[async_trait]
impl RecrawlSource for FlakyRecrawlSource {
    async fn domains_due_for_recrawl(&self) -> StoreResult<Vec<String>> {
        if self.checks.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(StoreError::Database("connection reset".to_string()));
        }
        Ok(Vec::new())
    }

    async fn record_crawl_completed(&self, _domain: &str, _at: DateTime<Utc>) -> StoreResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_scheduler_survives_failed_check() {
    let mut config = create_test_config(1, 1, 10);
    config.recrawl.check_interval_secs = 1;

    let source = Arc::new(FlakyRecrawlSource::default());
    let manager = CrawlManager::new(config, Arc::new(RecordingSink::default()), source.clone())
        .expect("Failed to create manager");

    let shutdown = CancellationToken::new();
    let stop = {
        let shutdown = shutdown.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            shutdown.cancel();
        }
    };

    tokio::join!(manager.schedule_recrawls(shutdown.clone()), stop);

    // First tick fails, the second one still runs
    assert!(source.checks.load(Ordering::SeqCst) >= 2);
}
