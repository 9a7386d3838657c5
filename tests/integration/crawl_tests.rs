//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the registry's search and
//! repository APIs and run the full crawl cycle end-to-end.

use hub_indexer::config::{
    CacheConfig, Config, CrawlerConfig, EndpointsConfig, SeedsConfig, StorageConfig,
};
use hub_indexer::crawler::run_crawl;
use hub_indexer::storage::{dockerfile_entries, open_index, IndexStore};
use hub_indexer::IndexerError;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock registry
fn create_test_config(server: &MockServer, dir: &TempDir, keywords: &[&str]) -> Config {
    let seeds_path = dir.path().join("search-terms.json");
    let seeds = serde_json::json!({ "keywords": keywords });
    std::fs::write(&seeds_path, seeds.to_string()).expect("Failed to write seed file");

    Config {
        crawler: CrawlerConfig {
            workers: 4,
            retries: 0,
            request_timeout_ms: 5_000,
            ..CrawlerConfig::default()
        },
        endpoints: EndpointsConfig {
            search_url: format!("{}/v1/search", server.uri()),
            detail_url: format!("{}/v2/repositories", server.uri()),
            page_size: 1000,
            ..EndpointsConfig::default()
        },
        storage: StorageConfig {
            path: dir.path().join("index").display().to_string(),
        },
        seeds: SeedsConfig {
            path: seeds_path.display().to_string(),
        },
        ..Config::default()
    }
}

async fn mount_search(server: &MockServer, keyword: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(query_param("q", keyword))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_dockerfile(server: &MockServer, image: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/v2/repositories/{}/dockerfile/", image)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_single_keyword() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_search(
        &server,
        "ffmpeg",
        serde_json::json!({
            "num_pages": 1,
            "results": [{"name": "bfirsh/ffmpeg", "description": "ffmpeg in a box"}]
        }),
    )
    .await;
    mount_dockerfile(
        &server,
        "bfirsh/ffmpeg",
        serde_json::json!({"contents": "FROM ubuntu"}),
    )
    .await;

    let config = create_test_config(&server, &dir, &["ffmpeg"]);
    let storage = config.storage.path.clone();

    let report = run_crawl(config).await.expect("Crawl failed");

    assert!(!report.interrupted);
    assert_eq!(report.seeds, 1);
    assert_eq!(report.frontier.completed, 2);
    assert_eq!(report.failures(), 0);

    let index = open_index(Path::new(&storage)).unwrap();
    assert_eq!(
        index.get("bfirsh/ffmpeg").unwrap(),
        Some("ffmpeg in a box".to_string())
    );
    assert_eq!(
        index.get("bfirsh/ffmpeg/dockerfile").unwrap(),
        Some("FROM ubuntu".to_string())
    );
    assert_eq!(
        dockerfile_entries(&index).unwrap(),
        vec![(
            "bfirsh/ffmpeg/dockerfile".to_string(),
            "FROM ubuntu".to_string()
        )]
    );
}

#[tokio::test]
async fn test_every_result_page_fetched_once() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // Later pages first so they win over the page 1 mock, which has no
    // `page` parameter to match on
    for page in [2, 3] {
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .and(query_param("q", "redis"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "num_pages": 3,
                "results": [{"name": format!("user{}/redis", page)}]
            })))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(query_param("q", "redis"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "num_pages": 3,
            "results": [{"name": "user1/redis"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    for page in 1..=3 {
        mount_dockerfile(
            &server,
            &format!("user{}/redis", page),
            serde_json::json!({"contents": format!("FROM redis:{}\n", page)}),
        )
        .await;
    }

    let config = create_test_config(&server, &dir, &["redis"]);
    let storage = config.storage.path.clone();

    let report = run_crawl(config).await.expect("Crawl failed");

    assert_eq!(report.counters.search_pages, 3);
    assert_eq!(report.counters.images_indexed, 3);
    assert_eq!(report.counters.dockerfiles_indexed, 3);
    // Pages 2 and 3 are announced by page 1 only
    assert_eq!(report.frontier.duplicates, 0);

    let index = open_index(Path::new(&storage)).unwrap();
    for page in 1..=3 {
        assert_eq!(
            index
                .get(&format!("user{}/redis/dockerfile", page))
                .unwrap(),
            Some(format!("FROM redis:{}", page))
        );
    }

    server.verify().await;
}

#[tokio::test]
async fn test_malformed_body_is_contained() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(query_param("q", "broken"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>rate limited</html>"))
        .mount(&server)
        .await;
    mount_search(
        &server,
        "nginx",
        serde_json::json!({"num_pages": 1, "results": [{"name": "library/nginx"}]}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/v2/repositories/library/nginx/dockerfile/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = create_test_config(&server, &dir, &["broken", "nginx"]);
    let storage = config.storage.path.clone();

    let report = run_crawl(config).await.expect("Crawl failed");

    assert_eq!(report.frontier.completed, 3);
    assert_eq!(report.counters.malformed_responses, 2);
    assert_eq!(report.counters.images_indexed, 1);

    let index = open_index(Path::new(&storage)).unwrap();
    assert_eq!(index.get("library/nginx").unwrap(), Some(String::new()));
    assert_eq!(index.get("library/nginx/dockerfile").unwrap(), None);
}

#[tokio::test]
async fn test_empty_dockerfile_leaves_no_key() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_search(
        &server,
        "scratch",
        serde_json::json!({
            "num_pages": 1,
            "results": [{"name": "someone/blank"}, {"name": "someone/entity"}]
        }),
    )
    .await;
    mount_dockerfile(&server, "someone/blank", serde_json::json!({"contents": "  \n\t"})).await;
    mount_dockerfile(
        &server,
        "someone/entity",
        serde_json::json!({"contents": "  FROM&nbsp;ubuntu\n"}),
    )
    .await;

    let config = create_test_config(&server, &dir, &["scratch"]);
    let storage = config.storage.path.clone();

    let report = run_crawl(config).await.expect("Crawl failed");

    assert_eq!(report.counters.empty_dockerfiles, 1);
    assert_eq!(report.counters.dockerfiles_indexed, 1);

    let index = open_index(Path::new(&storage)).unwrap();
    assert_eq!(index.get("someone/blank/dockerfile").unwrap(), None);
    assert_eq!(
        index.get("someone/entity/dockerfile").unwrap(),
        Some("FROM\u{a0}ubuntu".to_string())
    );

    let stats = report.index.expect("Index statistics missing");
    assert_eq!(stats.images_without_dockerfile, 1);
}

#[tokio::test]
async fn test_missing_seed_file_is_fatal() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server, &dir, &["ffmpeg"]);
    config.seeds.path = dir.path().join("nope.json").display().to_string();

    let result = run_crawl(config).await;
    assert!(matches!(result, Err(IndexerError::Seed(_))));

    server.verify().await;
}

#[tokio::test]
async fn test_cached_responses_are_not_fetched_again() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_search(
        &server,
        "ffmpeg",
        serde_json::json!({
            "num_pages": 2,
            "results": [{"name": "bfirsh/ffmpeg", "description": "ffmpeg in a box"}]
        }),
    )
    .await;
    mount_dockerfile(
        &server,
        "bfirsh/ffmpeg",
        serde_json::json!({"contents": "FROM ubuntu"}),
    )
    .await;

    let cache = CacheConfig {
        enabled: true,
        dir: dir.path().join("cache").display().to_string(),
    };

    let mut config = create_test_config(&server, &dir, &["ffmpeg"]);
    config.cache = cache.clone();
    config.storage.path = dir.path().join("first").display().to_string();
    run_crawl(config).await.expect("First crawl failed");

    let first_requests = server.received_requests().await.unwrap().len();
    assert_eq!(first_requests, 3);

    // A fresh index, but the same cache
    let mut config = create_test_config(&server, &dir, &["ffmpeg"]);
    config.cache = cache;
    config.storage.path = dir.path().join("second").display().to_string();
    let storage = config.storage.path.clone();
    let report = run_crawl(config).await.expect("Second crawl failed");

    assert_eq!(server.received_requests().await.unwrap().len(), first_requests);
    assert_eq!(report.counters.dockerfiles_indexed, 1);

    let index = open_index(Path::new(&storage)).unwrap();
    assert_eq!(
        index.get("bfirsh/ffmpeg/dockerfile").unwrap(),
        Some("FROM ubuntu".to_string())
    );
}
