//! End-to-end exercise of the Feed Scheduler (C3) wired to real C1/C4
//! handles, covering the cancellation-within-deadline guarantee: many
//! pollers running concurrently must all exit promptly once the engine is
//! asked to stop, without the process hanging or panicking.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pulsebee_engine::cache::CacheHandle;
use pulsebee_engine::engine::{Engine, SchedulerConfig};
use pulsebee_engine::extraction::{ExtractionDispatcherHandle, Publisher, PublisherConfig};
use pulsebee_engine::pool::{ConnectionPool, PoolConfig};
use pulsebee_engine::source::{Source, SourceRegistry};

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EMPTY_FEED_XML: &str = r#"<?xml version="1.0"?>
    <rss version="2.0"><channel>
        <title>Empty feed</title>
        <link>https://example.com</link>
        <description>No entries, nothing to extract.</description>
    </channel></rss>"#;

fn pool_config() -> PoolConfig {
    PoolConfig {
        max_pool_size: 32,
        max_concurrent_users: 16,
        connection_timeout: Duration::from_secs(10),
    }
}

fn fallback_publisher() -> Publisher {
    // An address nothing is listening on; rdkafka's BaseProducer
    // construction does not dial synchronously, so this does not block the
    // test, but nothing ever actually delivers, which is fine since this
    // feed has no entries and will never attempt to publish.
    Publisher::new(PublisherConfig {
        bootstrap_servers: "127.0.0.1:1".to_string(),
        topic: "articles".to_string(),
        client_id_prefix: "engine-lifecycle-test".to_string(),
        auth: None,
        worker_count: 1,
    })
}

#[tokio::test]
async fn many_pollers_cancel_within_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_FEED_XML))
        .mount(&server)
        .await;

    const SOURCE_COUNT: usize = 10;
    let sources: Vec<Source> = (0..SOURCE_COUNT)
        .map(|i| Source {
            id: format!("source-{i}"),
            name: format!("Source {i}"),
            canonical_domain: "example.com".to_string(),
            rss_url: format!("{}/feed.xml", server.uri()),
            categories: BTreeSet::new(),
            selectors: None,
        })
        .collect();
    let registry = Arc::new(SourceRegistry::from_iter(sources).unwrap());

    let (cache_handle, cache_client) = CacheHandle::spawn(1_000, Duration::from_secs(60));
    let (dispatcher, extraction_client) = ExtractionDispatcherHandle::spawn(
        registry.clone(),
        reqwest::Client::new(),
        fallback_publisher(),
        None,
        2,
    );

    let cache_pool = ConnectionPool::new(pool_config(), move || cache_client.clone());
    let extraction_pool = ConnectionPool::new(pool_config(), move || extraction_client.clone());

    let mut engine = Engine::new(
        reqwest::Client::new(),
        cache_pool,
        extraction_pool,
        SchedulerConfig {
            feed_min_refresh_interval: Duration::from_secs(10),
            feed_refresh_buffer: Duration::from_secs(5),
        },
    );
    engine.start(&registry);
    assert_eq!(engine.poller_count(), SOURCE_COUNT);

    // Give every poller time to complete its first fetch cycle and settle
    // into its inter-cycle sleep, the state cancellation must interrupt.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let start = Instant::now();
    engine.stop(Duration::from_secs(15)).await;
    let elapsed = start.elapsed();

    assert_eq!(engine.poller_count(), 0);
    assert!(
        elapsed < Duration::from_secs(15),
        "engine.stop() took {elapsed:?}, expected well under the 15s deadline"
    );

    dispatcher.stop();
    cache_handle.stop();
}
