use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use crate::cache::{CacheClient, CacheError};
use crate::source::Source;

use super::parser::{self, ParseError};
use super::types::{FeedSnapshot, FeedState, FeedView};

/// Bound on a feed response body, mirroring the teacher's streaming
/// size-check on article fetches — a misbehaving or malicious feed should
/// not be able to force unbounded memory growth.
const MAX_FEED_BYTES: usize = 10 * 1024 * 1024;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error fetching feed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("feed endpoint returned HTTP {0}")]
    HttpStatus(u16),
    #[error("feed response exceeded {MAX_FEED_BYTES} bytes")]
    ResponseTooLarge,
    #[error("malformed feed XML: {0}")]
    Parse(#[from] ParseError),
    #[error("cache service unavailable")]
    CacheUnavailable,
}

impl From<CacheError> for FetchError {
    fn from(_: CacheError) -> Self {
        FetchError::CacheUnavailable
    }
}

/// Owns the fetch/parse/novelty logic for one source.
///
/// Does not own a cache-service endpoint: one is supplied by the caller for
/// each cycle, breaking the FeedReader↔Engine coupling a back-reference
/// would otherwise create.
pub struct FeedReader {
    source: Source,
    state: FeedState,
    last_snapshot: FeedSnapshot,
    min_refresh_interval: Duration,
}

impl FeedReader {
    pub fn new(source: Source, min_refresh_interval: Duration) -> Self {
        Self {
            source,
            state: FeedState::default(),
            last_snapshot: FeedSnapshot::default(),
            min_refresh_interval,
        }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    /// Side-effecting: GET the feed, parse it, and update novelty state
    /// against the supplied cache endpoint.
    pub async fn fetch_feed(
        &mut self,
        http: &reqwest::Client,
        cache: &CacheClient,
    ) -> Result<(), FetchError> {
        let response = http
            .get(&self.source.rss_url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        if let Some(len) = response.content_length() {
            if len as usize > MAX_FEED_BYTES {
                return Err(FetchError::ResponseTooLarge);
            }
        }
        let bytes = response.bytes().await?;
        if bytes.len() > MAX_FEED_BYTES {
            return Err(FetchError::ResponseTooLarge);
        }

        let snapshot = parser::parse_feed(&bytes)?;

        if let Some(first) = snapshot.first_entry() {
            let fp = parser::fingerprint(first);
            let cached = cache.get(&fp).await?;
            let is_novel =
                cached.is_none() && self.state.last_entry_fingerprint.as_deref() != Some(&fp);
            if is_novel {
                // Same critical section: set the flag and update the
                // fingerprint together, then commit to the shared cache.
                self.state.has_new_since_last_read = true;
                self.state.last_entry_fingerprint = Some(fp.clone());
                cache.set(fp, Utc::now().to_rfc3339()).await?;
            }
        }

        self.state.last_refresh_at = Some(Utc::now());
        if let Some(updated) = parser::resolve_last_updated(&snapshot) {
            self.state.last_updated_at = Some(updated);
        }
        self.last_snapshot = snapshot;
        Ok(())
    }

    /// Externally visible: fetch if stale, then atomically return a
    /// snapshot and clear the one-shot novelty flag.
    pub async fn get_feed(
        &mut self,
        http: &reqwest::Client,
        cache: &CacheClient,
    ) -> Result<FeedView, FetchError> {
        let is_stale = match self.state.last_refresh_at {
            None => true,
            Some(last_refresh_at) => {
                Utc::now().signed_duration_since(last_refresh_at)
                    >= chrono::Duration::from_std(self.min_refresh_interval)
                        .unwrap_or(chrono::Duration::zero())
            }
        };

        if is_stale {
            self.fetch_feed(http, cache).await?;
        }

        let has_new_since_last_read = self.state.has_new_since_last_read;
        self.state.has_new_since_last_read = false;

        Ok(FeedView {
            source: self.source.clone(),
            last_updated_at: self.state.last_updated_at,
            last_refresh_at: self.state.last_refresh_at,
            feed: self.last_snapshot.clone(),
            has_new_since_last_read,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(rss_url: String) -> Source {
        Source {
            id: "s1".to_string(),
            name: "Example".to_string(),
            canonical_domain: "example.com".to_string(),
            rss_url,
            categories: BTreeSet::new(),
            selectors: None,
        }
    }

    const FEED_XML: &str = r#"<?xml version="1.0"?>
        <rss version="2.0"><channel>
            <title>Example</title>
            <item><title>T</title><link>https://x/a</link><description>s</description></item>
        </channel></rss>"#;

    #[tokio::test]
    async fn first_fetch_is_novel_second_within_interval_is_not() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED_XML))
            .mount(&server)
            .await;

        let (cache_handle, cache_client) =
            crate::cache::CacheHandle::spawn(10, Duration::from_secs(60));
        let http = reqwest::Client::new();
        let mut reader = FeedReader::new(
            source(format!("{}/feed.xml", server.uri())),
            Duration::from_secs(3600),
        );

        let first = reader.get_feed(&http, &cache_client).await.unwrap();
        assert!(first.has_new_since_last_read);

        let second = reader.get_feed(&http, &cache_client).await.unwrap();
        assert!(!second.has_new_since_last_read, "no fetch within min interval");

        cache_handle.stop();
    }

    #[tokio::test]
    async fn malformed_feed_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not xml"))
            .mount(&server)
            .await;

        let (cache_handle, cache_client) =
            crate::cache::CacheHandle::spawn(10, Duration::from_secs(60));
        let http = reqwest::Client::new();
        let mut reader = FeedReader::new(
            source(format!("{}/feed.xml", server.uri())),
            Duration::from_secs(3600),
        );

        let result = reader.fetch_feed(&http, &cache_client).await;
        assert!(matches!(result, Err(FetchError::Parse(_))));
        cache_handle.stop();
    }

    #[tokio::test]
    async fn http_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (cache_handle, cache_client) =
            crate::cache::CacheHandle::spawn(10, Duration::from_secs(60));
        let http = reqwest::Client::new();
        let mut reader = FeedReader::new(
            source(format!("{}/feed.xml", server.uri())),
            Duration::from_secs(3600),
        );

        let result = reader.fetch_feed(&http, &cache_client).await;
        assert!(matches!(result, Err(FetchError::HttpStatus(500))));
        cache_handle.stop();
    }
}
