//! The Feed Scheduler (C3): one cooperative poller task per source, driving
//! a [`crate::feed::FeedReader`] on an adaptive cadence and pushing
//! extraction requests on novelty.

mod scheduler;

pub use scheduler::SchedulerConfig;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::cache::CacheClient;
use crate::extraction::ExtractionClient;
use crate::feed::FeedReader;
use crate::pool::ConnectionPool;
use crate::source::SourceRegistry;

struct PollerHandle {
    name: String,
    task: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Owns the lifecycle of every per-source poller. Closing the engine
/// cancels every poller and waits for them to exit before returning.
pub struct Engine {
    pollers: HashMap<String, PollerHandle>,
    http: reqwest::Client,
    cache_pool: ConnectionPool<CacheClient>,
    extraction_pool: ConnectionPool<ExtractionClient>,
    config: SchedulerConfig,
}

impl Engine {
    pub fn new(
        http: reqwest::Client,
        cache_pool: ConnectionPool<CacheClient>,
        extraction_pool: ConnectionPool<ExtractionClient>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            pollers: HashMap::new(),
            http,
            cache_pool,
            extraction_pool,
            config,
        }
    }

    /// Spawn one poller per source currently in `registry`.
    pub fn start(&mut self, registry: &Arc<SourceRegistry>) {
        for source in registry.iter() {
            self.spawn_poller(source.id.clone(), source.clone());
        }
    }

    fn spawn_poller(&mut self, source_id: String, source: crate::source::Source) {
        let name = source.name.clone();
        let reader = FeedReader::new(source, self.config.feed_min_refresh_interval);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let http = self.http.clone();
        let cache_pool = self.cache_pool.clone();
        let extraction_pool = self.extraction_pool.clone();
        let config = self.config;
        let span_source_id = source_id.clone();

        let task = tokio::spawn(
            async move {
                scheduler::poller_loop(
                    reader,
                    span_source_id.clone(),
                    http,
                    cache_pool,
                    extraction_pool,
                    config,
                    task_cancel,
                )
                .await;
            }
            .instrument(tracing::info_span!("poller", source = %source_id)),
        );

        self.pollers.insert(
            source_id,
            PollerHandle {
                name,
                task,
                cancel,
            },
        );
    }

    pub fn poller_count(&self) -> usize {
        self.pollers.len()
    }

    /// Cancel every poller and wait (up to `deadline`) for all of them to
    /// exit, per the shutdown bound in scenario S6.
    pub async fn stop(&mut self, deadline: Duration) {
        for poller in self.pollers.values() {
            poller.cancel.cancel();
        }
        let names: Vec<_> = self.pollers.values().map(|poller| poller.name.clone()).collect();
        let joins = self.pollers.drain().map(|(_, poller)| poller.task);

        let all = futures::future::join_all(joins);
        if tokio::time::timeout(deadline, all).await.is_err() {
            tracing::warn!(sources = ?names, "pollers did not exit within shutdown deadline");
        }
    }
}
