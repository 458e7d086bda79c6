use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::source::{SourceId, SourceRegistry};

use super::article::DownstreamRecord;
use super::extractor;
use super::publisher::Publisher;
use super::sink::TableSink;

const INBOUND_CAPACITY: usize = 100;
const RECV_POLL_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_EXTRACTOR_CONCURRENCY: usize = 3;

/// One novelty notification: a single article URL discovered by a poller,
/// to be fetched, parsed, and published.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub source_id: SourceId,
    pub name: String,
    pub url: String,
}

/// Handle held by callers (the engine's pollers) to submit extraction jobs.
/// Cheap to clone; backed by an mpsc sender.
#[derive(Clone)]
pub struct ExtractionClient {
    requests: mpsc::Sender<ExtractionRequest>,
}

impl ExtractionClient {
    /// Best-effort, non-blocking submission. A full inbound queue means the
    /// worker pool is saturated; the request is dropped rather than
    /// blocking the calling poller.
    pub fn submit(&self, request: ExtractionRequest) -> bool {
        self.requests.try_send(request).is_ok()
    }
}

/// The dispatcher runs on its own dedicated OS thread, like the cache
/// service, with its own single-threaded Tokio runtime driving a bounded
/// worker pool underneath.
pub struct ExtractionDispatcherHandle {
    thread: Option<std::thread::JoinHandle<()>>,
    cancel: CancellationToken,
}

impl ExtractionDispatcherHandle {
    pub fn spawn(
        registry: Arc<SourceRegistry>,
        http: reqwest::Client,
        publisher: Publisher,
        sink: Option<TableSink>,
        worker_count: usize,
    ) -> (Self, ExtractionClient) {
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let worker_count = if worker_count == 0 {
            DEFAULT_EXTRACTOR_CONCURRENCY
        } else {
            worker_count
        };

        let thread = std::thread::Builder::new()
            .name("extraction-dispatcher".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("build extraction dispatcher runtime");
                runtime.block_on(run(rx, worker_cancel, registry, http, publisher, sink, worker_count));
            })
            .expect("spawn extraction dispatcher thread");

        (
            Self {
                thread: Some(thread),
                cancel,
            },
            ExtractionClient { requests: tx },
        )
    }

    /// Cancel the dispatcher and wait for in-flight jobs to drain before
    /// the underlying thread joins.
    pub fn stop(mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

async fn run(
    mut requests: mpsc::Receiver<ExtractionRequest>,
    cancel: CancellationToken,
    registry: Arc<SourceRegistry>,
    http: reqwest::Client,
    publisher: Publisher,
    sink: Option<TableSink>,
    worker_count: usize,
) {
    let gate = Arc::new(Semaphore::new(worker_count));
    let publisher = Arc::new(publisher);
    let sink = sink.map(Arc::new);
    let mut jobs = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = tokio::time::timeout(RECV_POLL_TIMEOUT, requests.recv()) => {
                match received {
                    Ok(Some(request)) => {
                        let Some(source) = registry.get(&request.source_id).cloned() else {
                            tracing::warn!(source_id = %request.source_id, "extraction request for unknown source, discarding");
                            continue;
                        };
                        let permit = gate.clone().acquire_owned().await.expect("semaphore never closed");
                        let http = http.clone();
                        let publisher = publisher.clone();
                        let sink = sink.clone();
                        jobs.spawn(async move {
                            let _permit = permit;
                            run_job(http, publisher, sink, request, source.canonical_domain).await;
                        });
                    }
                    Ok(None) => break,
                    Err(_) => {}
                }
            }
            Some(_) = jobs.join_next(), if !jobs.is_empty() => {}
        }
    }

    while jobs.join_next().await.is_some() {}

    // Every in-flight job has completed and dropped its `Arc<Publisher>`
    // clone, so the dispatcher holds the only remaining reference: drain,
    // flush, and join the publisher pool's own threads before this
    // dedicated OS thread (and its runtime) tears down, per the shutdown
    // sequence in 4.4.1.
    match Arc::try_unwrap(publisher) {
        Ok(publisher) => publisher.shutdown(),
        Err(_) => tracing::warn!("publisher still had outstanding references at shutdown"),
    }
}

async fn run_job(
    http: reqwest::Client,
    publisher: Arc<Publisher>,
    sink: Option<Arc<TableSink>>,
    request: ExtractionRequest,
    canonical_domain: String,
) {
    let article = match extractor::extract(&http, &request.url, &request.name, &canonical_domain).await {
        Ok(article) => article,
        Err(err) => {
            tracing::warn!(url = %request.url, error = %err, "article extraction failed");
            return;
        }
    };

    publish_or_fallback(&publisher, sink.as_deref(), article.into_downstream_record()).await;
}

/// Publish `record` downstream; on rejection (FIFO full or fallback mode),
/// fall back to the durable table sink. Split out from `run_job` so this
/// half of scenario S4 — the publish-failure path — is exercisable without
/// a real HTTP fetch.
async fn publish_or_fallback(publisher: &Publisher, sink: Option<&TableSink>, record: DownstreamRecord) {
    if publisher.publish(&record.id, &record) {
        return;
    }

    tracing::warn!(id = %record.id, "publish failed, falling back to table sink");
    match sink {
        Some(sink) => {
            if let Err(err) = sink.append(&record).await {
                tracing::error!(id = %record.id, error = %err, "table sink append failed, record lost");
            }
        }
        None => tracing::error!(id = %record.id, "no table sink configured, record lost"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;
    use std::time::Instant;

    fn record() -> DownstreamRecord {
        DownstreamRecord {
            id: "11111111-1111-1111-1111-111111111111".to_string(),
            title: "Title".to_string(),
            author: "NULL".to_string(),
            publication_date: "NULL".to_string(),
            source: "Example".to_string(),
            url: "https://example.com/a".to_string(),
            summary: "NULL".to_string(),
            content: "NULL".to_string(),
            tags: "NULL".to_string(),
            categories: "NULL".to_string(),
            images: "NULL".to_string(),
        }
    }

    /// Scenario S4: the publisher pool is in fallback mode, so the job
    /// writes exactly one row to the table sink instead of publishing.
    #[tokio::test]
    async fn publish_failure_falls_back_to_table_sink() {
        let publisher = Publisher::always_fallback_for_test();
        let sink = TableSink::connect(":memory:").await.unwrap();

        publish_or_fallback(&publisher, Some(&sink), record()).await;

        assert_eq!(sink.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn publish_failure_without_sink_is_dropped_without_panicking() {
        let publisher = Publisher::always_fallback_for_test();
        publish_or_fallback(&publisher, None, record()).await;
    }

    /// The C4 dispatch loop discards an extraction request whose
    /// `source_id` is not in the read-only source registry, rather than
    /// spawning a job or crashing.
    #[tokio::test]
    async fn dispatcher_discards_requests_for_unknown_source() {
        let registry = Arc::new(SourceRegistry::from_iter(Vec::<Source>::new()).unwrap());
        let (dispatcher, client) = ExtractionDispatcherHandle::spawn(
            registry,
            reqwest::Client::new(),
            Publisher::always_fallback_for_test(),
            None,
            1,
        );

        assert!(client.submit(ExtractionRequest {
            source_id: "missing".to_string(),
            name: "Missing".to_string(),
            url: "https://example.com/a".to_string(),
        }));

        // Give the dispatch loop a cycle to observe and discard the
        // request before shutting down.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let start = Instant::now();
        dispatcher.stop();
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "dispatcher.stop() should return promptly, the unknown source must not spawn a hanging job"
        );
    }
}
