use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::TtlMap;

/// Mirrors the source's `{action:"get"|"set", ...}` request shape as a typed,
/// two-arm union rather than a message the handler introspects at runtime.
enum CacheRequest {
    Get {
        key: String,
        reply: oneshot::Sender<Option<String>>,
    },
    Set {
        key: String,
        value: String,
        reply: oneshot::Sender<Result<(), CacheError>>,
    },
}

/// Errors a caller of the cache service can observe.
#[derive(Debug, Error, Clone)]
pub enum CacheError {
    /// The reply never arrived — the service's inbound channel is closed or
    /// the reply was dropped. Callers should fail closed: treat the cycle as
    /// producing no novelty.
    #[error("cache service unavailable")]
    Unavailable,
}

/// A cheap-to-clone handle to the Dedup Cache Service's inbound endpoint.
///
/// This is the "socket" a [`crate::pool::ConnectionPool`] hands out for the
/// cache service's request/reply endpoint: cloning it is free (it is just
/// another sender onto the same bounded channel), and every clone observes
/// the single consumer loop's sequential handling of requests.
#[derive(Clone)]
pub struct CacheClient {
    requests: mpsc::Sender<CacheRequest>,
}

impl CacheClient {
    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let (reply, recv) = oneshot::channel();
        self.requests
            .send(CacheRequest::Get {
                key: key.to_string(),
                reply,
            })
            .await
            .map_err(|_| CacheError::Unavailable)?;
        recv.await.map_err(|_| CacheError::Unavailable)
    }

    pub async fn set(&self, key: String, value: String) -> Result<(), CacheError> {
        let (reply, recv) = oneshot::channel();
        self.requests
            .send(CacheRequest::Set { key, value, reply })
            .await
            .map_err(|_| CacheError::Unavailable)?;
        recv.await.map_err(|_| CacheError::Unavailable)?
    }
}

/// A running cache service: the join handle for its dedicated OS thread plus
/// the cancellation token used to ask it to stop.
pub struct CacheHandle {
    thread: Option<std::thread::JoinHandle<()>>,
    cancel: CancellationToken,
}

impl CacheHandle {
    /// Spawn the Dedup Cache Service on its own OS thread, running a
    /// dedicated single-threaded Tokio runtime — the direct translation of
    /// "C1 ... [is a] separate OS thread" with "a single consumer loop."
    ///
    /// Returns the handle used for shutdown and a [`CacheClient`] for the
    /// first caller (further clients are produced by cloning that client, or
    /// by a [`crate::pool::ConnectionPool`] built over it).
    pub fn spawn(capacity: usize, ttl: Duration) -> (Self, CacheClient) {
        let (tx, rx) = mpsc::channel(1_000);
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();

        let thread = std::thread::Builder::new()
            .name("cache-service".into())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("cache service runtime");
                runtime.block_on(run(rx, TtlMap::new(capacity, ttl), worker_cancel));
            })
            .expect("spawn cache-service thread");

        (
            Self {
                thread: Some(thread),
                cancel,
            },
            CacheClient { requests: tx },
        )
    }

    /// Signal shutdown and join the service thread. The endpoint is closed
    /// with zero linger: once the cancellation is observed, the service
    /// stops polling its channel immediately.
    pub fn stop(mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

async fn run(mut requests: mpsc::Receiver<CacheRequest>, mut map: TtlMap, cancel: CancellationToken) {
    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => break,
            // A short poll timeout so the cancellation token is observed
            // promptly even with no traffic, matching "polls its inbound
            // endpoint with a short timeout."
            request = tokio::time::timeout(Duration::from_secs(1), requests.recv()) => {
                match request {
                    Ok(Some(request)) => request,
                    Ok(None) => break,
                    Err(_elapsed) => continue,
                }
            }
        };

        // Exactly one in-flight request at a time: the match arms below run
        // to completion before the next iteration, so the map never needs
        // its own lock.
        match request {
            CacheRequest::Get { key, reply } => {
                let value = map.get(&key).map(str::to_string);
                let _ = reply.send(value);
            }
            CacheRequest::Set { key, value, reply } => {
                map.set(key, value);
                let _ = reply.send(Ok(()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_on_empty_cache_returns_none() {
        let (handle, client) = CacheHandle::spawn(10, Duration::from_secs(60));
        assert_eq!(client.get("missing").await.unwrap(), None);
        handle.stop();
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let (handle, client) = CacheHandle::spawn(10, Duration::from_secs(60));
        client.set("k".to_string(), "v".to_string()).await.unwrap();
        assert_eq!(client.get("k").await.unwrap(), Some("v".to_string()));
        handle.stop();
    }

    #[tokio::test]
    async fn clients_can_be_cloned_and_share_state() {
        let (handle, client) = CacheHandle::spawn(10, Duration::from_secs(60));
        let other = client.clone();
        other.set("k".to_string(), "v".to_string()).await.unwrap();
        assert_eq!(client.get("k").await.unwrap(), Some("v".to_string()));
        handle.stop();
    }

    #[tokio::test]
    async fn requests_fail_closed_after_shutdown() {
        let (handle, client) = CacheHandle::spawn(10, Duration::from_secs(60));
        handle.stop();
        assert!(matches!(client.get("k").await, Err(CacheError::Unavailable)));
    }
}
