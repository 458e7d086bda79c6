//! A small connection pool bounding how many endpoint handles of a given
//! type may exist and how many may be checked out at once (§4.4.2).
//!
//! Both the Feed Scheduler (C3) and the Extraction Worker Pool (C4) draw
//! IPC endpoints from a pool like this rather than creating one socket per
//! cycle — the pattern the design notes identify as the root cause of
//! descriptor exhaustion under a large source count. In this crate `T` is a
//! cheap-to-clone handle (an `mpsc::Sender` wrapper, see
//! [`crate::cache::CacheClient`]) rather than a literal OS socket, but the
//! pool still enforces the same two bounds and the same failure mode.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Error, Clone, Copy)]
pub enum PoolError {
    #[error("no pooled endpoint became available within the connection timeout")]
    PoolExhausted,
}

/// Bounds governing one [`ConnectionPool`].
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Total handles (idle + in-use) that may exist at once.
    pub max_pool_size: usize,
    /// Handles that may be checked out at once.
    pub max_concurrent_users: usize,
    pub connection_timeout: Duration,
}

struct Inner<T> {
    idle: Mutex<VecDeque<T>>,
    live_count: AtomicUsize,
    gate: Arc<Semaphore>,
    config: PoolConfig,
    factory: Box<dyn Fn() -> T + Send + Sync>,
}

pub struct ConnectionPool<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ConnectionPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> ConnectionPool<T> {
    pub fn new(config: PoolConfig, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                idle: Mutex::new(VecDeque::new()),
                live_count: AtomicUsize::new(0),
                gate: Arc::new(Semaphore::new(config.max_concurrent_users)),
                config,
                factory: Box::new(factory),
            }),
        }
    }

    /// Check out a handle, blocking up to `connection_timeout`. Prefers an
    /// idle handle already in the pool; otherwise creates a new one if the
    /// pool is under `max_pool_size`; otherwise fails with `PoolExhausted`.
    pub async fn get(&self) -> Result<PooledHandle<T>, PoolError> {
        let permit = tokio::time::timeout(
            self.inner.config.connection_timeout,
            self.inner.gate.clone().acquire_owned(),
        )
        .await
        .map_err(|_elapsed| PoolError::PoolExhausted)?
        .expect("pool semaphore is never closed");

        let value = {
            let mut idle = self.inner.idle.lock().expect("pool idle lock poisoned");
            if let Some(value) = idle.pop_front() {
                value
            } else if self.inner.live_count.fetch_add(1, Ordering::SeqCst)
                < self.inner.config.max_pool_size
            {
                (self.inner.factory)()
            } else {
                self.inner.live_count.fetch_sub(1, Ordering::SeqCst);
                return Err(PoolError::PoolExhausted);
            }
        };

        Ok(PooledHandle {
            value: Some(value),
            inner: self.inner.clone(),
            _permit: permit,
        })
    }

    /// Disconnect and close every handle, resetting counters. Any handles
    /// currently checked out are unaffected until they are returned.
    pub fn close_all(&self) {
        let mut idle = self.inner.idle.lock().expect("pool idle lock poisoned");
        let closed = idle.len();
        idle.clear();
        self.inner.live_count.fetch_sub(closed, Ordering::SeqCst);
    }

    pub fn idle_len(&self) -> usize {
        self.inner.idle.lock().expect("pool idle lock poisoned").len()
    }

    pub fn live_count(&self) -> usize {
        self.inner.live_count.load(Ordering::SeqCst)
    }
}

/// A checked-out handle. Deref to `T` to use it; dropping the guard — on
/// every exit path, including early return or task cancellation — returns
/// the handle to the pool and releases the concurrency permit.
pub struct PooledHandle<T> {
    value: Option<T>,
    inner: Arc<Inner<T>>,
    _permit: OwnedSemaphorePermit,
}

impl<T> std::ops::Deref for PooledHandle<T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.value.as_ref().expect("value present until drop")
    }
}

impl<T> Drop for PooledHandle<T> {
    fn drop(&mut self) {
        let Some(value) = self.value.take() else {
            return;
        };
        let mut idle = self.inner.idle.lock().expect("pool idle lock poisoned");
        idle.push_back(value);
        if idle.len() > self.inner.config.max_pool_size {
            idle.pop_front();
            self.inner.live_count.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
