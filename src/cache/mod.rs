//! The Dedup Cache Service (C1): an in-memory TTL map behind a request/reply
//! endpoint, answering `get`/`set` for feed-entry fingerprints.
//!
//! Runs on its own OS thread with a dedicated single-threaded Tokio runtime,
//! modeling the source's ZeroMQ REP socket as a bounded `mpsc` channel of
//! requests, each carrying a `oneshot` reply sender in place of a literal
//! socket round-trip.

mod service;
mod ttl_map;

pub use service::{CacheClient, CacheError, CacheHandle};
pub use ttl_map::TtlMap;

/// Entries live for 5 hours 10 minutes, matching the source's novelty window.
pub const TTL_SECONDS: u64 = 18_600;

/// Maximum distinct fingerprints held at once; oldest-by-insertion evicted first.
pub const CAPACITY: usize = 10_000;
