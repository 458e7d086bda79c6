//! Adaptive-cadence RSS/Atom ingestion engine.
//!
//! - [`cache`] — the Dedup Cache Service (C1): a TTL-bounded novelty map
//!   behind an actor-style request/reply endpoint.
//! - [`feed`] — the FeedReader (C2): fetch, parse, and novelty detection
//!   for one source's feed.
//! - [`engine`] — the Feed Scheduler (C3): one adaptive-cadence poller task
//!   per source.
//! - [`extraction`] — the Extraction Worker Pool (C4): article fetch/parse,
//!   downstream publication, and the durable table-sink fallback.
//! - [`pool`] — the generic bounded connection pool shared by C3 and C4.
//! - [`source`] — the immutable source registry.
//! - [`config`] — environment-driven process configuration.
//! - [`util`] — small cross-cutting helpers (SSRF-safe URL validation).

pub mod cache;
pub mod config;
pub mod engine;
pub mod extraction;
pub mod feed;
pub mod pool;
pub mod source;
pub mod util;
