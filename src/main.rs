use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use pulsebee_engine::cache::{self, CacheHandle};
use pulsebee_engine::config::EngineConfig;
use pulsebee_engine::engine::{Engine, SchedulerConfig};
use pulsebee_engine::extraction::{ExtractionDispatcherHandle, Publisher, TableSink};
use pulsebee_engine::pool::{ConnectionPool, PoolConfig};
use pulsebee_engine::source;

const CACHE_TTL: Duration = Duration::from_secs(cache::TTL_SECONDS);
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(15);

#[derive(Parser, Debug)]
#[command(name = "pulsebee-engine", about = "Adaptive-cadence RSS/Atom ingestion engine")]
struct Args {
    /// Path to a JSON source registry file (array of `{_id,title,domain,rss,channels,xpaths?}`).
    #[arg(long, value_name = "FILE")]
    sources: PathBuf,

    /// Log verbosity, forwarded to `tracing_subscriber`'s env filter when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let config = EngineConfig::from_env().context("loading configuration from environment")?;
    tracing::info!(?config, "configuration loaded");

    let registry = Arc::new(
        source::load_json(&args.sources)
            .with_context(|| format!("loading source registry from {}", args.sources.display()))?,
    );
    tracing::info!(sources = registry.len(), "source registry loaded");

    let (cache_handle, cache_client) = CacheHandle::spawn(cache::CAPACITY, CACHE_TTL);

    let publisher = Publisher::new(config.publisher_config());
    if publisher.is_fallback_mode() {
        tracing::warn!("publisher entered fallback mode at startup, all records will go to the table sink");
    }
    let sink = match TableSink::connect(&config.table_sink_path).await {
        Ok(sink) => Some(sink),
        Err(err) => {
            tracing::error!(error = %err, "failed to open table sink, publish failures will be unrecoverable");
            None
        }
    };

    let http = reqwest::Client::new();

    let (extraction_dispatcher, extraction_client) = ExtractionDispatcherHandle::spawn(
        registry.clone(),
        http.clone(),
        publisher,
        sink,
        config.extractor_concurrency,
    );

    let cache_pool = ConnectionPool::new(
        PoolConfig {
            max_pool_size: 32,
            max_concurrent_users: 16,
            connection_timeout: Duration::from_secs(10),
        },
        move || cache_client.clone(),
    );
    let extraction_pool = ConnectionPool::new(
        PoolConfig {
            max_pool_size: 32,
            max_concurrent_users: 16,
            connection_timeout: Duration::from_secs(10),
        },
        move || extraction_client.clone(),
    );

    let mut engine = Engine::new(
        http,
        cache_pool,
        extraction_pool,
        SchedulerConfig {
            feed_min_refresh_interval: config.feed_min_refresh_interval,
            feed_refresh_buffer: config.feed_refresh_buffer,
        },
    );
    engine.start(&registry);
    tracing::info!(pollers = engine.poller_count(), "engine started");

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining");

    engine.stop(SHUTDOWN_DEADLINE).await;
    extraction_dispatcher.stop();
    cache_handle.stop();

    tracing::info!("shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
