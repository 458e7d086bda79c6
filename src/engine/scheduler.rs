use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheClient;
use crate::extraction::{ExtractionClient, ExtractionRequest};
use crate::feed::FeedReader;
use crate::pool::{ConnectionPool, PoolError};

const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(5);
const POOL_EXHAUSTION_BACKOFF_CAP: f64 = 300.0;
const CYCLE_ERROR_BACKOFF_CAP: f64 = 600.0;

/// Tunables shared by every poller, read once at engine construction.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub feed_min_refresh_interval: Duration,
    pub feed_refresh_buffer: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            feed_min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            feed_refresh_buffer: DEFAULT_REFRESH_BUFFER,
        }
    }
}

/// One source's cooperative poller loop. Runs until `cancel` fires.
pub async fn poller_loop(
    mut reader: FeedReader,
    source_id: String,
    http: reqwest::Client,
    cache_pool: ConnectionPool<CacheClient>,
    extraction_pool: ConnectionPool<ExtractionClient>,
    config: SchedulerConfig,
    cancel: CancellationToken,
) {
    let mut refresh_time = config.feed_min_refresh_interval.as_secs_f64();

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let cycle = tokio::select! {
            _ = cancel.cancelled() => break,
            result = run_cycle(&mut reader, &source_id, &http, &cache_pool, &extraction_pool, config, refresh_time) => result,
        };

        refresh_time = match cycle {
            CycleOutcome::PoolExhausted => (refresh_time * 1.5).min(POOL_EXHAUSTION_BACKOFF_CAP),
            CycleOutcome::Error => (refresh_time * 2.0).min(CYCLE_ERROR_BACKOFF_CAP),
            CycleOutcome::Completed { next_refresh_time } => next_refresh_time,
        };

        let jitter = rand::thread_rng().gen_range(0.0..(refresh_time * 0.1).max(f64::EPSILON));
        let sleep_secs = (refresh_time + jitter).max(10.0);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs_f64(sleep_secs)) => {}
        }
    }
}

enum CycleOutcome {
    PoolExhausted,
    Error,
    Completed { next_refresh_time: f64 },
}

async fn run_cycle(
    reader: &mut FeedReader,
    source_id: &str,
    http: &reqwest::Client,
    cache_pool: &ConnectionPool<CacheClient>,
    extraction_pool: &ConnectionPool<ExtractionClient>,
    config: SchedulerConfig,
    refresh_time: f64,
) -> CycleOutcome {
    let cache_handle = match cache_pool.get().await {
        Ok(handle) => handle,
        Err(PoolError::PoolExhausted) => return CycleOutcome::PoolExhausted,
    };
    let extraction_handle = match extraction_pool.get().await {
        Ok(handle) => handle,
        Err(PoolError::PoolExhausted) => return CycleOutcome::PoolExhausted,
    };

    let view = match reader.get_feed(http, &cache_handle).await {
        Ok(view) => view,
        Err(err) => {
            tracing::warn!(source = source_id, error = %err, "feed fetch failed");
            return CycleOutcome::Error;
        }
    };

    let next_refresh_time = compute_next_refresh_time(
        view.feed.ttl_minutes,
        view.last_updated_at,
        chrono::Utc::now(),
        config.feed_refresh_buffer,
        refresh_time,
    );

    if view.has_new_since_last_read {
        if let Some(entry) = view.feed.first_entry() {
            if let Some(link) = &entry.link {
                let request = ExtractionRequest {
                    source_id: source_id.to_string(),
                    name: view.source.name.clone(),
                    url: link.clone(),
                };
                if !extraction_handle.submit(request) {
                    tracing::warn!(source = source_id, "extraction push failed, will re-observe novelty next cycle");
                }
            }
        }
    }

    CycleOutcome::Completed { next_refresh_time }
}

/// Adaptive-interval computation (§4.3 step 4), pulled out as a pure
/// function of its inputs so the phase-alignment arithmetic is directly
/// testable against scenario S2 without a real clock or feed fetch.
///
/// If the feed declares no `ttl`, the previous `refresh_time` is kept
/// unchanged. Otherwise the next interval is the feed's own `ttl` (in
/// seconds), phase-aligned to `last_updated_at` when known by subtracting
/// `elapsed mod ttl`, plus the refresh buffer.
fn compute_next_refresh_time(
    ttl_minutes: Option<i64>,
    last_updated_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    buffer: Duration,
    previous_refresh_time: f64,
) -> f64 {
    let Some(ttl_minutes) = ttl_minutes else {
        return previous_refresh_time;
    };
    let base = (ttl_minutes as f64) * 60.0;
    let aligned = match last_updated_at {
        Some(last_updated_at) => {
            let elapsed = (now - last_updated_at)
                .to_std()
                .unwrap_or(Duration::ZERO)
                .as_secs_f64();
            base - (elapsed % base)
        }
        None => base,
    };
    aligned + buffer.as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn no_ttl_keeps_previous_refresh_time() {
        let next = compute_next_refresh_time(None, None, Utc::now(), Duration::from_secs(5), 42.0);
        assert_eq!(next, 42.0);
    }

    #[test]
    fn ttl_without_last_updated_uses_ttl_plus_buffer() {
        let next = compute_next_refresh_time(Some(15), None, Utc::now(), Duration::from_secs(5), 10.0);
        assert_eq!(next, 15.0 * 60.0 + 5.0);
    }

    /// Scenario S2: ttl=15, last_updated_at=12:00:00Z, now=12:07:00Z,
    /// buffer=5s ⇒ next = 15·60 − (7·60 mod 900) + 5 = 485s.
    #[test]
    fn scenario_s2_interval_adaptation() {
        let last_updated_at = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 7, 0).unwrap();
        let next = compute_next_refresh_time(
            Some(15),
            Some(last_updated_at),
            now,
            Duration::from_secs(5),
            10.0,
        );
        assert_eq!(next, 485.0);
    }

    #[test]
    fn phase_alignment_wraps_across_multiple_ttl_periods() {
        let last_updated_at = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        // 37 minutes elapsed against a 15-minute ttl: 37 mod 15 = 7 minutes
        // into the current period, so the same 8-minutes-remaining math as
        // scenario S2 applies regardless of how many full periods elapsed.
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 37, 0).unwrap();
        let next = compute_next_refresh_time(
            Some(15),
            Some(last_updated_at),
            now,
            Duration::from_secs(5),
            10.0,
        );
        assert_eq!(next, 485.0);
    }
}
