use chrono::{DateTime, Utc};

use crate::source::Source;

/// One entry in a parsed feed document.
#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub link: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    /// Raw textual form of `published`/`updated`, kept alongside the
    /// already-parsed `chrono` values so the candidate-field text fallback
    /// described for feed-level timestamps is exercisable even when
    /// `feed-rs` successfully parsed the field itself.
    pub published_raw: Option<String>,
    pub updated_raw: Option<String>,
}

/// The parsed result of one feed fetch.
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    /// The feed's own `ttl` hint, in minutes, if declared.
    pub ttl_minutes: Option<i64>,
    pub feed_updated: Option<DateTime<Utc>>,
    pub feed_updated_raw: Option<String>,
    pub feed_published: Option<DateTime<Utc>>,
    pub feed_published_raw: Option<String>,
    pub entries: Vec<FeedEntry>,
}

impl FeedSnapshot {
    pub fn first_entry(&self) -> Option<&FeedEntry> {
        self.entries.first()
    }
}

/// Per-source state owned by its poller. Not shared across tasks: only the
/// owning poller reads and clears `has_new_since_last_read`.
#[derive(Debug, Clone, Default)]
pub struct FeedState {
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub last_entry_fingerprint: Option<String>,
    pub has_new_since_last_read: bool,
}

/// An immutable snapshot handed back by `FeedReader::get_feed`.
#[derive(Debug, Clone)]
pub struct FeedView {
    pub source: Source,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub feed: FeedSnapshot,
    pub has_new_since_last_read: bool,
}
