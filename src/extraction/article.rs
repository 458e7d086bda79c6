use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// The sentinel downstream consumers see in place of an empty collection or
/// a null scalar. The source formats `publication_date` as RFC-3339 before
/// branching on type; this crate instead treats "no publication date" as
/// this sentinel directly and never emits a `"None"`-shaped string.
const NULL_SENTINEL: &str = "NULL";

/// One extracted article, before normalization for transport.
#[derive(Debug, Clone)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub authors: Vec<String>,
    pub publication_date: Option<DateTime<Utc>>,
    pub source: String,
    pub url: String,
    pub summary: String,
    pub content: String,
    pub tags: BTreeSet<String>,
    pub categories: BTreeSet<String>,
    pub images: BTreeSet<String>,
}

/// The downstream wire shape published to the message bus and/or appended
/// to the table sink. Every field is a string; collections are joined with
/// `" ,"` and empty/null values become `"NULL"`.
#[derive(Debug, Clone, Serialize)]
pub struct DownstreamRecord {
    pub id: String,
    pub title: String,
    pub author: String,
    pub publication_date: String,
    pub source: String,
    pub url: String,
    pub summary: String,
    pub content: String,
    pub tags: String,
    pub categories: String,
    pub images: String,
}

fn join_or_null<'a>(items: impl Iterator<Item = &'a String>) -> String {
    let joined = items.cloned().collect::<Vec<_>>().join(" ,");
    if joined.is_empty() {
        NULL_SENTINEL.to_string()
    } else {
        joined
    }
}

fn string_or_null(value: &str) -> String {
    if value.is_empty() {
        NULL_SENTINEL.to_string()
    } else {
        value.to_string()
    }
}

/// The downstream wire format for `publication_date`: always-present
/// 6-digit microseconds and a non-colon-separated UTC offset, e.g.
/// `"1970-01-01T00:00:00.000000+0000"`. `chrono::DateTime::to_rfc3339`
/// omits fractional seconds when zero and colon-separates the offset, so
/// this format string is spelled out explicitly rather than relying on it.
const PUBLICATION_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f%z";

impl Article {
    /// Normalize this article for transport: stringify the id, replace the
    /// source object with its name, format the publication date in the
    /// documented wire format, and substitute `"NULL"` for empty/null
    /// fields.
    pub fn into_downstream_record(self) -> DownstreamRecord {
        DownstreamRecord {
            id: self.id.to_string(),
            title: self.title,
            author: join_or_null(self.authors.iter()),
            publication_date: self
                .publication_date
                .map(|dt| dt.format(PUBLICATION_DATE_FORMAT).to_string())
                .unwrap_or_else(|| NULL_SENTINEL.to_string()),
            source: self.source,
            url: self.url,
            summary: string_or_null(&self.summary),
            content: string_or_null(&self.content),
            tags: join_or_null(self.tags.iter()),
            // The source always emits "NULL" for categories regardless of
            // content — a quirk of its downstream serialization this crate
            // preserves rather than "fixes," per the wire contract in §6.
            categories: NULL_SENTINEL.to_string(),
            images: join_or_null(self.images.iter()),
        }
    }
}
