use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Opaque identifier for a [`Source`], stable for the lifetime of a run.
pub type SourceId = String;

/// Seven optional extraction expressions a source may supply in place of the
/// default newspaper-style extractor. Per the design notes this path is
/// unused by the live extraction flow unless a source actually populates it;
/// the fields are kept typed so a future selector-driven extractor can read
/// them without a registry format change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selectors {
    pub title: Option<String>,
    pub author: Option<String>,
    pub publication_date: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub tags: Option<String>,
    pub categories: Option<String>,
}

/// A configured upstream news source. Immutable once the registry is built.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub canonical_domain: String,
    pub rss_url: String,
    pub categories: BTreeSet<String>,
    pub selectors: Option<Selectors>,
}
