use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use super::types::{Selectors, Source, SourceId};

/// Errors loading or building a [`SourceRegistry`].
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read source registry file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse source registry JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate source id {0:?} in registry")]
    DuplicateId(SourceId),
}

/// On-the-wire shape of one source record, matching the document-database
/// record `{_id, title, domain, rss, channels, xpaths?}`.
#[derive(Debug, Deserialize)]
struct SourceDoc {
    #[serde(rename = "_id")]
    id: String,
    title: String,
    domain: String,
    rss: String,
    #[serde(default)]
    channels: BTreeSet<String>,
    #[serde(default)]
    xpaths: Option<Selectors>,
}

impl From<SourceDoc> for Source {
    fn from(doc: SourceDoc) -> Self {
        Source {
            id: doc.id,
            name: doc.title,
            canonical_domain: doc.domain,
            rss_url: doc.rss,
            categories: doc.channels,
            selectors: doc.xpaths,
        }
    }
}

/// The process-wide, immutable mapping from source id to [`Source`].
///
/// Built once at startup and shared by capability (an `Arc`) with the Engine
/// and the extraction dispatcher; never mutated afterward, so it may be read
/// from any thread without locking.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<SourceId, Source>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from an iterator of sources, rejecting duplicate ids.
    pub fn from_iter<I: IntoIterator<Item = Source>>(iter: I) -> Result<Self, RegistryError> {
        let mut sources = HashMap::new();
        for source in iter {
            let id = source.id.clone();
            if sources.insert(id.clone(), source).is_some() {
                return Err(RegistryError::DuplicateId(id));
            }
        }
        Ok(Self { sources })
    }

    pub fn get(&self, id: &str) -> Option<&Source> {
        self.sources.get(id)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.values()
    }
}

/// Load a registry from a JSON array of source records, for local/dev runs
/// and integration tests. Production source configuration comes from a
/// document database outside this crate's scope.
pub fn load_json(path: impl AsRef<Path>) -> Result<SourceRegistry, RegistryError> {
    let bytes = std::fs::read(path)?;
    let docs: Vec<SourceDoc> = serde_json::from_slice(&bytes)?;
    SourceRegistry::from_iter(docs.into_iter().map(Source::from))
}
