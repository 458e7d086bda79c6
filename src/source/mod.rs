//! The immutable source registry.
//!
//! A [`Source`] describes one configured upstream news site. The registry is
//! populated once at startup from whatever external collaborator provides
//! source records (a document database in production, a JSON file for local
//! runs and tests) and is read-only for the remainder of the process.

mod registry;
mod types;

pub use registry::{load_json, RegistryError, SourceRegistry};
pub use types::{Selectors, Source, SourceId};
