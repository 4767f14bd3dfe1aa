// Poster providers - one strategy per external source

pub mod fanart;
pub mod mal;
pub mod scrape;
pub mod tmdb;
pub mod yts;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::models::{MediaKind, MediaQuery, ProviderResult};

/// One external source capable of producing a poster reference for a query.
///
/// Implementations degrade every failure (network trouble, schema drift,
/// missing data) to `ProviderResult::Absent`; nothing is allowed to error
/// across this boundary. The cancellation token must be checked before each
/// network call. An in-flight call is never aborted from outside; a
/// cancelled token only means the eventual result will be discarded.
#[async_trait]
pub trait PosterSource: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Media kinds this source can answer for.
    fn kinds(&self) -> &'static [MediaKind];

    /// Whether the source needs a catalog id. Id-less queries skip these.
    fn requires_id(&self) -> bool {
        false
    }

    async fn resolve(&self, query: &MediaQuery, cancel: &CancellationToken) -> ProviderResult;
}

/// The fixed, kind-scoped set of sources for one engine instance.
///
/// Order has no effect on race outcome (completion order decides); the
/// per-kind subset size is the race's concurrency width.
pub struct SourceRegistry {
    sources: Vec<Arc<dyn PosterSource>>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<Arc<dyn PosterSource>>) -> Self {
        Self { sources }
    }

    /// Applicable sources for a kind. Without an id, id-keyed sources are
    /// filtered out and only title-based lookups remain.
    pub fn for_kind(&self, kind: MediaKind, has_id: bool) -> Vec<Arc<dyn PosterSource>> {
        self.sources
            .iter()
            .filter(|s| s.kinds().contains(&kind) && (has_id || !s.requires_id()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
