// Resolution façade: id enrichment, cache short-circuit, and the
// kind-specific fallback chain wrapped around the race scheduler.

use bytes::Bytes;
use std::sync::Arc;

use crate::cache::{normalize_key, CacheStore};
use crate::config::ResolverConfig;
use crate::models::{MediaKind, MediaQuery};
use crate::providers::fanart::{FanartClient, FanartPosterSource};
use crate::providers::mal::{MalClient, MalPosterSource};
use crate::providers::scrape::{
    scrape_client, ImdbScrapeSource, RottenTomatoesScrapeSource, TmdbSiteScrapeSource,
};
use crate::providers::tmdb::{TmdbClient, TmdbPosterSource};
use crate::providers::yts::{YtsClient, YtsPosterSource};
use crate::providers::{PosterSource, SourceRegistry};
use crate::race::RaceScheduler;

/// Stages of the kind-specific fallback chain. Anime is the only kind with
/// a second stage today; the state machine keeps the policy in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FallbackStage {
    TryPrimary,
    TryFallback,
    Done,
}

/// Thin wrapper over the metadata collaborators' "search by title, take
/// first match" operation. Only consulted when the caller supplied no id;
/// every failure mode collapses to `None` and the query proceeds id-less.
pub struct IdResolver {
    tmdb: Option<Arc<TmdbClient>>,
    mal: Option<Arc<MalClient>>,
}

impl IdResolver {
    pub fn new(tmdb: Option<Arc<TmdbClient>>, mal: Option<Arc<MalClient>>) -> Self {
        Self { tmdb, mal }
    }

    pub fn disabled() -> Self {
        Self {
            tmdb: None,
            mal: None,
        }
    }

    pub async fn resolve_id(&self, title: &str, kind: MediaKind) -> Option<i64> {
        let lookup = match kind {
            MediaKind::Movie => match &self.tmdb {
                Some(client) => client.search_movie_id(title).await,
                None => return None,
            },
            MediaKind::Tv => match &self.tmdb {
                Some(client) => client.search_tv_id(title).await,
                None => return None,
            },
            MediaKind::Anime => match &self.mal {
                Some(client) => client.search_anime_id(title).await,
                None => return None,
            },
        };

        match lookup {
            Ok(Some(id)) => {
                tracing::debug!(title, %kind, id, "resolved catalog id");
                Some(id)
            }
            Ok(None) => {
                tracing::debug!(title, %kind, "no catalog id match");
                None
            }
            Err(e) => {
                tracing::warn!(title, %kind, "id resolution failed, proceeding id-less: {e:#}");
                None
            }
        }
    }
}

/// The poster resolution engine.
///
/// Resolution never fails: the caller gets poster bytes or empty bytes,
/// nothing else escapes.
pub struct PosterResolver {
    registry: SourceRegistry,
    cache: Arc<CacheStore>,
    scheduler: RaceScheduler,
    ids: IdResolver,
}

impl PosterResolver {
    /// Build the engine with the fixed source roster the configuration
    /// allows: structured APIs where keys are present, scraping fallbacks
    /// always.
    pub fn new(config: &ResolverConfig) -> Self {
        let tmdb = config
            .tmdb_api_key
            .clone()
            .map(|key| Arc::new(TmdbClient::new(key)));
        let mal = config
            .mal_client_id
            .clone()
            .map(|id| Arc::new(MalClient::new(id)));
        let fanart = config
            .fanart_api_key
            .clone()
            .map(|key| Arc::new(FanartClient::new(key)));

        let scraper = scrape_client(&config.user_agent);

        let mut sources: Vec<Arc<dyn PosterSource>> = Vec::new();
        if let Some(ref client) = tmdb {
            sources.push(Arc::new(TmdbPosterSource::new(client.clone())));
        }
        if let Some(ref client) = fanart {
            sources.push(Arc::new(FanartPosterSource::new(client.clone())));
        }
        if let Some(ref client) = mal {
            sources.push(Arc::new(MalPosterSource::new(client.clone())));
        }
        sources.push(Arc::new(YtsPosterSource::new(Arc::new(YtsClient::new()))));
        sources.push(Arc::new(ImdbScrapeSource::new(scraper.clone())));
        sources.push(Arc::new(RottenTomatoesScrapeSource::new(scraper.clone())));
        sources.push(Arc::new(TmdbSiteScrapeSource::new(scraper)));

        let registry = SourceRegistry::new(sources);
        let ids = IdResolver::new(tmdb, mal);

        Self::with_parts(config, registry, ids)
    }

    /// Load configuration from file/environment and build the engine.
    pub fn from_env() -> Self {
        let config = ResolverConfig::load();
        config.log_config();
        Self::new(&config)
    }

    pub(crate) fn with_parts(
        config: &ResolverConfig,
        registry: SourceRegistry,
        ids: IdResolver,
    ) -> Self {
        let cache = Arc::new(CacheStore::new(config.cache_dir.clone()));
        let scheduler = RaceScheduler::new(cache.clone(), config);
        Self {
            registry,
            cache,
            scheduler,
            ids,
        }
    }

    /// Resolve a poster for the query. Returns the image bytes, or empty
    /// bytes when every source failed, never an error.
    pub async fn resolve(&self, query: &MediaQuery) -> Bytes {
        let id = match query.known_id {
            Some(id) => Some(id),
            None => self.ids.resolve_id(&query.title, query.kind).await,
        };

        // Work on an id-enriched copy; the caller's query stays untouched.
        let mut effective = query.clone();
        effective.known_id = id;

        let key = normalize_key(&effective.title, id);
        if let Some(bytes) = self.cache.get(&key).await {
            return bytes;
        }

        let mut stage = FallbackStage::TryPrimary;
        let mut result = Bytes::new();

        while stage != FallbackStage::Done {
            match stage {
                FallbackStage::TryPrimary => {
                    let sources = self.registry.for_kind(effective.kind, id.is_some());
                    result = self.scheduler.race(&effective, &sources, &key).await;

                    stage = if result.is_empty() && effective.kind == MediaKind::Anime {
                        tracing::debug!(
                            title = %effective.title,
                            "anime source failed, falling back to TV sources"
                        );
                        FallbackStage::TryFallback
                    } else {
                        FallbackStage::Done
                    };
                }
                FallbackStage::TryFallback => {
                    let tv_query = effective.reclassified(MediaKind::Tv);
                    let sources = self.registry.for_kind(MediaKind::Tv, id.is_some());
                    result = self.scheduler.race(&tv_query, &sources, &key).await;
                    stage = FallbackStage::Done;
                }
                FallbackStage::Done => break,
            }
        }

        result
    }
}
