// TMDB structured-API provider and id lookups
// API Documentation: https://developer.themoviedb.org/reference/intro/getting-started

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::PosterSource;
use crate::error::FetchFailure;
use crate::models::{MediaKind, MediaQuery, ProviderResult};

const TMDB_API_BASE: &str = "https://api.themoviedb.org/3";
const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p";

/// Poster size served for cache entries (w500 is what the UI renders).
const POSTER_SIZE: &str = "w500";

/// TMDB API client with rate limiting
pub struct TmdbClient {
    client: Client,
    api_key: String,
    base_url: String,
    image_base: String,
    last_request: Arc<Mutex<Instant>>,
}

#[derive(Debug, Deserialize)]
struct MovieSearchResults {
    results: Vec<MovieSearchResult>,
}

#[derive(Debug, Deserialize)]
struct MovieSearchResult {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TvSearchResults {
    results: Vec<TvSearchResult>,
}

#[derive(Debug, Deserialize)]
struct TvSearchResult {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    poster_path: Option<String>,
}

impl TmdbClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: TMDB_API_BASE.to_string(),
            image_base: TMDB_IMAGE_BASE.to_string(),
            last_request: Arc::new(Mutex::new(Instant::now() - Duration::from_secs(1))),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_urls(mut self, api: &str, image: &str) -> Self {
        self.base_url = api.trim_end_matches('/').to_string();
        self.image_base = image.trim_end_matches('/').to_string();
        self
    }

    /// Keep under TMDB's courtesy limit (~4 req/sec)
    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        let elapsed = last.elapsed();
        let min_interval = Duration::from_millis(250);

        if elapsed < min_interval {
            tokio::time::sleep(min_interval - elapsed).await;
        }
        *last = Instant::now();
    }

    /// Search movies by title, returning the first match's id.
    pub async fn search_movie_id(&self, title: &str) -> Result<Option<i64>> {
        self.rate_limit().await;

        let url = format!(
            "{}/search/movie?api_key={}&query={}&include_adult=false",
            self.base_url,
            self.api_key,
            urlencoding::encode(title)
        );

        let response: MovieSearchResults = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to search TMDB for movies")?
            .json()
            .await
            .context("Failed to parse TMDB movie search response")?;

        Ok(response.results.first().map(|m| m.id))
    }

    /// Search TV shows by title, returning the first match's id.
    pub async fn search_tv_id(&self, title: &str) -> Result<Option<i64>> {
        self.rate_limit().await;

        let url = format!(
            "{}/search/tv?api_key={}&query={}&include_adult=false",
            self.base_url,
            self.api_key,
            urlencoding::encode(title)
        );

        let response: TvSearchResults = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to search TMDB for TV shows")?
            .json()
            .await
            .context("Failed to parse TMDB TV search response")?;

        Ok(response.results.first().map(|s| s.id))
    }

    /// Poster path for a movie id, as a full image URL.
    pub async fn movie_poster_url(&self, tmdb_id: i64) -> Result<Option<String>> {
        self.poster_url_for("movie", tmdb_id).await
    }

    /// Poster path for a TV show id, as a full image URL.
    pub async fn tv_poster_url(&self, tmdb_id: i64) -> Result<Option<String>> {
        self.poster_url_for("tv", tmdb_id).await
    }

    async fn poster_url_for(&self, endpoint: &str, tmdb_id: i64) -> Result<Option<String>> {
        self.rate_limit().await;

        let url = format!(
            "{}/{}/{}?api_key={}",
            self.base_url, endpoint, tmdb_id, self.api_key
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to get TMDB details")?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }

        let details: DetailResponse = response
            .error_for_status()
            .context("TMDB details request failed")?
            .json()
            .await
            .context("Failed to parse TMDB details response")?;

        Ok(details
            .poster_path
            .map(|p| format!("{}/{}{}", self.image_base, POSTER_SIZE, p)))
    }
}

/// Structured-API source: answers movie and TV queries that carry a catalog
/// id by reading the detail record's poster path.
pub struct TmdbPosterSource {
    client: Arc<TmdbClient>,
}

impl TmdbPosterSource {
    pub fn new(client: Arc<TmdbClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PosterSource for TmdbPosterSource {
    fn name(&self) -> &'static str {
        "tmdb"
    }

    fn kinds(&self) -> &'static [MediaKind] {
        &[MediaKind::Movie, MediaKind::Tv]
    }

    fn requires_id(&self) -> bool {
        true
    }

    async fn resolve(&self, query: &MediaQuery, cancel: &CancellationToken) -> ProviderResult {
        let Some(id) = query.known_id else {
            return ProviderResult::Absent;
        };
        if cancel.is_cancelled() {
            return ProviderResult::Absent;
        }

        let lookup = match query.kind {
            MediaKind::Movie => self.client.movie_poster_url(id).await,
            MediaKind::Tv => self.client.tv_poster_url(id).await,
            MediaKind::Anime => return ProviderResult::Absent,
        };

        match lookup {
            Ok(Some(url)) => ProviderResult::Url(url),
            Ok(None) => ProviderResult::Absent,
            Err(e) => {
                tracing::debug!(id, "tmdb provider failed: {}", FetchFailure::classify(&e));
                ProviderResult::Absent
            }
        }
    }
}
