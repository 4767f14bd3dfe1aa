// Fanart.tv API client - movie posters keyed by TMDB id
// API Documentation: https://fanarttv.docs.apiary.io/

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::PosterSource;
use crate::error::FetchFailure;
use crate::models::{MediaKind, MediaQuery, ProviderResult};

const FANART_API_BASE: &str = "http://webservice.fanart.tv/v3";

/// Fanart.tv API client
pub struct FanartClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct MovieImages {
    #[serde(default)]
    movieposter: Vec<FanartPoster>,
}

/// Fanart serves numeric fields as strings.
#[derive(Debug, Clone, Deserialize)]
pub struct FanartPoster {
    pub url: String,
    pub lang: Option<String>,
    pub likes: Option<String>,
}

impl FanartClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: FANART_API_BASE.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// All movie posters for a TMDB id, best candidates first.
    pub async fn movie_posters(&self, tmdb_id: i64) -> Result<Vec<String>> {
        let url = format!(
            "{}/movies/{}?api_key={}",
            self.base_url, tmdb_id, self.api_key
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch posters from Fanart.tv")?;

        if response.status().as_u16() == 404 {
            return Ok(Vec::new());
        }

        let images: MovieImages = response
            .error_for_status()
            .context("Fanart.tv request failed")?
            .json()
            .await
            .context("Failed to parse Fanart.tv response")?;

        Ok(rank_posters(images.movieposter))
    }
}

/// Order candidates by English-language preference, then like count.
fn rank_posters(mut posters: Vec<FanartPoster>) -> Vec<String> {
    posters.sort_by_key(|p| {
        let english = p.lang.as_deref() == Some("en");
        let likes: i64 = p.likes.as_deref().and_then(|l| l.parse().ok()).unwrap_or(0);
        std::cmp::Reverse((english, likes))
    });
    posters.into_iter().map(|p| p.url).collect()
}

/// Movie source backed by the Fanart.tv catalog. Needs the TMDB id.
pub struct FanartPosterSource {
    client: Arc<FanartClient>,
}

impl FanartPosterSource {
    pub fn new(client: Arc<FanartClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PosterSource for FanartPosterSource {
    fn name(&self) -> &'static str {
        "fanart"
    }

    fn kinds(&self) -> &'static [MediaKind] {
        &[MediaKind::Movie]
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

        match self.client.movie_posters(id).await {
            Ok(posters) => match posters.into_iter().next() {
                Some(url) => ProviderResult::Url(url),
                None => ProviderResult::Absent,
            },
            Err(e) => {
                tracing::debug!(id, "fanart provider failed: {}", FetchFailure::classify(&e));
                ProviderResult::Absent
            }
        }
    }
}
