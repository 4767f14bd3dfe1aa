// MyAnimeList API client - anime poster lookups and anime id resolution
// API Documentation: https://myanimelist.net/apiconfig/references/api/v2
// Title-based anime lookups are unreliable, so the poster source is keyed
// strictly by MAL id; title search is only used to resolve ids.

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

const MAL_API_BASE: &str = "https://api.myanimelist.net/v2";

/// MyAnimeList API client with rate limiting
pub struct MalClient {
    client: Client,
    client_id: String,
    base_url: String,
    last_request: Arc<Mutex<Instant>>,
}

#[derive(Debug, Deserialize)]
struct AnimeDetail {
    main_picture: Option<MainPicture>,
}

#[derive(Debug, Deserialize)]
struct MainPicture {
    medium: Option<String>,
    large: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnimeSearchResponse {
    data: Vec<AnimeSearchEntry>,
}

#[derive(Debug, Deserialize)]
struct AnimeSearchEntry {
    node: AnimeNode,
}

#[derive(Debug, Deserialize)]
struct AnimeNode {
    id: i64,
}

impl MalClient {
    pub fn new(client_id: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            client_id,
            base_url: MAL_API_BASE.to_string(),
            last_request: Arc::new(Mutex::new(Instant::now() - Duration::from_secs(1))),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        let elapsed = last.elapsed();
        let min_interval = Duration::from_millis(350);

        if elapsed < min_interval {
            tokio::time::sleep(min_interval - elapsed).await;
        }
        *last = Instant::now();
    }

    /// Poster URL for an anime id (prefers the large rendition).
    pub async fn anime_poster_url(&self, anime_id: i64) -> Result<Option<String>> {
        self.rate_limit().await;

        let url = format!("{}/anime/{}?fields=main_picture", self.base_url, anime_id);

        let response = self
            .client
            .get(&url)
            .header("X-MAL-CLIENT-ID", &self.client_id)
            .send()
            .await
            .context("Failed to fetch anime from MAL")?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }

        let detail: AnimeDetail = response
            .error_for_status()
            .context("MAL anime request failed")?
            .json()
            .await
            .context("Failed to parse MAL anime response")?;

        Ok(detail
            .main_picture
            .and_then(|pic| pic.large.or(pic.medium)))
    }

    /// Search anime by title, returning the first match's id.
    pub async fn search_anime_id(&self, title: &str) -> Result<Option<i64>> {
        self.rate_limit().await;

        let url = format!(
            "{}/anime?q={}&limit=1&fields=id",
            self.base_url,
            urlencoding::encode(title)
        );

        let response: AnimeSearchResponse = self
            .client
            .get(&url)
            .header("X-MAL-CLIENT-ID", &self.client_id)
            .send()
            .await
            .context("Failed to search MAL")?
            .error_for_status()
            .context("MAL search request failed")?
            .json()
            .await
            .context("Failed to parse MAL search response")?;

        Ok(response.data.first().map(|entry| entry.node.id))
    }
}

/// The anime-specific source. Keyed by catalog id only.
pub struct MalPosterSource {
    client: Arc<MalClient>,
}

impl MalPosterSource {
    pub fn new(client: Arc<MalClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PosterSource for MalPosterSource {
    fn name(&self) -> &'static str {
        "myanimelist"
    }

    fn kinds(&self) -> &'static [MediaKind] {
        &[MediaKind::Anime]
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

        match self.client.anime_poster_url(id).await {
            Ok(Some(url)) => ProviderResult::Url(url),
            Ok(None) => ProviderResult::Absent,
            Err(e) => {
                tracing::debug!(id, "mal provider failed: {}", FetchFailure::classify(&e));
                ProviderResult::Absent
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn anime_poster_prefers_large_picture() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/anime/20"))
            .and(header("X-MAL-CLIENT-ID", "cid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 20,
                "main_picture": {
                    "medium": "https://cdn.example/naruto_m.jpg",
                    "large": "https://cdn.example/naruto_l.jpg"
                }
            })))
            .mount(&server)
            .await;

        let client = MalClient::new("cid".into()).with_base_url(&server.uri());
        assert_eq!(
            client.anime_poster_url(20).await.unwrap(),
            Some("https://cdn.example/naruto_l.jpg".to_string())
        );
    }

    #[tokio::test]
    async fn search_returns_first_node_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/anime"))
            .and(query_param("q", "Naruto"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"node": {"id": 20, "title": "Naruto"}},
                    {"node": {"id": 1735, "title": "Naruto: Shippuuden"}}
                ]
            })))
            .mount(&server)
            .await;

        let client = MalClient::new("cid".into()).with_base_url(&server.uri());
        assert_eq!(client.search_anime_id("Naruto").await.unwrap(), Some(20));
    }

    #[tokio::test]
    async fn source_is_absent_when_cancelled() {
        let client = Arc::new(MalClient::new("cid".into()));
        let source = MalPosterSource::new(client);
        let query = MediaQuery::new("Naruto", MediaKind::Anime).with_known_id(20);

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(source.resolve(&query, &cancel).await.is_absent());
    }
}
