// YTS API client - movie covers by title search
// API Documentation: https://yts.mx/api
// The response shape drifts often enough that parsing is deliberately
// defensive: missing keys mean "no result", never an error.

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

const YTS_API_BASE: &str = "https://yts.mx/api/v2";

/// YTS API client
pub struct YtsClient {
    client: Client,
    base_url: String,
}

/// Cover renditions YTS lists per movie.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoverSet {
    pub small: Option<String>,
    pub medium: Option<String>,
    pub large: Option<String>,
}

impl CoverSet {
    /// Best rendition to race with.
    pub fn best(&self) -> Option<&str> {
        self.large.as_deref().or(self.medium.as_deref())
    }
}

impl YtsClient {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: YTS_API_BASE.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Cover URLs for the first title match, if any.
    pub async fn cover_set(&self, title: &str) -> Result<Option<CoverSet>> {
        let url = format!(
            "{}/list_movies.json?query_term={}&limit=1",
            self.base_url,
            urlencoding::encode(title)
        );

        let body: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to search YTS")?
            .error_for_status()
            .context("YTS request failed")?
            .json()
            .await
            .context("Failed to parse YTS response")?;

        if body.get("status").and_then(|s| s.as_str()) != Some("ok") {
            return Ok(None);
        }

        let Some(movie) = body.pointer("/data/movies/0") else {
            return Ok(None);
        };

        let pick = |key: &str| {
            movie
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        Ok(Some(CoverSet {
            small: pick("small_cover_image"),
            medium: pick("medium_cover_image"),
            large: pick("large_cover_image"),
        }))
    }
}

impl Default for YtsClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Title-based movie source backed by the YTS catalog.
pub struct YtsPosterSource {
    client: Arc<YtsClient>,
}

impl YtsPosterSource {
    pub fn new(client: Arc<YtsClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PosterSource for YtsPosterSource {
    fn name(&self) -> &'static str {
        "yts"
    }

    fn kinds(&self) -> &'static [MediaKind] {
        &[MediaKind::Movie]
    }

    async fn resolve(&self, query: &MediaQuery, cancel: &CancellationToken) -> ProviderResult {
        if cancel.is_cancelled() {
            return ProviderResult::Absent;
        }

        match self.client.cover_set(&query.title).await {
            Ok(Some(covers)) => match covers.best() {
                Some(url) => ProviderResult::Url(url.to_string()),
                None => ProviderResult::Absent,
            },
            Ok(None) => ProviderResult::Absent,
            Err(e) => {
                tracing::debug!(
                    title = %query.title,
                    "yts provider failed: {}",
                    FetchFailure::classify(&e)
                );
                ProviderResult::Absent
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn cover_set_reads_first_movie() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list_movies.json"))
            .and(query_param("query_term", "Inception"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "data": {
                    "movies": [{
                        "id": 1,
                        "title": "Inception",
                        "small_cover_image": "https://img.yts.example/s.jpg",
                        "medium_cover_image": "https://img.yts.example/m.jpg",
                        "large_cover_image": "https://img.yts.example/l.jpg"
                    }]
                }
            })))
            .mount(&server)
            .await;

        let client = YtsClient::new().with_base_url(&server.uri());
        let covers = client.cover_set("Inception").await.unwrap().unwrap();
        assert_eq!(covers.best(), Some("https://img.yts.example/l.jpg"));
    }

    #[tokio::test]
    async fn error_status_and_missing_movies_mean_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list_movies.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "error", "status_message": "nope"})),
            )
            .mount(&server)
            .await;

        let client = YtsClient::new().with_base_url(&server.uri());
        assert!(client.cover_set("Anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn absent_covers_degrade_to_absent_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list_movies.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "data": {"movies": [{"id": 2, "title": "Obscure"}]}
            })))
            .mount(&server)
            .await;

        let client = Arc::new(YtsClient::new().with_base_url(&server.uri()));
        let source = YtsPosterSource::new(client);
        let query = MediaQuery::new("Obscure", MediaKind::Movie);

        assert!(source.resolve(&query, &CancellationToken::new()).await.is_absent());
    }
}
