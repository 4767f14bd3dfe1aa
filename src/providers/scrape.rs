// HTML-scraping fallback sources: IMDB, Rotten Tomatoes, TMDB website.
// The markup is third-party and fragile; any shape mismatch is treated
// exactly like "no result". Schema drift here is steady-state.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::PosterSource;
use crate::models::{MediaKind, MediaQuery, ProviderResult};

const IMDB_BASE: &str = "https://www.imdb.com";
const ROTTEN_TOMATOES_BASE: &str = "https://www.rottentomatoes.com";
const TMDB_SITE_BASE: &str = "https://www.themoviedb.org";

static IMDB_RESULT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.ipc-metadata-list-summary-item__t").unwrap());
static IMDB_TITLE_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/title/(tt\d+)/").unwrap());
static OG_IMAGE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:image"]"#).unwrap());
static TMDB_POSTER_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img.poster").unwrap());

/// Browser-looking client shared by the scraping sources; several of these
/// sites answer unknown User-Agents with interstitial pages.
pub fn scrape_client(user_agent: &str) -> Client {
    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_default()
}

async fn fetch_page(client: &Client, url: &str, source: &'static str) -> Option<String> {
    match client.get(url).send().await {
        Ok(response) if response.status().is_success() => match response.text().await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::debug!(source, "failed to read page body: {e}");
                None
            }
        },
        Ok(response) => {
            tracing::debug!(source, status = %response.status(), "page fetch rejected");
            None
        }
        Err(e) => {
            tracing::debug!(source, "page fetch failed: {e}");
            None
        }
    }
}

/// First search result's title id, turned into a direct poster URL.
fn extract_imdb_poster(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let anchor = document.select(&IMDB_RESULT_SELECTOR).next()?;
    let href = anchor.value().attr("href")?;
    let title_id = IMDB_TITLE_ID_REGEX.captures(href)?.get(1)?.as_str();
    Some(format!(
        "https://m.media-amazon.com/images/M/{title_id}@._V1_SX300.jpg"
    ))
}

/// `og:image` content, rewritten through the flixster resizing host.
fn extract_rotten_tomatoes_poster(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let meta = document.select(&OG_IMAGE_SELECTOR).next()?;
    let content = meta.value().attr("content")?;
    if !content.contains("flixster.com") {
        return None;
    }
    let tail = content
        .split_once("/v2/")
        .map(|(_, tail)| tail)
        .unwrap_or(content);
    Some(format!("https://resizing.flixster.com/{tail}"))
}

/// First poster thumbnail on the TMDB search page.
fn extract_tmdb_site_poster(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let img = document.select(&TMDB_POSTER_SELECTOR).next()?;
    let src = img.value().attr("src")?;
    Some(format!("https://image.tmdb.org{src}"))
}

/// IMDB find-page scrape.
pub struct ImdbScrapeSource {
    client: Client,
    base_url: String,
}

impl ImdbScrapeSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: IMDB_BASE.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl PosterSource for ImdbScrapeSource {
    fn name(&self) -> &'static str {
        "imdb-scrape"
    }

    fn kinds(&self) -> &'static [MediaKind] {
        &[MediaKind::Movie, MediaKind::Tv]
    }

    async fn resolve(&self, query: &MediaQuery, cancel: &CancellationToken) -> ProviderResult {
        if cancel.is_cancelled() {
            return ProviderResult::Absent;
        }
        let url = format!(
            "{}/find?q={}",
            self.base_url,
            urlencoding::encode(&query.title)
        );
        let Some(html) = fetch_page(&self.client, &url, "imdb-scrape").await else {
            return ProviderResult::Absent;
        };
        match extract_imdb_poster(&html) {
            Some(poster) => ProviderResult::Url(poster),
            None => {
                tracing::debug!(title = %query.title, "no poster in IMDB markup");
                ProviderResult::Absent
            }
        }
    }
}

/// Rotten Tomatoes movie-page scrape (underscore-joined title slug).
pub struct RottenTomatoesScrapeSource {
    client: Client,
    base_url: String,
}

impl RottenTomatoesScrapeSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: ROTTEN_TOMATOES_BASE.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl PosterSource for RottenTomatoesScrapeSource {
    fn name(&self) -> &'static str {
        "rottentomatoes-scrape"
    }

    fn kinds(&self) -> &'static [MediaKind] {
        &[MediaKind::Movie]
    }

    async fn resolve(&self, query: &MediaQuery, cancel: &CancellationToken) -> ProviderResult {
        if cancel.is_cancelled() {
            return ProviderResult::Absent;
        }
        let url = format!("{}/m/{}", self.base_url, query.title.replace(' ', "_"));
        let Some(html) = fetch_page(&self.client, &url, "rottentomatoes-scrape").await else {
            return ProviderResult::Absent;
        };
        match extract_rotten_tomatoes_poster(&html) {
            Some(poster) => ProviderResult::Url(poster),
            None => {
                tracing::debug!(title = %query.title, "no poster in Rotten Tomatoes markup");
                ProviderResult::Absent
            }
        }
    }
}

/// TMDB public search-page scrape (the API-less fallback).
pub struct TmdbSiteScrapeSource {
    client: Client,
    base_url: String,
}

impl TmdbSiteScrapeSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: TMDB_SITE_BASE.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl PosterSource for TmdbSiteScrapeSource {
    fn name(&self) -> &'static str {
        "tmdb-scrape"
    }

    fn kinds(&self) -> &'static [MediaKind] {
        &[MediaKind::Movie, MediaKind::Tv]
    }

    async fn resolve(&self, query: &MediaQuery, cancel: &CancellationToken) -> ProviderResult {
        if cancel.is_cancelled() {
            return ProviderResult::Absent;
        }
        let url = format!(
            "{}/search?query={}",
            self.base_url,
            urlencoding::encode(&query.title)
        );
        let Some(html) = fetch_page(&self.client, &url, "tmdb-scrape").await else {
            return ProviderResult::Absent;
        };
        match extract_tmdb_site_poster(&html) {
            Some(poster) => ProviderResult::Url(poster),
            None => {
                tracing::debug!(title = %query.title, "no poster in TMDB search markup");
                ProviderResult::Absent
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_USER_AGENT;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn imdb_extraction_builds_poster_url_from_title_id() {
        let html = r#"
            <html><body>
              <ul>
                <li><a class="ipc-metadata-list-summary-item__t"
                       href="/title/tt1375666/?ref_=fn_al_tt_1">Inception</a></li>
              </ul>
            </body></html>"#;
        assert_eq!(
            extract_imdb_poster(html),
            Some("https://m.media-amazon.com/images/M/tt1375666@._V1_SX300.jpg".to_string())
        );
    }

    #[test]
    fn imdb_extraction_tolerates_missing_result() {
        assert_eq!(extract_imdb_poster("<html><body>no hits</body></html>"), None);
        assert_eq!(
            extract_imdb_poster(
                r#"<a class="ipc-metadata-list-summary-item__t" href="/name/nm0000138/">actor</a>"#
            ),
            None
        );
    }

    #[test]
    fn rotten_tomatoes_rewrites_flixster_urls() {
        let html = r#"<head><meta property="og:image"
            content="https://resizing.flixster.com/abc/v2/img/poster.jpg"></head>"#;
        assert_eq!(
            extract_rotten_tomatoes_poster(html),
            Some("https://resizing.flixster.com/img/poster.jpg".to_string())
        );
    }

    #[test]
    fn rotten_tomatoes_ignores_non_flixster_images() {
        let html = r#"<meta property="og:image" content="https://example.com/logo.png">"#;
        assert_eq!(extract_rotten_tomatoes_poster(html), None);
    }

    #[test]
    fn tmdb_site_extraction_prefixes_image_host() {
        let html = r#"<div><img class="poster" src="/t/p/w220/abc.jpg"></div>"#;
        assert_eq!(
            extract_tmdb_site_poster(html),
            Some("https://image.tmdb.org/t/p/w220/abc.jpg".to_string())
        );
    }

    #[tokio::test]
    async fn imdb_source_scrapes_search_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/find"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a class="ipc-metadata-list-summary-item__t" href="/title/tt0133093/">The Matrix</a>"#,
            ))
            .mount(&server)
            .await;

        let source = ImdbScrapeSource::new(scrape_client(DEFAULT_USER_AGENT))
            .with_base_url(&server.uri());
        let query = MediaQuery::new("The Matrix", MediaKind::Movie);

        assert_eq!(
            source.resolve(&query, &CancellationToken::new()).await,
            ProviderResult::Url(
                "https://m.media-amazon.com/images/M/tt0133093@._V1_SX300.jpg".to_string()
            )
        );
    }

    #[tokio::test]
    async fn blocked_page_degrades_to_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/m/Unknown_Movie"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let source = RottenTomatoesScrapeSource::new(scrape_client(DEFAULT_USER_AGENT))
            .with_base_url(&server.uri());
        let query = MediaQuery::new("Unknown Movie", MediaKind::Movie);

        assert!(source.resolve(&query, &CancellationToken::new()).await.is_absent());
    }
}
