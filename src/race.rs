// Race scheduler: fan a query out to every applicable source, take the
// first completion that validates, write it through the cache, and tell
// everyone else to stand down.

use anyhow::Context;
use bytes::Bytes;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheStore;
use crate::config::ResolverConfig;
use crate::error::FetchFailure;
use crate::models::{MediaQuery, ProviderResult, RaceOutcome};
use crate::providers::PosterSource;

const IMAGE_SUFFIXES: [&str; 4] = [".jpg", ".jpeg", ".png", ".webp"];

/// Cheap plausibility check for URL-shaped candidates, done before spending
/// a download on them.
pub fn is_plausible_image_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    IMAGE_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

pub struct RaceScheduler {
    cache: Arc<CacheStore>,
    client: Client,
    provider_timeout: Duration,
}

impl RaceScheduler {
    pub fn new(cache: Arc<CacheStore>, config: &ResolverConfig) -> Self {
        Self {
            cache,
            client: Client::builder()
                .timeout(config.fetch_timeout)
                .build()
                .unwrap_or_default(),
            provider_timeout: config.provider_timeout,
        }
    }

    /// Race every source for this query and return poster bytes, or empty
    /// bytes when everything fails. Never errors.
    ///
    /// Results are inspected in completion order; ties are broken purely by
    /// who finished first. Once a winner is cached the cancellation token is
    /// set and the caller returns immediately; mid-flight sources are left
    /// to finish in the background and their results go nowhere.
    pub async fn race(
        &self,
        query: &MediaQuery,
        sources: &[Arc<dyn PosterSource>],
        key: &str,
    ) -> Bytes {
        if sources.is_empty() {
            tracing::debug!(key, kind = %query.kind, "no applicable sources");
            return Bytes::new();
        }

        tracing::debug!(key, kind = %query.kind, width = sources.len(), "racing poster sources");

        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<(&'static str, ProviderResult)>(sources.len());

        for source in sources {
            let source = Arc::clone(source);
            let query = query.clone();
            let cancel = cancel.clone();
            let tx = tx.clone();
            let budget = self.provider_timeout;

            tokio::spawn(async move {
                let result = match tokio::time::timeout(budget, source.resolve(&query, &cancel)).await
                {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::debug!(source = source.name(), "source timed out");
                        ProviderResult::Absent
                    }
                };
                // Receiver may be gone once a winner is chosen; late results
                // are intentionally dropped here.
                let _ = tx.send((source.name(), result)).await;
            });
        }
        drop(tx);

        let mut outcome = RaceOutcome::default();
        let mut winner = "";
        while let Some((name, result)) = rx.recv().await {
            if let Some(bytes) = self.materialize(name, result).await {
                outcome.winner = Some(ProviderResult::Bytes(bytes));
                winner = name;
                break;
            }
        }

        match outcome.winner {
            Some(ProviderResult::Bytes(bytes)) => {
                self.cache.put(key, &bytes).await;
                cancel.cancel();
                tracing::info!(source = winner, key, size = bytes.len(), "poster race won");
                bytes
            }
            _ => {
                tracing::debug!(key, "{}", FetchFailure::AllProvidersExhausted);
                Bytes::new()
            }
        }
    }

    /// Validate one completed result and turn it into bytes. `None` means
    /// the race continues with the still-pending sources.
    async fn materialize(&self, name: &'static str, result: ProviderResult) -> Option<Bytes> {
        match result {
            ProviderResult::Absent => {
                tracing::debug!(source = name, "no candidate");
                None
            }
            ProviderResult::Url(url) => {
                if !is_plausible_image_url(&url) {
                    tracing::debug!(
                        source = name,
                        %url,
                        "{}",
                        FetchFailure::InvalidCandidate("unrecognized image suffix".into())
                    );
                    return None;
                }
                match self.fetch_image(&url).await {
                    Ok(bytes) if !bytes.is_empty() => Some(bytes),
                    Ok(_) => {
                        tracing::debug!(
                            source = name,
                            %url,
                            "{}",
                            FetchFailure::InvalidCandidate("zero-length download".into())
                        );
                        None
                    }
                    Err(e) => {
                        tracing::debug!(
                            source = name,
                            %url,
                            "winning candidate failed to download, resuming race: {}",
                            FetchFailure::classify(&e)
                        );
                        None
                    }
                }
            }
            ProviderResult::Bytes(bytes) => {
                if bytes.is_empty() {
                    tracing::debug!(
                        source = name,
                        "{}",
                        FetchFailure::InvalidCandidate("zero-length payload".into())
                    );
                    return None;
                }
                Some(bytes)
            }
        }
    }

    /// One bounded-timeout download to materialize a URL-shaped winner.
    async fn fetch_image(&self, url: &str) -> anyhow::Result<Bytes> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to download image")?;

        let bytes = response
            .error_for_status()
            .context("Image host rejected download")?
            .bytes()
            .await
            .context("Failed to read image body")?;

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaKind;
    use crate::providers::testing::ScriptedSource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MOVIE: &[MediaKind] = &[MediaKind::Movie];

    fn scheduler(dir: &std::path::Path) -> (RaceScheduler, Arc<CacheStore>) {
        let cache = Arc::new(CacheStore::new(dir));
        let config = ResolverConfig {
            provider_timeout: Duration::from_millis(500),
            fetch_timeout: Duration::from_secs(2),
            ..ResolverConfig::default()
        };
        (RaceScheduler::new(cache.clone(), &config), cache)
    }

    fn movie_query(title: &str) -> MediaQuery {
        MediaQuery::new(title, MediaKind::Movie)
    }

    #[test]
    fn image_suffix_validation() {
        assert!(is_plausible_image_url("https://x/poster.jpg"));
        assert!(is_plausible_image_url("https://x/POSTER.JPEG"));
        assert!(is_plausible_image_url("https://x/p.webp"));
        assert!(!is_plausible_image_url("https://x/poster"));
        assert!(!is_plausible_image_url("https://x/page.html"));
    }

    #[tokio::test]
    async fn first_valid_completion_wins_over_faster_invalid_one() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, cache) = scheduler(dir.path());

        // A completes instantly with a candidate that fails validation;
        // B is slower but valid.
        let a = ScriptedSource::new(
            "fast-invalid",
            MOVIE,
            ProviderResult::Url("https://a.example/page.html".into()),
        );
        let b = ScriptedSource::bytes("slow-valid", MOVIE, b"poster-from-b")
            .with_delay(Duration::from_millis(50));

        let sources: Vec<Arc<dyn PosterSource>> = vec![Arc::new(a), Arc::new(b)];
        let bytes = scheduler.race(&movie_query("Test"), &sources, "test").await;

        assert_eq!(bytes, Bytes::from_static(b"poster-from-b"));
        assert_eq!(cache.get("test").await, Some(bytes));
    }

    #[tokio::test]
    async fn total_failure_returns_empty_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, cache) = scheduler(dir.path());

        let sources: Vec<Arc<dyn PosterSource>> = vec![
            Arc::new(ScriptedSource::absent("a", MOVIE)),
            Arc::new(ScriptedSource::absent("b", MOVIE)),
            Arc::new(ScriptedSource::new(
                "zero-length",
                MOVIE,
                ProviderResult::Bytes(Bytes::new()),
            )),
        ];

        let bytes = scheduler.race(&movie_query("Nothing"), &sources, "nothing").await;
        assert!(bytes.is_empty());
        assert!(cache.get("nothing").await.is_none());
    }

    #[tokio::test]
    async fn empty_source_set_returns_empty_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, _) = scheduler(dir.path());

        let bytes = scheduler.race(&movie_query("Nobody"), &[], "nobody").await;
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn url_winner_is_materialized_and_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/poster.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"imagebytes".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (scheduler, cache) = scheduler(dir.path());

        let source = ScriptedSource::new(
            "api",
            MOVIE,
            ProviderResult::Url(format!("{}/poster.jpg", server.uri())),
        );
        let sources: Vec<Arc<dyn PosterSource>> = vec![Arc::new(source)];

        let bytes = scheduler.race(&movie_query("Remote"), &sources, "remote").await;
        assert_eq!(bytes, Bytes::from_static(b"imagebytes"));
        assert_eq!(cache.get("remote").await, Some(bytes));
        assert!(dir.path().join("remote.jpg").exists());
    }

    #[tokio::test]
    async fn failed_download_resumes_racing_pending_sources() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken.jpg"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (scheduler, _) = scheduler(dir.path());

        // First completion validates but its download 500s; the race must
        // continue and settle on the slower raw-bytes source.
        let broken = ScriptedSource::new(
            "broken-host",
            MOVIE,
            ProviderResult::Url(format!("{}/broken.jpg", server.uri())),
        );
        let backup = ScriptedSource::bytes("backup", MOVIE, b"backup-bytes")
            .with_delay(Duration::from_millis(80));

        let sources: Vec<Arc<dyn PosterSource>> = vec![Arc::new(broken), Arc::new(backup)];
        let bytes = scheduler.race(&movie_query("Flaky"), &sources, "flaky").await;

        assert_eq!(bytes, Bytes::from_static(b"backup-bytes"));
    }

    #[tokio::test]
    async fn hung_source_is_timed_out() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, _) = scheduler(dir.path());

        // Sleeps far past the 500ms provider budget.
        let hung = ScriptedSource::bytes("hung", MOVIE, b"too-late")
            .with_delay(Duration::from_secs(30));
        let sources: Vec<Arc<dyn PosterSource>> = vec![Arc::new(hung)];

        let bytes = scheduler.race(&movie_query("Hung"), &sources, "hung").await;
        assert!(bytes.is_empty());
    }

    /// Source that records whether the shared token was cancelled by the
    /// time it finished its (slow) work.
    struct TokenProbe {
        delay: Duration,
        observed_cancelled: Arc<AtomicBool>,
        result: ProviderResult,
    }

    #[async_trait]
    impl PosterSource for TokenProbe {
        fn name(&self) -> &'static str {
            "token-probe"
        }

        fn kinds(&self) -> &'static [MediaKind] {
            MOVIE
        }

        async fn resolve(&self, _query: &MediaQuery, cancel: &CancellationToken) -> ProviderResult {
            tokio::time::sleep(self.delay).await;
            self.observed_cancelled
                .store(cancel.is_cancelled(), Ordering::SeqCst);
            if cancel.is_cancelled() {
                return ProviderResult::Absent;
            }
            self.result.clone()
        }
    }

    #[tokio::test]
    async fn winner_cancels_stragglers_and_their_results_cannot_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, cache) = scheduler(dir.path());

        let observed = Arc::new(AtomicBool::new(false));
        let straggler = TokenProbe {
            delay: Duration::from_millis(100),
            observed_cancelled: observed.clone(),
            result: ProviderResult::Bytes(Bytes::from_static(b"late-different-poster")),
        };
        let winner = ScriptedSource::bytes("winner", MOVIE, b"winning-poster");

        let sources: Vec<Arc<dyn PosterSource>> = vec![Arc::new(straggler), Arc::new(winner)];
        let bytes = scheduler.race(&movie_query("Contested"), &sources, "contested").await;
        assert_eq!(bytes, Bytes::from_static(b"winning-poster"));

        // Give the straggler time to finish in the background, then check it
        // saw the cancellation and did not touch the cache entry.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(observed.load(Ordering::SeqCst));
        assert_eq!(
            cache.get("contested").await,
            Some(Bytes::from_static(b"winning-poster"))
        );
    }
}
