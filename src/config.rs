// Configuration module for posterbox
// Handles XDG-compliant cache location and TOML configuration file

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const APP_NAME: &str = "posterbox";
const CONFIG_FILENAME: &str = "config.toml";

/// Default browser User-Agent for the scraping providers; several of the
/// scraped sites serve degraded markup to unknown clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Cache paths (overrides XDG defaults)
    pub cache: CacheFileConfig,

    /// Provider credentials
    pub providers: ProviderKeysConfig,

    /// Engine timeouts
    pub timeouts: TimeoutsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheFileConfig {
    /// Override the poster cache directory
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderKeysConfig {
    /// TMDB API key (enables the TMDB structured provider and id resolution)
    pub tmdb_api_key: Option<String>,

    /// Fanart.tv API key (enables the Fanart movie-poster provider)
    pub fanart_api_key: Option<String>,

    /// MyAnimeList client id (enables the anime provider and anime id resolution)
    pub mal_client_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Per-provider call budget in seconds (default: 5)
    pub provider_secs: u64,

    /// Winning-image download budget in seconds (default: 10)
    pub fetch_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            provider_secs: 5,
            fetch_secs: 10,
        }
    }
}

/// Engine configuration - combines TOML file with environment overrides
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Directory holding the on-disk poster cache
    pub cache_dir: PathBuf,

    /// TMDB API key (optional)
    pub tmdb_api_key: Option<String>,

    /// Fanart.tv API key (optional)
    pub fanart_api_key: Option<String>,

    /// MyAnimeList client id (optional)
    pub mal_client_id: Option<String>,

    /// Per-provider call budget
    pub provider_timeout: Duration,

    /// Winning-image download budget
    pub fetch_timeout: Duration,

    /// User-Agent for the scraping providers
    pub user_agent: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        let timeouts = TimeoutsConfig::default();
        Self {
            cache_dir: default_cache_dir(),
            tmdb_api_key: None,
            fanart_api_key: None,
            mal_client_id: None,
            provider_timeout: Duration::from_secs(timeouts.provider_secs),
            fetch_timeout: Duration::from_secs(timeouts.fetch_secs),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ResolverConfig {
    /// Load configuration from TOML file and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. TOML config file
    /// 3. Default values
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        let config_file = Self::load_config_file(&Self::find_config_dir());
        Self::build(config_file)
    }

    /// Find the config directory (for locating config.toml)
    fn find_config_dir() -> PathBuf {
        if let Ok(path) = std::env::var("POSTERBOX_CONFIG_DIR") {
            return PathBuf::from(path);
        }

        if let Some(dir) = dirs::config_dir() {
            return dir.join(APP_NAME);
        }

        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Load and parse the TOML config file
    fn load_config_file(config_dir: &std::path::Path) -> ConfigFile {
        let config_path = config_dir.join(CONFIG_FILENAME);

        if !config_path.exists() {
            tracing::debug!(
                "No config file found at {}, using defaults",
                config_path.display()
            );
            return ConfigFile::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse config file {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    );
                    ConfigFile::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
                ConfigFile::default()
            }
        }
    }

    /// Build configuration from config file with environment overrides
    fn build(config_file: ConfigFile) -> Self {
        let cache_dir = std::env::var("POSTERBOX_CACHE_DIR")
            .ok()
            .map(PathBuf::from)
            .or(config_file.cache.dir)
            .unwrap_or_else(default_cache_dir);

        let tmdb_api_key = std::env::var("TMDB_API_KEY")
            .ok()
            .or(config_file.providers.tmdb_api_key);

        let fanart_api_key = std::env::var("FANART_API_KEY")
            .ok()
            .or(config_file.providers.fanart_api_key);

        let mal_client_id = std::env::var("MAL_CLIENT_ID")
            .ok()
            .or(config_file.providers.mal_client_id);

        let provider_timeout = env_secs("POSTERBOX_PROVIDER_TIMEOUT_SECS")
            .unwrap_or(config_file.timeouts.provider_secs);
        let fetch_timeout =
            env_secs("POSTERBOX_FETCH_TIMEOUT_SECS").unwrap_or(config_file.timeouts.fetch_secs);

        Self {
            cache_dir,
            tmdb_api_key,
            fanart_api_key,
            mal_client_id,
            provider_timeout: Duration::from_secs(provider_timeout),
            fetch_timeout: Duration::from_secs(fetch_timeout),
            user_agent: std::env::var("POSTERBOX_USER_AGENT")
                .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
        }
    }

    /// Log the effective configuration at startup
    pub fn log_config(&self) {
        tracing::info!("Poster cache directory: {}", self.cache_dir.display());
        tracing::debug!(
            "Providers configured: tmdb={} fanart={} mal={}",
            self.tmdb_api_key.is_some(),
            self.fanart_api_key.is_some(),
            self.mal_client_id.is_some()
        );
    }
}

/// XDG cache dir when available, `cache/posters` under the working
/// directory otherwise (the portable layout the original shipped with).
fn default_cache_dir() -> PathBuf {
    if let Some(dir) = dirs::cache_dir() {
        return dir.join(APP_NAME).join("posters");
    }
    PathBuf::from("cache").join("posters")
}

fn env_secs(var: &str) -> Option<u64> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts_are_sane() {
        let config = ResolverConfig::default();
        assert_eq!(config.provider_timeout, Duration::from_secs(5));
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert!(config.user_agent.contains("Mozilla"));
    }

    #[test]
    fn config_file_parses_partial_toml() {
        let parsed: ConfigFile = toml::from_str(
            r#"
            [providers]
            tmdb_api_key = "abc123"

            [timeouts]
            provider_secs = 3
            "#,
        )
        .unwrap();

        assert_eq!(parsed.providers.tmdb_api_key.as_deref(), Some("abc123"));
        assert_eq!(parsed.timeouts.provider_secs, 3);
        assert_eq!(parsed.timeouts.fetch_secs, 10);
        assert!(parsed.cache.dir.is_none());
    }
}
