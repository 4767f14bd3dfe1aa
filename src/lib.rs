//! posterbox - poster artwork resolution engine.
//!
//! Given a media title (plus an optional catalog id and a kind: movie, TV,
//! anime), the engine races every applicable external source - structured
//! APIs and HTML-scraping fallbacks - takes the first valid poster, caches
//! it in memory and on disk, and degrades to empty bytes when everything
//! fails. Invoked programmatically; owns no CLI and no server surface.
//!
//! ```no_run
//! use posterbox::{MediaKind, MediaQuery, PosterResolver};
//!
//! # async fn example() {
//! let resolver = PosterResolver::from_env();
//! let query = MediaQuery::new("Inception", MediaKind::Movie).with_known_id(27205);
//! let poster = resolver.resolve(&query).await; // bytes, or empty on total failure
//! # let _ = poster;
//! # }
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod providers;
pub mod race;
pub mod resolver;

pub use cache::{normalize_key, CacheStore};
pub use config::ResolverConfig;
pub use error::FetchFailure;
pub use models::{MediaKind, MediaQuery, ProviderResult, RaceOutcome};
pub use providers::{PosterSource, SourceRegistry};
pub use resolver::{IdResolver, PosterResolver};

/// Opt-in tracing setup for host applications that have no subscriber of
/// their own. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "posterbox=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
