use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Media category governing which providers and fallback rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Movie,
    Tv,
    Anime,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Movie => write!(f, "movie"),
            MediaKind::Tv => write!(f, "tv"),
            MediaKind::Anime => write!(f, "anime"),
        }
    }
}

/// One poster resolution request. Immutable for the duration of the attempt;
/// every downstream component consumes it read-only.
#[derive(Debug, Clone)]
pub struct MediaQuery {
    pub title: String,
    pub known_id: Option<i64>,
    pub kind: MediaKind,
}

impl MediaQuery {
    pub fn new(title: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            title: title.into(),
            known_id: None,
            kind,
        }
    }

    pub fn with_known_id(mut self, id: i64) -> Self {
        self.known_id = Some(id);
        self
    }

    /// Copy of this query reclassified under a different kind, used by the
    /// anime fallback stage.
    pub(crate) fn reclassified(&self, kind: MediaKind) -> Self {
        Self {
            title: self.title.clone(),
            known_id: self.known_id,
            kind,
        }
    }
}

/// What a single provider produced for a query. Providers yield a candidate
/// or explicitly yield nothing; they never return an error across the engine
/// boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResult {
    /// Candidate image URL; the scheduler materializes it with one fetch.
    Url(String),
    /// Image bytes already in hand, used as-is.
    Bytes(Bytes),
    /// Provider found nothing (or failed in any way).
    Absent,
}

impl ProviderResult {
    pub fn is_absent(&self) -> bool {
        matches!(self, ProviderResult::Absent)
    }
}

/// Outcome of one race scheduler invocation. Transient: lives only for the
/// duration of the race and a final log line.
#[derive(Debug, Default)]
pub struct RaceOutcome {
    pub winner: Option<ProviderResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reclassified_keeps_title_and_id() {
        let query = MediaQuery::new("Naruto", MediaKind::Anime).with_known_id(20);
        let tv = query.reclassified(MediaKind::Tv);
        assert_eq!(tv.kind, MediaKind::Tv);
        assert_eq!(tv.title, "Naruto");
        assert_eq!(tv.known_id, Some(20));
    }

    #[test]
    fn kind_display() {
        assert_eq!(MediaKind::Anime.to_string(), "anime");
        assert_eq!(MediaKind::Movie.to_string(), "movie");
    }
}
