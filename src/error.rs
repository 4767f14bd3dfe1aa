use thiserror::Error;

/// Classification of why a candidate or provider call produced nothing.
///
/// None of these ever cross the engine boundary: providers degrade to
/// `ProviderResult::Absent` and the race degrades to empty bytes. The
/// taxonomy exists so discarded failures are logged with a useful shape.
#[derive(Debug, Error)]
pub enum FetchFailure {
    /// Timeout, connection refused, 5xx. Not retried within one race.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// Unexpected JSON or HTML shape. Schema drift is steady-state for the
    /// scraping providers, so this is expected and quiet.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// A candidate that does not look like an image: URL without a
    /// recognized image suffix, or zero-length payload.
    #[error("invalid candidate: {0}")]
    InvalidCandidate(String),

    /// Every provider in the race completed without a usable candidate.
    #[error("all providers exhausted")]
    AllProvidersExhausted,
}

impl FetchFailure {
    /// Classify an error bubbling out of a provider's client plumbing.
    pub fn classify(err: &anyhow::Error) -> FetchFailure {
        if let Some(req) = err.downcast_ref::<reqwest::Error>() {
            if req.is_timeout() || req.is_connect() {
                return FetchFailure::Transient(req.to_string());
            }
            if let Some(status) = req.status() {
                if status.is_server_error() {
                    return FetchFailure::Transient(format!("upstream returned {status}"));
                }
            }
            if req.is_decode() {
                return FetchFailure::MalformedResponse(req.to_string());
            }
        }
        if err.downcast_ref::<serde_json::Error>().is_some() {
            return FetchFailure::MalformedResponse(err.to_string());
        }
        // Anything else a provider can hit mid-call behaves like a transient
        // network condition from the scheduler's point of view.
        FetchFailure::Transient(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_json_shape_errors_as_malformed() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let classified = FetchFailure::classify(&anyhow::Error::new(json_err));
        assert!(matches!(classified, FetchFailure::MalformedResponse(_)));
    }

    #[test]
    fn classifies_unknown_errors_as_transient() {
        let classified = FetchFailure::classify(&anyhow::anyhow!("socket fell over"));
        assert!(matches!(classified, FetchFailure::Transient(_)));
    }
}
