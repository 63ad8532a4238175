use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::scoring::MetricKind;

/// Input that cannot be treated as answer text at all.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("input contains NUL bytes at offset {offset}; this looks like a binary payload, not text")]
    NulByte { offset: usize },

    #[error("input is {percent:.0}% control characters ({count} of {total}); refusing to score a binary payload")]
    ControlCharacters { count: usize, total: usize, percent: f64 },
}

/// Failure of an external collaborator (embedding or extraction backend).
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{provider} timed out after {}s", .after.as_secs_f64())]
    Timeout { provider: String, after: Duration },

    #[error("{provider} returned HTTP {status}: {body}")]
    Http { provider: String, status: u16, body: String },

    #[error("{provider} request failed: {details}")]
    Request { provider: String, details: String },

    #[error("{provider} returned an unusable response: {details}")]
    InvalidResponse { provider: String, details: String },

    #[error("{provider} is not configured: {details}")]
    NotConfigured { provider: String, details: String },

    #[error("{provider} circuit is open after {failures} consecutive failures")]
    CircuitOpen { provider: String, failures: u32 },

    #[error("unsupported source '{path}': {details}")]
    Unsupported { path: String, details: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProviderError {
    pub fn request(provider: &str, error: impl fmt::Display) -> Self {
        ProviderError::Request {
            provider: provider.to_string(),
            details: error.to_string(),
        }
    }

    pub fn invalid_response(provider: &str, details: impl Into<String>) -> Self {
        ProviderError::InvalidResponse {
            provider: provider.to_string(),
            details: details.into(),
        }
    }

    pub fn not_configured(provider: &str, details: impl Into<String>) -> Self {
        ProviderError::NotConfigured {
            provider: provider.to_string(),
            details: details.into(),
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        ProviderError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying the same call later could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout { .. }
            | ProviderError::Request { .. }
            | ProviderError::CircuitOpen { .. } => true,
            ProviderError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// A single metric could not produce a value for this pair.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{metric} unavailable: {reason}")]
pub struct MetricUnavailable {
    pub metric: MetricKind,
    pub reason: String,
}

impl MetricUnavailable {
    pub fn new(metric: MetricKind, reason: impl Into<String>) -> Self {
        Self {
            metric,
            reason: reason.into(),
        }
    }

    pub fn from_provider(metric: MetricKind, error: &ProviderError) -> Self {
        Self::new(metric, error.to_string())
    }
}

/// Errors that abort a whole report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("invalid reference text: {0}")]
    Reference(#[source] InputError),

    #[error("invalid candidate text: {0}")]
    Candidate(#[source] InputError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let timeout = ProviderError::Timeout {
            provider: "embeddings".to_string(),
            after: Duration::from_secs(10),
        };
        assert!(timeout.is_transient());

        let rate_limited = ProviderError::Http {
            provider: "embeddings".to_string(),
            status: 429,
            body: "slow down".to_string(),
        };
        assert!(rate_limited.is_transient());

        let unauthorized = ProviderError::Http {
            provider: "embeddings".to_string(),
            status: 401,
            body: "bad key".to_string(),
        };
        assert!(!unauthorized.is_transient());

        let missing = ProviderError::not_configured("vision", "VISION_API_KEY is not set");
        assert!(!missing.is_transient());
    }

    #[test]
    fn test_error_messages_name_the_provider() {
        let error = ProviderError::Timeout {
            provider: "http-embeddings".to_string(),
            after: Duration::from_millis(1500),
        };
        assert_eq!(error.to_string(), "http-embeddings timed out after 1.5s");

        let unavailable = MetricUnavailable::from_provider(MetricKind::Semantic, &error);
        assert_eq!(unavailable.metric, MetricKind::Semantic);
        assert!(unavailable.to_string().starts_with("semantic unavailable"));
    }
}
