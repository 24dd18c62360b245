//! Error types for feed operations.
//!
//! Two layers of failure are modelled here:
//!
//! - [`SourceUnavailable`] is the only failure a provider adapter may return. It
//!   is recoverable: the registry moves on to the next source.
//! - [`FeedError`] is what callers of the registry, merger, extractor and daemon
//!   see once recovery inside those components is exhausted.

use std::fmt;

use thiserror::Error;

use crate::provider::{Capability, SourceId};

/// Why a single source could not serve a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnavailableKind {
    /// The source has no credential or was never configured.
    NotConfigured,
    /// The source does not serve this kind of request.
    Unsupported,
    /// The provider rejected the credential.
    Auth,
    /// The provider is throttling requests.
    RateLimited,
    /// The provider does not know the symbol.
    NotFound,
    /// The provider answered with no usable data.
    Empty,
    /// The request did not complete in time.
    Timeout,
    /// Transport-level failure.
    Network,
    /// The response could not be decoded.
    Parse,
    /// Rendered chart input violated the extraction contract.
    Malformed,
    /// The underlying session has been shut down.
    SessionClosed,
}

impl UnavailableKind {
    /// Returns the log outcome this kind is reported under.
    ///
    /// A source that was never configured is `skipped`; anything else is an `error`.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::NotConfigured => "skipped",
            _ => "error",
        }
    }

    /// Maps an unsuccessful HTTP status code onto a failure category.
    #[must_use]
    pub const fn from_http_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            404 => Self::NotFound,
            408 | 504 => Self::Timeout,
            429 => Self::RateLimited,
            _ => Self::Network,
        }
    }

    /// Returns a short lowercase name for logs and error messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::Unsupported => "unsupported",
            Self::Auth => "auth",
            Self::RateLimited => "rate_limited",
            Self::NotFound => "not_found",
            Self::Empty => "empty",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Parse => "parse",
            Self::Malformed => "malformed",
            Self::SessionClosed => "session_closed",
        }
    }
}

impl fmt::Display for UnavailableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single source could not serve a request.
///
/// Provider adapters map every provider-specific failure (auth, rate limit,
/// not found, decode errors) onto this type.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{source_id} unavailable ({kind}): {detail}")]
pub struct SourceUnavailable {
    /// The source that failed.
    pub source_id: SourceId,
    /// Failure category.
    pub kind: UnavailableKind,
    /// Human readable detail.
    pub detail: String,
}

impl SourceUnavailable {
    /// Creates a new unavailability record.
    #[must_use]
    pub fn new(source_id: impl Into<SourceId>, kind: UnavailableKind, detail: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            kind,
            detail: detail.into(),
        }
    }

    /// Shorthand for [`UnavailableKind::Empty`].
    #[must_use]
    pub fn empty(source_id: impl Into<SourceId>, detail: impl Into<String>) -> Self {
        Self::new(source_id, UnavailableKind::Empty, detail)
    }

    /// Shorthand for [`UnavailableKind::Unsupported`].
    #[must_use]
    pub fn unsupported(source_id: impl Into<SourceId>, detail: impl Into<String>) -> Self {
        Self::new(source_id, UnavailableKind::Unsupported, detail)
    }

    /// Shorthand for [`UnavailableKind::NotConfigured`].
    #[must_use]
    pub fn not_configured(source_id: impl Into<SourceId>, detail: impl Into<String>) -> Self {
        Self::new(source_id, UnavailableKind::NotConfigured, detail)
    }
}

/// Errors that can surface from the feed pipeline.
#[derive(Error, Debug)]
pub enum FeedError {
    /// One provider could not serve a request.
    #[error(transparent)]
    SourceUnavailable(#[from] SourceUnavailable),

    /// Every provider for a capability was tried and none produced data.
    #[error("No data available for {symbol} ({capability}); tried: {}", format_attempts(.attempts))]
    NoDataAvailable {
        /// The symbol that was requested.
        symbol: String,
        /// The capability that was requested.
        capability: Capability,
        /// Every attempted source with its failure reason, in attempt order.
        attempts: Vec<SourceUnavailable>,
    },

    /// Rendered chart input violated the extraction contract.
    #[error("Malformed chart input: {0}")]
    MalformedChartInput(String),

    /// The tabular store could not be reached or rejected an operation.
    #[error("Store unreachable: {0}")]
    StoreUnreachable(String),

    /// Startup configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A period label does not match any supported format.
    #[error("Unsupported period label: {0:?}")]
    InvalidPeriodLabel(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error decoding data.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

fn format_attempts(attempts: &[SourceUnavailable]) -> String {
    if attempts.is_empty() {
        return "no sources".to_string();
    }
    attempts
        .iter()
        .map(|a| format!("{} ({}: {})", a.source_id, a.kind, a.detail))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias using [`FeedError`].
pub type Result<T> = std::result::Result<T, FeedError>;

/// Result type returned by provider adapters.
pub type SourceResult<T> = std::result::Result<T, SourceUnavailable>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_mapping() {
        assert_eq!(UnavailableKind::NotConfigured.outcome(), "skipped");
        assert_eq!(UnavailableKind::RateLimited.outcome(), "error");
        assert_eq!(UnavailableKind::Empty.outcome(), "error");
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(UnavailableKind::from_http_status(401), UnavailableKind::Auth);
        assert_eq!(UnavailableKind::from_http_status(429), UnavailableKind::RateLimited);
        assert_eq!(UnavailableKind::from_http_status(404), UnavailableKind::NotFound);
        assert_eq!(UnavailableKind::from_http_status(502), UnavailableKind::Network);
    }

    #[test]
    fn test_no_data_lists_every_attempt() {
        let err = FeedError::NoDataAvailable {
            symbol: "MU".to_string(),
            capability: Capability::EpsEstimates,
            attempts: vec![
                SourceUnavailable::not_configured("fmp", "missing FMP_API_KEY"),
                SourceUnavailable::new("finnhub", UnavailableKind::RateLimited, "HTTP 429"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("MU"));
        assert!(msg.contains("fmp (not_configured: missing FMP_API_KEY)"));
        assert!(msg.contains("finnhub (rate_limited: HTTP 429)"));
    }
}
