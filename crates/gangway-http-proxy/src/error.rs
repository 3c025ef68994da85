//! Error types for route registration and forwarding.

/// Errors surfaced by the routing layer.
///
/// `InvalidTarget` and `NoRoutesConfigured` are configuration-time failures
/// and abort startup. `UpstreamUnavailable` is a per-request transport
/// failure; it is not retried here and the surrounding pipeline is expected
/// to translate it into a 502-class response.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("invalid upstream target '{url}': {reason}")]
    InvalidTarget { url: String, reason: String },
    #[error("no routes configured")]
    NoRoutesConfigured,
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(#[source] hyper_util::client::legacy::Error),
}

impl ProxyError {
    pub(crate) fn invalid_target(url: impl Into<String>, reason: impl ToString) -> Self {
        ProxyError::InvalidTarget {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}
