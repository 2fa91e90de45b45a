use thiserror::Error;

use crate::domain::UpstreamId;

/// Failure kinds produced by the fetch path.
///
/// `Timeout`, `Network`, and `Status` come out of the transport,
/// `Decode` out of the adapters, and `BreakerOpen`/`NoData` out of the
/// pipeline's local decisions (no network attempt was made for either).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} exceeded the {timeout_ms}ms deadline")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("upstream returned HTTP {status}: {reason}")]
    Status { status: u16, reason: String },

    #[error("response decode failed: {message}")]
    Decode { message: String },

    #[error("circuit breaker for {source} is open and no cached data is available")]
    BreakerOpen { source: UpstreamId },

    #[error("{source} could neither fetch nor serve cached data: {message}")]
    NoData { source: UpstreamId, message: String },
}

impl FetchError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}
