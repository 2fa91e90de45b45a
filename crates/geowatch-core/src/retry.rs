use std::sync::Arc;

use tracing::debug;

use crate::config::RetryPolicy;
use crate::error::FetchError;
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::stats::GatewayStats;

/// Bounded-retry wrapper around the transport.
///
/// Every error kind is retried, 4xx included: the upstreams in question
/// intermittently answer 503 or reject and then accept identical requests,
/// so the schedule treats HTTP errors uniformly.
#[derive(Clone)]
pub struct RetryingFetcher {
    client: Arc<dyn HttpClient>,
    policy: RetryPolicy,
    stats: Arc<GatewayStats>,
}

impl RetryingFetcher {
    pub fn new(client: Arc<dyn HttpClient>, policy: RetryPolicy, stats: Arc<GatewayStats>) -> Self {
        Self {
            client,
            policy,
            stats,
        }
    }

    /// Attempt the request up to `policy.attempts` times with doubling
    /// delays in between. Returns the first success or the last error.
    pub async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, FetchError> {
        let attempts = self.policy.attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let outcome = self
                .client
                .execute(request.clone())
                .await
                .and_then(HttpResponse::into_checked);

            match outcome {
                Ok(response) => {
                    if attempt >= 2 {
                        self.stats.record_retry_success();
                    }
                    return Ok(response);
                }
                Err(error) => {
                    debug!(
                        url = %request.url,
                        attempt,
                        attempts,
                        error = %error,
                        "fetch attempt failed"
                    );
                    last_error = Some(error);
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.delay_after(attempt)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::network("no fetch attempt was made")))
    }
}
