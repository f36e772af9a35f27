//! HTTP transport for gateway calls: client factory plus bounded retries.
//!
//! Gateway adapters MUST go through `build_client()` and `send_json()` rather
//! than constructing `reqwest::Client` or retry loops themselves.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::app_error::{AppError, AppResult};

/// Connect timeout (TCP handshake + TLS).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a gateway client. `request_timeout` bounds the whole request.
pub fn build_client(request_timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(request_timeout))
        .timeout(request_timeout)
        .build()
}

/// How often a gateway call may be attempted on transport failure or 5xx.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Status queries are safe to repeat
    pub const IDEMPOTENT: Self = Self {
        max_attempts: 3,
        base_delay: Duration::from_millis(250),
        max_delay: Duration::from_secs(2),
    };

    /// Payment creation is retried once with the same provider order reference
    pub const CREATE: Self = Self {
        max_attempts: 2,
        base_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(2),
    };

    /// Refunds are never repeated automatically
    pub const SINGLE: Self = Self {
        max_attempts: 1,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    };

    /// Delay before retry number `attempt` (1-based), exponential with jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = exponential.min(self.max_delay);
        let jitter_ms = match capped.as_millis() as u64 / 4 {
            0 => 0,
            spread => rand::random::<u64>() % spread,
        };
        capped + Duration::from_millis(jitter_ms)
    }
}

/// Send a request built by `build`, retrying transport errors and 5xx
/// responses per `policy`, and decode the JSON body.
///
/// 4xx responses are never retried and surface as `GatewayRejected`.
pub async fn send_json<T, F>(gateway: &str, policy: RetryPolicy, build: F) -> AppResult<T>
where
    T: DeserializeOwned,
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match build().send().await {
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.map_err(|e| {
                    AppError::GatewayUnreachable(format!("{gateway}: failed to read response: {e}"))
                })?;

                if status.is_success() {
                    return serde_json::from_str(&body).map_err(|e| {
                        tracing::error!(gateway, body = %body, error = %e, "Failed to parse gateway response");
                        AppError::GatewayRejected(format!("{gateway}: malformed response"))
                    });
                }
                if status.is_client_error() {
                    tracing::warn!(gateway, status = %status, body = %body, "Gateway rejected request");
                    return Err(AppError::GatewayRejected(format!(
                        "{gateway}: HTTP {status}: {body}"
                    )));
                }
                AppError::GatewayUnreachable(format!("{gateway}: HTTP {status}"))
            }
            Err(e) => AppError::GatewayUnreachable(format!("{gateway}: {e}")),
        };

        if attempt >= policy.max_attempts {
            tracing::error!(gateway, attempt, error = %err, "Gateway call failed, giving up");
            return Err(err);
        }

        let delay = policy.backoff_delay(attempt);
        tracing::warn!(gateway, attempt, delay_ms = delay.as_millis() as u64, error = %err, "Gateway call failed, retrying");
        tokio::time::sleep(delay).await;
    }
}
