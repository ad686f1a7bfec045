//! Retry and circuit-breaker decorator applied to every outbound call
//!
//! Coordinators never loop on failures themselves. They hand a request
//! factory to [`ResiliencePolicy::call`], which consults the origin's breaker,
//! re-issues the request on transient faults and feeds every outcome back
//! into the breaker.

mod breaker;
mod retry;

pub use breaker::{BreakerRegistry, BreakerSettings, CircuitBreaker, CircuitState};
pub use retry::{is_transient_error, is_transient_status, RetryPolicy};

use edx_errors::{Error, NetworkError};
use edx_events::{EventEmitter, EventSender, ResilienceEvent};
use reqwest::{Response, StatusCode};
use std::future::Future;
use std::sync::Arc;
use url::Url;

/// Retry policy plus the breaker registry it reports into
#[derive(Debug, Clone)]
pub struct ResiliencePolicy {
    retry: RetryPolicy,
    registry: Arc<BreakerRegistry>,
}

impl ResiliencePolicy {
    #[must_use]
    pub fn new(retry: RetryPolicy, registry: Arc<BreakerRegistry>) -> Self {
        Self { retry, registry }
    }

    #[must_use]
    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<BreakerRegistry> {
        &self.registry
    }

    /// Breaker guarding the origin of `url`
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::InvalidUrl` if `url` does not parse.
    pub fn breaker_for(&self, url: &str) -> Result<Arc<CircuitBreaker>, Error> {
        Ok(self.registry.breaker(&target_key(url)?))
    }

    /// Run `send` under the retry policy and the origin's circuit breaker
    ///
    /// Non-transient responses (including 4xx) are returned as-is for the
    /// caller to interpret. When every attempt hit a transient status the last
    /// response is returned so its status and body reach the diagnostics.
    ///
    /// # Errors
    ///
    /// Returns `CircuitOpen` without any I/O while the breaker is open,
    /// `RateLimited` for a 429 carrying `Retry-After`, `RetriesExhausted` when
    /// every attempt failed at the transport level, and a plain network error
    /// for non-transient transport faults.
    pub async fn call<F, Fut>(
        &self,
        url: &str,
        tx: &EventSender,
        mut send: F,
    ) -> Result<Response, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Response, reqwest::Error>>,
    {
        let target = target_key(url)?;
        let breaker = self.registry.breaker(&target);
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            if let Err(retry_after) = breaker.try_acquire() {
                tx.emit_resilience(ResilienceEvent::CircuitRejected {
                    target: target.clone(),
                    retry_after,
                });
                return Err(NetworkError::CircuitOpen {
                    target,
                    retry_after_ms: u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                }
                .into());
            }

            match send().await {
                Ok(response) => {
                    let status = response.status();
                    if !is_transient_status(status) {
                        if breaker.record_success() {
                            tx.emit_resilience(ResilienceEvent::CircuitClosed {
                                target: target.clone(),
                            });
                        }
                        if status == StatusCode::TOO_MANY_REQUESTS {
                            if let Some(seconds) = retry_after_seconds(&response) {
                                return Err(NetworkError::RateLimited { seconds }.into());
                            }
                        }
                        return Ok(response);
                    }

                    self.note_failure(&breaker, &target, tx);
                    if attempt == max_attempts {
                        tracing::debug!(%target, %status, attempt, "retries exhausted on status");
                        return Ok(response);
                    }
                    last_reason = format!("HTTP {status}");
                }
                Err(err) => {
                    if !is_transient_error(&err) {
                        return Err(convert_error(&err));
                    }
                    self.note_failure(&breaker, &target, tx);
                    last_reason = err.to_string();
                    if attempt == max_attempts {
                        break;
                    }
                }
            }

            tracing::debug!(%target, attempt, reason = %last_reason, "scheduling retry");
            tx.emit_resilience(ResilienceEvent::RetryScheduled {
                target: target.clone(),
                attempt,
                max_attempts,
                reason: last_reason.clone(),
                delay: self.retry.delay,
            });
            tokio::time::sleep(self.retry.delay).await;
        }

        Err(NetworkError::RetriesExhausted {
            attempts: max_attempts,
            reason: last_reason,
        }
        .into())
    }

    fn note_failure(&self, breaker: &CircuitBreaker, target: &str, tx: &EventSender) {
        if let Some(consecutive_failures) = breaker.record_failure() {
            tracing::warn!(%target, consecutive_failures, "circuit opened");
            tx.emit_resilience(ResilienceEvent::CircuitOpened {
                target: target.to_string(),
                consecutive_failures,
                cooldown: breaker.settings().cooldown,
            });
        }
    }
}

/// Breaker key for a URL: its origin, so all paths on one portal share state
///
/// # Errors
///
/// Returns `NetworkError::InvalidUrl` if `url` does not parse.
pub fn target_key(url: &str) -> Result<String, Error> {
    let parsed = Url::parse(url).map_err(|e| NetworkError::InvalidUrl(e.to_string()))?;
    Ok(parsed.origin().ascii_serialization())
}

fn retry_after_seconds(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

fn convert_error(err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        NetworkError::Timeout {
            url: err
                .url()
                .map(std::string::ToString::to_string)
                .unwrap_or_default(),
        }
        .into()
    } else if err.is_connect() {
        NetworkError::ConnectionRefused(err.to_string()).into()
    } else {
        NetworkError::RequestFailed(err.to_string()).into()
    }
}
