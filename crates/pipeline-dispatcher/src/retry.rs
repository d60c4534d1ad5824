// crates/pipeline-dispatcher/src/retry.rs
// ============================================================================
// Module: Retry / Backoff
// Description: Exponential-backoff retry wrapper for outbound HTTP calls.
// Purpose: Implements the Stage Dispatcher's 2s/4s/8s, max-3-retry policy
//          around `pipeline_providers::HttpGateway::send`.
// Dependencies: pipeline_providers, std::time, std::thread
// ============================================================================

//! ## Overview
//! [`send_with_retry`] retries a request on a `>= 500` response or a
//! transport-level [`HttpError`], sleeping the configured delay between
//! attempts. Non-5xx responses (including 4xx) return immediately with no
//! retry. Sleeping is abstracted behind [`Sleeper`] so tests can assert on
//! attempt counts without incurring real wall-clock delay.

use std::time::Duration;

use pipeline_providers::HttpError;
use pipeline_providers::HttpGateway;
use pipeline_providers::HttpRequest;
use pipeline_providers::HttpResponse;

/// Abstracts the backoff sleep so tests don't pay real wall-clock delay.
pub trait Sleeper: Send + Sync {
    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeper backed by `std::thread::sleep`, used outside tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealSleeper;

impl Sleeper for RealSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Retry/backoff tuning, matching `spec.md` §4.7's documented defaults.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the first (default 3).
    pub max_retries: u32,
    /// Delay before each retry attempt, indexed by retry number.
    pub delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, delays: vec![Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(8)] }
    }
}

/// Outcome of a request that exhausted its retry budget.
#[derive(Debug, Clone)]
pub enum RetryExhausted {
    /// The last attempt returned a `>= 500` response.
    ServerError {
        /// Final HTTP status observed.
        status: u16,
    },
    /// The last attempt failed at the transport layer.
    Transport(String),
}

impl std::fmt::Display for RetryExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServerError { status } => write!(f, "exhausted retries, last response status {status}"),
            Self::Transport(message) => write!(f, "exhausted retries, last transport error: {message}"),
        }
    }
}

impl std::error::Error for RetryExhausted {}

/// Sends `request` through `gateway`, retrying per `policy` on `>= 500`
/// responses or transport errors. Non-5xx responses return immediately.
///
/// # Errors
/// Returns [`RetryExhausted`] once the retry budget is spent, or
/// immediately on a validation-level [`HttpError`] (invalid URL) that a
/// retry could never fix.
pub fn send_with_retry(
    gateway: &HttpGateway,
    request: &HttpRequest,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
) -> Result<HttpResponse, RetryExhausted> {
    let mut attempt = 0u32;
    loop {
        match gateway.send(request) {
            Ok(response) if response.is_server_error() => {
                if attempt >= policy.max_retries {
                    return Err(RetryExhausted::ServerError { status: response.status });
                }
            }
            Ok(response) => return Ok(response),
            Err(HttpError::Transport(message)) => {
                if attempt >= policy.max_retries {
                    return Err(RetryExhausted::Transport(message));
                }
            }
            Err(other) => return Err(RetryExhausted::Transport(other.to_string())),
        }
        let delay = policy.delays.get(attempt as usize).copied().unwrap_or(Duration::from_secs(8));
        sleeper.sleep(delay);
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Duration;

    use pipeline_providers::HttpGateway;
    use pipeline_providers::HttpGatewayConfig;
    use pipeline_providers::HttpRequest;

    use super::send_with_retry;
    use super::RetryPolicy;
    use super::Sleeper;

    struct NoopSleeper {
        calls: Cell<u32>,
    }

    impl Sleeper for NoopSleeper {
        fn sleep(&self, _duration: Duration) {
            self.calls.set(self.calls.get() + 1);
        }
    }

    #[test]
    fn retries_exhaust_after_configured_attempts() {
        let gateway = HttpGateway::new(HttpGatewayConfig::default()).expect("gateway");
        let policy = RetryPolicy { max_retries: 2, delays: vec![Duration::ZERO, Duration::ZERO] };
        let sleeper = NoopSleeper { calls: Cell::new(0) };
        // no server listening on this port: every attempt fails transport-level.
        let request = HttpRequest::get("https://127.0.0.1:1/");
        let result = send_with_retry(&gateway, &request, &policy, &sleeper);
        assert!(result.is_err());
        assert_eq!(sleeper.calls.get(), 2);
    }
}
