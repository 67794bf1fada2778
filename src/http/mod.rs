// Shared blocking HTTP plumbing for the Ollama, Gemini and feed clients


use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HttpError {
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("Transport error: {0}")]
    Transport(String),
}

impl HttpError {
    #[inline]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Status(status) if (400..500).contains(status))
    }
}

/// How many times a request is attempted and how long to back off between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    #[inline]
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    #[inline]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay after the given failed attempt (1-based)
    #[inline]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(EXPONENTIAL_BACKOFF_BASE.saturating_pow(attempt.saturating_sub(1)))
    }
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self::new(3)
    }
}

/// Agent with a global per-request timeout
#[inline]
pub fn agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Run `request_fn` until it succeeds, a client error occurs, or attempts run out.
///
/// Transport failures and 5xx responses are retried with exponential backoff.
#[inline]
pub fn call_with_retry<F>(
    policy: &RetryPolicy,
    target: &str,
    mut request_fn: F,
) -> Result<String, HttpError>
where
    F: FnMut() -> Result<String, ureq::Error>,
{
    let mut last_error = None;

    for attempt in 1..=policy.attempts {
        debug!("HTTP request attempt {}/{} to {}", attempt, policy.attempts, target);

        let error = match request_fn() {
            Ok(response_text) => {
                debug!("Request succeeded on attempt {}", attempt);
                return Ok(response_text);
            }
            Err(error) => error,
        };

        match &error {
            ureq::Error::StatusCode(status) if *status >= 500 => {
                warn!(
                    "Server error (status {}), attempt {}/{}",
                    status, attempt, policy.attempts
                );
                last_error = Some(HttpError::Status(*status));
            }
            ureq::Error::StatusCode(status) => {
                warn!("Client error (status {}), not retrying", status);
                return Err(HttpError::Status(*status));
            }
            ureq::Error::ConnectionFailed
            | ureq::Error::HostNotFound
            | ureq::Error::Timeout(_)
            | ureq::Error::Io(_) => {
                warn!(
                    "Transport error: {}, attempt {}/{}",
                    error, attempt, policy.attempts
                );
                last_error = Some(HttpError::Transport(error.to_string()));
            }
            _ => {
                warn!("Non-retryable error: {}", error);
                return Err(HttpError::Transport(error.to_string()));
            }
        }

        if attempt < policy.attempts {
            let delay = policy.delay_after(attempt);
            debug!("Waiting {:?} before retry", delay);
            std::thread::sleep(delay);
        }
    }

    error!("All retry attempts failed for request to {}", target);
    Err(last_error.unwrap_or_else(|| HttpError::Transport("request was never attempted".to_string())))
}
