use std::fmt;
use std::time::Duration;

/// Failures at the provider boundary.
///
/// `RateLimited` and `Transport` are retried by the client itself; everything
/// else propagates unchanged. `NotFound` is a value, not a fault — single
/// retrieves surface it as `Ok(None)` and only internal plumbing sees the
/// variant.
#[derive(Debug)]
pub enum StripeError {
    /// The credential was rejected (401/403). Fatal; never retried.
    Auth(String),
    /// HTTP 429. `retry_after` is the provider-suggested delay, when sent.
    RateLimited { retry_after: Option<Duration> },
    /// Network failure or 5xx after retries were exhausted.
    Transport(String),
    /// A non-retryable application error from the API (4xx other than
    /// 401/403/404/429).
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },
    /// A response payload could not be decoded.
    Decode(String),
    /// Webhook signature verification failed.
    Signature(String),
    /// The object does not exist (404 on single retrieve).
    NotFound,
}

impl StripeError {
    /// Whether the client's retry loop should take another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StripeError::RateLimited { .. } | StripeError::Transport(_)
        )
    }
}

impl fmt::Display for StripeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StripeError::Auth(msg) => write!(f, "authentication rejected: {msg}"),
            StripeError::RateLimited {
                retry_after: Some(d),
            } => write!(f, "rate limited (retry after {}s)", d.as_secs()),
            StripeError::RateLimited { retry_after: None } => write!(f, "rate limited"),
            StripeError::Transport(msg) => write!(f, "transport error: {msg}"),
            StripeError::Api {
                status,
                code: Some(code),
                message,
            } => write!(f, "api error {status} [{code}]: {message}"),
            StripeError::Api {
                status,
                code: None,
                message,
            } => write!(f, "api error {status}: {message}"),
            StripeError::Decode(msg) => write!(f, "decode error: {msg}"),
            StripeError::Signature(msg) => write!(f, "signature verification failed: {msg}"),
            StripeError::NotFound => write!(f, "object not found"),
        }
    }
}

impl std::error::Error for StripeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(StripeError::RateLimited { retry_after: None }.is_retryable());
        assert!(StripeError::Transport("reset".into()).is_retryable());
        assert!(!StripeError::Auth("bad key".into()).is_retryable());
        assert!(!StripeError::NotFound.is_retryable());
        assert!(!StripeError::Signature("no v1".into()).is_retryable());
    }

    #[test]
    fn display_carries_status_and_code() {
        let e = StripeError::Api {
            status: 402,
            code: Some("card_declined".into()),
            message: "declined".into(),
        };
        assert_eq!(e.to_string(), "api error 402 [card_declined]: declined");
    }
}
