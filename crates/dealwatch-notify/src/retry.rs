//! Exponential back-off with jitter for webhook delivery.
//!
//! Timeouts, connection failures, and 5xx answers are retried. Client errors
//! (4xx) and configuration problems are returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use crate::error::NotifyError;

const MAX_DELAY_MS: u64 = 30_000;

pub(crate) fn is_retriable(err: &NotifyError) -> bool {
    match err {
        NotifyError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        NotifyError::UnexpectedStatus { status, .. } => *status >= 500,
        NotifyError::InvalidUrl { .. } => false,
    }
}

/// Delay before retry number `attempt` (1-based), before jitter.
fn base_delay_ms(backoff_base_ms: u64, attempt: u32) -> u64 {
    backoff_base_ms
        .saturating_mul(1u64 << attempt.saturating_sub(1).min(10))
        .min(MAX_DELAY_MS)
}

/// Runs `operation`, retrying transient failures up to `max_retries` times.
///
/// With `backoff_base_ms = 1_000` the sleeps are roughly 1 s, 2 s, 4 s, …,
/// each scaled by a random factor in `[0.75, 1.25)` and capped at 30 s.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, NotifyError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, NotifyError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let capped = base_delay_ms(backoff_base_ms, attempt);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "webhook delivery failed, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn status_err(status: u16) -> NotifyError {
        NotifyError::UnexpectedStatus {
            status,
            body: String::new(),
        }
    }

    #[test]
    fn server_errors_are_retriable() {
        assert!(is_retriable(&status_err(500)));
        assert!(is_retriable(&status_err(503)));
    }

    #[test]
    fn client_errors_are_not_retriable() {
        assert!(!is_retriable(&status_err(400)));
        assert!(!is_retriable(&status_err(404)));
        assert!(!is_retriable(&status_err(429)));
    }

    #[test]
    fn invalid_url_is_not_retriable() {
        assert!(!is_retriable(&NotifyError::InvalidUrl {
            url: "nope".to_owned(),
            reason: "relative URL without a base".to_owned(),
        }));
    }

    #[test]
    fn delay_doubles_and_caps() {
        assert_eq!(base_delay_ms(1_000, 1), 1_000);
        assert_eq!(base_delay_ms(1_000, 2), 2_000);
        assert_eq!(base_delay_ms(1_000, 3), 4_000);
        assert_eq!(base_delay_ms(1_000, 9), MAX_DELAY_MS);
        assert_eq!(base_delay_ms(u64::MAX, 4), MAX_DELAY_MS);
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(status_err(502))
                } else {
                    Ok("delivered")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "delivered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(2, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(status_err(500))
            }
        })
        .await;
        assert!(matches!(
            result,
            Err(NotifyError::UnexpectedStatus { status: 500, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3, "1 attempt + 2 retries");
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(status_err(422))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "4xx must not be retried");
    }

    #[tokio::test]
    async fn retries_connection_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(1, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                let err = reqwest::Client::new()
                    .post("http://127.0.0.1:1/hook")
                    .send()
                    .await
                    .unwrap_err();
                Err::<(), _>(NotifyError::Http(err))
            }
        })
        .await;
        assert!(matches!(result, Err(NotifyError::Http(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
