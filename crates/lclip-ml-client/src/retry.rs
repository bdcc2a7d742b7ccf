//! Retry with exponential backoff for model calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::MlResult;

/// Maximum attempts per model call (initial attempt + 2 retries).
const MAX_ATTEMPTS: u32 = 3;

/// Base backoff delay; doubles per attempt.
const BASE_DELAY: Duration = Duration::from_secs(2);

/// Run a model call with retry on transient failures.
///
/// Auth and shape errors surface immediately; transient and rate-limit
/// errors back off at 2s, 4s before the final attempt.
pub(crate) async fn with_retry<T, F, Fut>(operation: &str, f: F) -> MlResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = MlResult<T>>,
{
    let mut attempt = 0u32;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                attempt += 1;
                let delay = BASE_DELAY * 2u32.pow(attempt - 1);
                warn!(
                    operation,
                    attempt,
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "Model call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MlError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(MlError::transient("flaky"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: MlResult<u32> = with_retry("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(MlError::Auth("bad key".into())) }
        })
        .await;
        assert!(matches!(result, Err(MlError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_three_attempts() {
        let calls = AtomicU32::new(0);
        let result: MlResult<u32> = with_retry("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(MlError::transient("down")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
