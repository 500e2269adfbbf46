//! Retry with fixed backoff for operations whose errors classify as
//! retryable.

use std::future::Future;
use std::time::Duration;

use gas_core::error::Classify;

/// Backoff between attempts: 1s, 2s, 4s. Four attempts in total.
pub const DEFAULT_RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// delays are exhausted. Returns the last error.
pub async fn with_retry<T, E, F, Fut>(what: &str, delays: &[Duration], mut op: F) -> Result<T, E>
where
    E: Classify + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.class().is_retryable() && attempt < delays.len() => {
                let delay = delays[attempt];
                attempt += 1;
                tracing::warn!(
                    operation = what,
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after failure",
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use gas_core::error::CoreError;

    use super::*;

    const FAST: [Duration; 3] = [Duration::ZERO; 3];

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<u32, std::io::Error> = with_retry("op", &FAST, move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(std::io::Error::other("flaky"))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_all_delays() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), std::io::Error> = with_retry("op", &FAST, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(std::io::Error::other("down"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), CoreError> = with_retry("op", &FAST, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::Validation("bad".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
