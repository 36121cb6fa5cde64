//! Conflict retry helper
//!
//! Handlers never retry on their own. A caller that wants retries wraps the
//! whole command, so every attempt re-reads state and re-validates.

use std::future::Future;
use std::time::Duration;

use crate::error::LedgerResult;

/// Run `command` until it succeeds, fails with a non-conflict error, or
/// `max_attempts` is reached. Sleeps `backoff * attempt` between attempts and
/// returns the last error when attempts run out.
pub async fn retry_on_conflict<T, F, Fut>(
    max_attempts: u32,
    backoff: Duration,
    mut command: F,
) -> LedgerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LedgerResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match command().await {
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                tracing::debug!(attempt, error = %err, "retrying command after conflict");
                tokio::time::sleep(backoff * attempt).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;
    use crate::error::{ErrorKind, LedgerError};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn conflict() -> LedgerError {
        LedgerError::ConcurrencyConflict {
            aggregate_id: "a".to_string(),
            expected: 1,
            actual: 2,
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result = retry_on_conflict(5, Duration::ZERO, || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(conflict())
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_with_last_conflict() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: LedgerResult<()> = retry_on_conflict(3, Duration::ZERO, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(conflict())
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::ConcurrencyConflict);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_domain_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: LedgerResult<()> = retry_on_conflict(3, Duration::ZERO, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DomainError::NotFound("a".to_string()).into())
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
