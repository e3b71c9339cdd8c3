//! Database retry logic
//!
//! Exponential backoff for transient store failures (SQLite lock contention).

use std::time::{Duration, Instant};

use crate::{Error, Result};

/// Default total retry budget for a single store operation
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Whether an error is worth retrying locally
fn is_retryable(err: &Error) -> bool {
    match err {
        Error::Database(db_err) => {
            let message = db_err.to_string();
            message.contains("database is locked") || message.contains("database table is locked")
        }
        Error::TransientIo(_) => true,
        _ => false,
    }
}

/// Retry a store operation with exponential backoff until `max_wait_ms` elapses.
///
/// **Algorithm:**
/// 1. Attempt operation
/// 2. If successful, return result
/// 3. If lock contention / transient failure:
///    a. Within budget: log WARN, back off, retry
///    b. Budget exhausted: log ERROR, return `Error::TransientIo`
/// 4. Any other error is returned immediately. Conflicts in particular are
///    never retried here; the caller decides.
///
/// **Backoff:** starts at 10ms, doubles, capped at 1000ms.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    let elapsed_ms = start_time.elapsed().as_millis();
                    if elapsed_ms > 2000 {
                        tracing::warn!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms,
                            "Store operation succeeded after significant retry period (>2s)"
                        );
                    } else {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms,
                            "Store operation succeeded after retry"
                        );
                    }
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    return Err(err);
                }

                let elapsed = start_time.elapsed();
                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis(),
                        max_wait_ms,
                        error = %err,
                        "Store operation failed: max retry time exceeded"
                    );
                    return Err(Error::TransientIo(format!(
                        "{} still failing after {} attempts ({} ms): {}",
                        operation_name,
                        attempt,
                        elapsed.as_millis(),
                        err
                    )));
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    remaining_ms = max_duration.saturating_sub(elapsed).as_millis(),
                    "Store busy, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(1000);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        let result = retry_on_lock("test_op", 5000, || async { Ok::<i32, Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let attempts = AtomicU32::new(0);

        let result = retry_on_lock("test_op", 5000, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(Error::TransientIo("store busy".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_wait() {
        let result = retry_on_lock("test_op", 50, || async {
            Err::<i32, Error>(Error::TransientIo("store busy".to_string()))
        })
        .await;

        assert!(matches!(result, Err(Error::TransientIo(_))));
    }

    #[tokio::test]
    async fn test_conflict_is_not_retried() {
        let attempts = AtomicU32::new(0);

        let result = retry_on_lock("test_op", 5000, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, Error>(Error::Conflict("already processed".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
