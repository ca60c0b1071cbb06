//! Retry-with-backoff helper shared by components that talk to a flaky
//! collaborator (the repository, the PostgreSQL server, a worker pipe).
//!
//! Mirrors the call shape used throughout the storage client: pass the
//! fallible operation, a predicate that tells permanent failures from
//! retryable ones, how many attempts to allow before escalating a log to a
//! warning, a hard cap on attempts, a human label for the log lines, and a
//! cancellation token. Returns `None` if cancelled before a result was
//! produced.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

const BASE_DELAY: Duration = Duration::from_millis(100);
const MAX_DELAY: Duration = Duration::from_secs(10);

pub async fn retry<T, E, Fut, Op, Permanent>(
    mut op: Op,
    is_permanent: Permanent,
    warn_threshold: u32,
    max_retries: u32,
    description: &str,
    cancel: &CancellationToken,
) -> Option<Result<T, E>>
where
    Op: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    Permanent: Fn(&E) -> bool,
{
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return None;
        }

        let result = op().await;

        match result {
            Ok(v) => return Some(Ok(v)),
            Err(e) if is_permanent(&e) => return Some(Err(e)),
            Err(e) => {
                attempt += 1;
                if attempt > max_retries {
                    tracing::warn!(attempt, description, "giving up after max retries");
                    return Some(Err(e));
                }

                let delay = std::cmp::min(BASE_DELAY * 2u32.saturating_pow(attempt), MAX_DELAY);
                if attempt >= warn_threshold {
                    tracing::warn!(attempt, description, delay_ms = %delay.as_millis(), "retrying after error");
                } else {
                    tracing::debug!(attempt, description, delay_ms = %delay.as_millis(), "retrying after error");
                }

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let attempts = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Option<Result<u32, &'static str>> = retry(
            || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err("not yet")
                } else {
                    Ok(n)
                }
            },
            |_| false,
            5,
            5,
            "test op",
            &cancel,
        )
        .await;

        assert_eq!(result, Some(Ok(2)));
    }

    #[tokio::test]
    async fn stops_on_permanent_error() {
        let cancel = CancellationToken::new();
        let result: Option<Result<u32, &'static str>> =
            retry(|| async { Err("fatal") }, |_| true, 5, 5, "test op", &cancel).await;
        assert_eq!(result, Some(Err("fatal")));
    }

    #[tokio::test]
    async fn cancel_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Option<Result<u32, &'static str>> =
            retry(|| async { Err("retry me") }, |_| false, 1, 50, "test op", &cancel).await;
        assert_eq!(result, None);
    }
}
