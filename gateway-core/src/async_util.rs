use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::error::{Error, Result};

/// Polls `condition` until it returns `true` or `deadline` elapses, sleeping between
/// attempts with exponential backoff from `initial_delay` up to `max_delay`, growing by
/// `backoff` each attempt (spec §4.7: `poll_condition(f, timeout, initial_delay,
/// max_delay, backoff)`).
pub async fn poll_condition<F, Fut>(
    mut condition: F,
    deadline: Duration,
    initial_delay: Duration,
    max_delay: Duration,
    backoff: f64,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    let mut delay = initial_delay;
    loop {
        if condition().await {
            return true;
        }
        let elapsed = start.elapsed();
        if elapsed >= deadline {
            return false;
        }
        let remaining = deadline - elapsed;
        sleep(delay.min(remaining)).await;
        delay = delay.mul_f64(backoff).min(max_delay);
    }
}

/// Retries `op` with exponential backoff (`base * 2^(attempt-1)`, capped at `max`)
/// while `should_retry` accepts the error and attempts remain; otherwise propagates it.
pub async fn with_retry<F, Fut, T, R>(
    mut op: F,
    max_attempts: u32,
    base: Duration,
    max: Duration,
    mut should_retry: R,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    R: FnMut(&Error) -> bool,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_attempts || !should_retry(&err) {
                    return Err(err);
                }
                let backoff = base.saturating_mul(1 << (attempt - 1)).min(max);
                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

/// Races `fut` against `sleep(duration)`; on timeout, `fut` is dropped (cancelling it)
/// and the call fails with [`Error::Timeout`].
pub async fn with_timeout<Fut, T>(duration: Duration, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    tokio::select! {
        result = fut => result,
        _ = sleep(duration) => Err(Error::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn poll_condition_returns_true_once_satisfied() {
        let calls = AtomicU32::new(0);
        let ok = poll_condition(
            || async { calls.fetch_add(1, Ordering::SeqCst) >= 2 },
            Duration::from_millis(500),
            Duration::from_millis(2),
            Duration::from_millis(20),
            2.0,
        )
        .await;
        assert!(ok);
    }

    #[tokio::test]
    async fn poll_condition_times_out() {
        let ok = poll_condition(
            || async { false },
            Duration::from_millis(20),
            Duration::from_millis(2),
            Duration::from_millis(5),
            2.0,
        )
        .await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn poll_condition_honours_a_shallower_backoff_factor() {
        let calls = AtomicU32::new(0);
        let ok = poll_condition(
            || async { calls.fetch_add(1, Ordering::SeqCst) >= 3 },
            Duration::from_millis(500),
            Duration::from_millis(2),
            Duration::from_millis(20),
            1.5,
        )
        .await;
        assert!(ok);
    }

    #[tokio::test]
    async fn with_retry_stops_when_should_retry_declines() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Busy)
            },
            5,
            Duration::from_millis(1),
            Duration::from_millis(5),
            |err| !matches!(err, Error::Busy),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn with_retry_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Timeout)
            },
            3,
            Duration::from_millis(1),
            Duration::from_millis(5),
            |_| true,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn with_timeout_maps_elapsed_timer() {
        let result: Result<()> = with_timeout(Duration::from_millis(10), async {
            sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout)));
    }
}
