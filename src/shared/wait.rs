//! Bounded condition polling.
//!
//! Every wait in the pipeline (element visible, redirect settled, document
//! ready, download finished) goes through [`poll_until`], so there is a
//! single place where timeouts turn into errors.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::domain::error::{AppError, Result};

/// Polls `check` every `interval` until it yields `Some`, an error, or the
/// timeout elapses. The check always runs at least once, and once more
/// right at the deadline, so a condition met during the last sleep is not
/// reported as a timeout.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(value) = check().await? {
            return Ok(value);
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(AppError::Timeout(format!(
                "{} (after {:.1}s)",
                what,
                timeout.as_secs_f64()
            )));
        }

        sleep(interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn test_returns_first_ready_value() {
        let calls = Cell::new(0);
        let value = poll_until(
            "counter",
            Duration::from_secs(1),
            Duration::from_millis(5),
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { Ok(if n >= 3 { Some(n) } else { None }) }
            },
        )
        .await
        .unwrap();

        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_times_out_with_description() {
        let err = poll_until::<(), _, _>(
            "element [name=email]",
            Duration::from_millis(30),
            Duration::from_millis(5),
            || async { Ok(None) },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Timeout(_)));
        assert!(err.to_string().contains("element [name=email]"));
    }

    #[tokio::test]
    async fn test_check_errors_stop_polling() {
        let calls = Cell::new(0);
        let err = poll_until::<(), _, _>(
            "broken check",
            Duration::from_secs(1),
            Duration::from_millis(5),
            || {
                calls.set(calls.get() + 1);
                async { Err(AppError::BrowserError("session deleted".to_string())) }
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::BrowserError(_)));
        assert_eq!(calls.get(), 1);
    }
}
