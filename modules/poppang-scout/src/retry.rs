use std::future::Future;

use anyhow::Result;
use poppang_common::{PoppangError, RetryConfig};
use tracing::warn;

/// Run `op`, retrying up to `policy.max_retries` more times with a fixed delay.
///
/// Once attempts are exhausted the last error is returned as a
/// [`PoppangError::Transport`].
pub async fn with_retry<T, F, Fut>(what: &str, policy: RetryConfig, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries => {
                attempt += 1;
                warn!(what, attempt, error = %e, "Transport failure, retrying");
                if !policy.delay().is_zero() {
                    tokio::time::sleep(policy.delay()).await;
                }
            }
            Err(e) => {
                return Err(PoppangError::Transport(format!(
                    "{what} failed after {} attempts: {e:#}",
                    attempt + 1
                ))
                .into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    const NO_DELAY: RetryConfig = RetryConfig {
        max_retries: 2,
        delay_ms: 0,
    };

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = &AtomicU32::new(0);
        let value = with_retry("op", NO_DELAY, move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                anyhow::bail!("flaky");
            }
            Ok(7)
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = with_retry("op", NO_DELAY, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("down")
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PoppangError>(),
            Some(PoppangError::Transport(m)) if m == "op failed after 3 attempts: down"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
