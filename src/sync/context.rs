//! Deadline-scoped, cancellable execution context shared by one sync run

use crate::error::{Result, SinkerError};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Roughly 30 years; effectively no deadline.
pub const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Bounds every registry call of a run by one absolute deadline and one
/// cancellation token. Clones share both.
#[derive(Debug, Clone)]
pub struct SyncContext {
    deadline: Instant,
    cancel_token: CancellationToken,
}

impl SyncContext {
    /// Context whose deadline is `timeout` from now. Timeouts past what the
    /// clock can represent are clamped to [`FAR_FUTURE`].
    pub fn with_timeout(timeout: Duration) -> Self {
        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        Self {
            deadline,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Token that fires when this context is cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Fails if the context is already cancelled or past its deadline.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(SinkerError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(SinkerError::Timeout);
        }
        Ok(())
    }

    /// Drives `operation` until it completes, the deadline passes, or the
    /// context is cancelled, whichever happens first.
    pub async fn run<F, T>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(SinkerError::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => Err(SinkerError::Timeout),
            result = operation => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes_before_deadline() {
        let ctx = SyncContext::with_timeout(Duration::from_secs(5));
        let value = ctx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_times_out() {
        let ctx = SyncContext::with_timeout(Duration::from_millis(50));
        let result: Result<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(SinkerError::Timeout)));
    }

    #[tokio::test]
    async fn test_run_observes_cancellation() {
        let ctx = SyncContext::with_timeout(Duration::from_secs(60));
        let canceller = ctx.clone();
        let result: Result<()> = ctx
            .run(async move {
                canceller.cancel();
                std::future::pending::<()>().await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(SinkerError::Cancelled)));
    }

    #[tokio::test]
    async fn test_check_after_cancel() {
        let ctx = SyncContext::with_timeout(Duration::from_secs(60));
        assert!(ctx.check().is_ok());
        ctx.cancel();
        assert!(matches!(ctx.check(), Err(SinkerError::Cancelled)));
    }

    #[tokio::test]
    async fn test_huge_timeout_does_not_overflow() {
        let ctx = SyncContext::with_timeout(Duration::from_secs(u64::MAX));
        assert!(ctx.check().is_ok());
        let value = ctx.run(async { Ok(1) }).await.unwrap();
        assert_eq!(value, 1);
    }
}
