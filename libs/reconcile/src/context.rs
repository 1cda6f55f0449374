//! Execution context for provider calls and waits.
//!
//! Every gateway call and poll loop receives an [`OpContext`]. It carries a
//! cancellation token and an optional deadline; both are checked before work
//! starts and raced against any in-flight future, so a cancelled operation
//! drops its pending HTTP request instead of waiting for it to finish.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why an operation stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    /// The context was cancelled explicitly (host gave up, process shutdown).
    #[error("operation cancelled")]
    Cancelled,

    /// The context deadline passed.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellable, deadline-bearing execution context.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl OpContext {
    /// Create an unbounded context.
    ///
    /// Production callers should always attach a timeout; the poll loop has
    /// no attempt ceiling of its own.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context driven by an existing cancellation token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Bound the context by `timeout` from now. An earlier existing deadline wins.
    ///
    /// A timeout too large to represent as an instant leaves the context
    /// without a new deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self;
        };
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Derive a context that is cancelled with its parent but can be
    /// cancelled independently.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel this context and all contexts derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the context is already cancelled or past its deadline.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.token.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Interrupted::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Drive `fut` to completion unless the context is interrupted first.
    ///
    /// On interruption the future is dropped.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Interrupted::Cancelled),
            _ = deadline => Err(Interrupted::DeadlineExceeded),
            output = fut => Ok(output),
        }
    }

    /// Non-busy sleep that wakes early on interruption.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        self.run(tokio::time::sleep(duration)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_run_completes_when_not_interrupted() {
        let ctx = OpContext::new().with_timeout(Duration::from_secs(10));
        let value = ctx.run(async { 7 }).await;
        assert_eq!(value, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_sleep() {
        let ctx = OpContext::new().with_timeout(Duration::from_secs(3));
        let start = Instant::now();

        let result = ctx.sleep(Duration::from_secs(60)).await;

        assert_eq!(result, Err(Interrupted::DeadlineExceeded));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_wakes_sleep() {
        let ctx = OpContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let result = ctx.sleep(Duration::from_secs(60)).await;

        assert_eq!(result, Err(Interrupted::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_child_follows_parent_cancellation() {
        let parent = OpContext::new();
        let child = parent.child();

        child.cancel();
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert_eq!(other.check(), Err(Interrupted::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_deadline_wins() {
        let ctx = OpContext::new()
            .with_timeout(Duration::from_secs(5))
            .with_timeout(Duration::from_secs(50));
        let expected = Instant::now() + Duration::from_secs(5);
        assert_eq!(ctx.deadline(), Some(expected));
    }

    #[tokio::test]
    async fn test_unrepresentable_timeout_leaves_no_deadline() {
        let ctx = OpContext::new().with_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(ctx.deadline(), None);
        assert_eq!(ctx.check(), Ok(()));
        assert_eq!(ctx.run(async { 7 }).await, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_keeps_existing_deadline() {
        let ctx = OpContext::new()
            .with_timeout(Duration::from_secs(5))
            .with_timeout(Duration::MAX);
        let expected = Instant::now() + Duration::from_secs(5);
        assert_eq!(ctx.deadline(), Some(expected));
    }
}
