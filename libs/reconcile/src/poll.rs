//! Status polling and fixed-delay retry.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::context::{Interrupted, OpContext};

/// One observation of a polled resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<S> {
    /// The resource exists and reports this status.
    Status(S),

    /// The resource no longer exists.
    Gone,
}

/// Errors returned by [`wait_for`].
#[derive(Debug, Error)]
pub enum WaitError<E> {
    /// The resource entered a failure status. Not retried.
    #[error("{resource} entered failure status {status}")]
    Failed { resource: String, status: String },

    /// Fetching the resource status failed.
    #[error("failed to fetch status of {resource}: {source}")]
    Fetch {
        resource: String,
        #[source]
        source: E,
    },

    /// The context was cancelled or timed out while waiting.
    #[error("stopped waiting for {resource}: {source}")]
    Interrupted {
        resource: String,
        #[source]
        source: Interrupted,
    },
}

/// Poll `fetch` until the resource reaches a terminal status, a failure
/// status, or disappears.
///
/// There is no attempt ceiling: the loop ends only on one of those outcomes,
/// a fetch error, or interruption of `ctx`. Callers bound the wait with
/// [`OpContext::with_timeout`].
///
/// [`Probe::Gone`] ends the wait successfully. Callers that must not accept a
/// vanished resource report it as a fetch error instead.
pub async fn wait_for<S, E, F, Fut>(
    ctx: &OpContext,
    resource: &str,
    interval: Duration,
    mut fetch: F,
    is_terminal: impl Fn(&S) -> bool,
    is_failed: impl Fn(&S) -> bool,
) -> Result<Probe<S>, WaitError<E>>
where
    S: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe<S>, E>>,
{
    let interrupted = |source: Interrupted| -> WaitError<E> {
        WaitError::Interrupted {
            resource: resource.to_string(),
            source,
        }
    };

    let mut attempt: u32 = 0;
    loop {
        ctx.check().map_err(interrupted)?;
        attempt += 1;

        let probe = ctx
            .run(fetch())
            .await
            .map_err(interrupted)?
            .map_err(|source| WaitError::Fetch {
                resource: resource.to_string(),
                source,
            })?;

        let status = match probe {
            Probe::Gone => {
                debug!(resource, attempt, "Resource is gone");
                return Ok(Probe::Gone);
            }
            Probe::Status(status) => status,
        };

        if is_failed(&status) {
            warn!(resource, attempt, status = %status, "Resource entered failure status");
            return Err(WaitError::Failed {
                resource: resource.to_string(),
                status: status.to_string(),
            });
        }

        if is_terminal(&status) {
            debug!(resource, attempt, status = %status, "Resource reached target status");
            return Ok(Probe::Status(status));
        }

        debug!(
            resource,
            attempt,
            status = %status,
            interval_secs = interval.as_secs_f64(),
            "Resource not settled, polling again"
        );
        ctx.sleep(interval).await.map_err(interrupted)?;
    }
}

/// Fixed-delay retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRetry {
    /// Total number of calls, including the first one.
    pub attempts: u32,

    /// Delay between consecutive calls.
    pub delay: Duration,
}

impl Default for FixedRetry {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Default attempt budget for [`retry_fixed`].
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// Default delay for [`retry_fixed`].
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Call `op` until it succeeds or the budget is spent, returning the last
/// error. Never sleeps after the final attempt.
pub async fn retry_fixed<T, E, F, Fut>(ctx: &OpContext, policy: FixedRetry, op: F) -> Result<T, E>
where
    E: From<Interrupted> + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_fixed_when(ctx, policy, |_: &E| true, op).await
}

/// Like [`retry_fixed`], but an error for which `retryable` returns false is
/// returned at once.
pub async fn retry_fixed_when<T, E, F, Fut>(
    ctx: &OpContext,
    policy: FixedRetry,
    retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    E: From<Interrupted> + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        ctx.check()?;

        match ctx.run(op()).await? {
            Ok(value) => return Ok(value),
            Err(err) if !retryable(&err) => {
                debug!(attempt, error = %err, "Attempt failed permanently");
                return Err(err);
            }
            Err(err) if attempt >= attempts => {
                warn!(attempt, attempts, error = %err, "Retry budget exhausted");
                return Err(err);
            }
            Err(err) => {
                debug!(attempt, attempts, error = %err, "Attempt failed, retrying");
                ctx.sleep(policy.delay).await?;
                attempt += 1;
            }
        }
    }
}
