//! Process shutdown.

use std::future::Future;
use std::io;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Wait for `signal`, then cancel `token`.
///
/// If the signal handler cannot be installed the process keeps serving and
/// this never returns.
pub async fn cancel_on_signal<S>(signal: S, token: CancellationToken)
where
    S: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
    token.cancel();
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_signal_cancels_token() {
        let token = CancellationToken::new();

        cancel_on_signal(async { Ok(()) }, token.clone()).await;

        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_signal_keeps_serving() {
        let token = CancellationToken::new();
        let signal = async { Err(io::Error::other("no signal handler")) };

        let waited = tokio::time::timeout(
            Duration::from_secs(3600),
            cancel_on_signal(signal, token.clone()),
        )
        .await;

        assert!(waited.is_err());
        assert!(!token.is_cancelled());
    }
}
