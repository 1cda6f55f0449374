//! Application state shared across request handlers.

use std::sync::Arc;
use std::time::Duration;

use doks_reconcile::OpContext;
use tokio_util::sync::CancellationToken;

use crate::driver::Driver;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    driver: Driver,
    shutdown: CancellationToken,
    operation_timeout: Duration,
}

impl AppState {
    pub fn new(driver: Driver, shutdown: CancellationToken, operation_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                driver,
                shutdown,
                operation_timeout,
            }),
        }
    }

    pub fn driver(&self) -> &Driver {
        &self.inner.driver
    }

    /// Context for one host request: cancelled on shutdown and bounded by
    /// the request's timeout, or the configured default.
    pub fn op_context(&self, timeout_seconds: Option<u64>) -> OpContext {
        let timeout = timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.inner.operation_timeout);
        OpContext::from_token(self.inner.shutdown.child_token()).with_timeout(timeout)
    }
}
