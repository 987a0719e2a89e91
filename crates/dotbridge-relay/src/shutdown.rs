//! Shutdown coordination for the relay loop.

use tokio_util::sync::CancellationToken;

/// Broadcasts a shutdown request to the relay loop.
///
/// Cloneable and usable from any thread. Requesting shutdown is
/// idempotent, and a request made before the loop has fully started is
/// still observed once it does.
#[derive(Clone, Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator in the running state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Request shutdown. Safe to call any number of times.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once shutdown has been requested. Cancel-safe.
    pub async fn requested(&self) {
        self.token.cancelled().await;
    }
}
