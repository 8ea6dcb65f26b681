//! Shared, monotonic cancellation flag

use tokio_util::sync::CancellationToken;

/// Run-wide abort flag
///
/// Clones share the same flag. Once set it stays set; the engine sets it on a
/// fatal error and callers may set it to stop a run (for example on Ctrl-C).
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    token: CancellationToken,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Calling it again has no further effect.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the flag is set
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}
