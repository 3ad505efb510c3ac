//! Graceful shutdown on SIGTERM and SIGINT.
//!
//! In-flight settlements are allowed to finish: the HTTP server stops accepting new
//! connections once the token is cancelled and drains the ones it has.
//!
//! ```ignore
//! use x402_facilitator_local::util::SigDown;
//!
//! let sig_down = SigDown::try_new()?;
//! axum::serve(listener, app)
//!     .with_graceful_shutdown(sig_down.shutdown())
//!     .await?;
//! ```

use std::future::Future;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Cancels a token on the first SIGTERM or SIGINT.
pub struct SigDown {
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl SigDown {
    /// Registers the signal handlers. Fails when the runtime refuses signal registration.
    pub fn try_new() -> Result<Self, std::io::Error> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let cancellation_token = CancellationToken::new();
        let task_tracker = TaskTracker::new();
        let token = cancellation_token.clone();
        task_tracker.spawn(async move {
            let signal = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
                _ = token.cancelled() => return,
            };
            tracing::info!(signal, "Shutdown signal received");
            token.cancel();
        });
        task_tracker.close();
        Ok(Self {
            task_tracker,
            cancellation_token,
        })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Resolves once shutdown was requested; suitable for `with_graceful_shutdown`.
    pub fn shutdown(&self) -> impl Future<Output = ()> + Send + 'static {
        let token = self.cancellation_token.clone();
        async move { token.cancelled().await }
    }

    /// Waits for shutdown and for the signal task to exit.
    pub async fn recv(&self) {
        self.cancellation_token.cancelled().await;
        self.task_tracker.wait().await;
    }
}
