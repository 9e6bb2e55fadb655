//! Cooperative abort signal shared by the producer and every worker.
//!
//! Requesting an abort only flips the flag. Nothing in flight is cancelled, the queue
//! is left alone, and draining is the pipeline's job.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to the pipeline-wide abort flag (cheap to clone)
///
/// The only legal transition is not-aborted → aborted, so readers need no lock.
#[derive(Clone, Debug, Default)]
pub struct ShutdownController {
    token: CancellationToken,
}

impl ShutdownController {
    /// Create a controller in the running (not aborted) state
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the abort flag. Calling it again has no further effect.
    pub fn request_abort(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("abort requested, draining queued items");
        }
        self.token.cancel();
    }

    /// Whether an abort has been requested
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once an abort has been requested
    pub async fn aborted(&self) {
        self.token.cancelled().await;
    }

    /// Spawn a task that requests an abort on SIGINT/SIGTERM (Ctrl+C elsewhere)
    ///
    /// The task ends on its own once the flag is set by anyone, so it never outlives
    /// the pipeline.
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = wait_for_signal() => controller.request_abort(),
                _ = controller.aborted() => {}
            }
        })
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            if tokio::signal::ctrl_c().await.is_err() {
                // Without any signal source the pipeline can only stop on its own
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    }
}
