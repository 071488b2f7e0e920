//! Shutdown signal handling.
//!
//! SIGTERM and SIGINT (Ctrl+C elsewhere) trigger a graceful shutdown: the
//! listener stops accepting and in-flight callbacks run to completion.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Broadcasts a one-way shutdown flag.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Spawns a task that triggers shutdown on SIGTERM or SIGINT.
    #[cfg(unix)]
    pub fn spawn_listener(&self) {
        let handle = self.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler, relying on Ctrl+C");
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("received SIGINT, initiating shutdown");
                        handle.trigger();
                    }
                    return;
                }
            };

            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM, initiating shutdown"),
                _ = tokio::signal::ctrl_c() => info!("received SIGINT, initiating shutdown"),
            }
            handle.trigger();
            debug!("signal listener stopped");
        });
    }

    /// Spawns a task that triggers shutdown on Ctrl+C.
    #[cfg(not(unix))]
    pub fn spawn_listener(&self) {
        let handle = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received Ctrl+C, initiating shutdown");
                handle.trigger();
            }
        });
    }

    /// Requests shutdown.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Completes when shutdown is requested.
    pub async fn wait(self) {
        let mut rx = self.rx;
        // Err means every sender is gone; nothing can trigger shutdown any more.
        let _ = rx.wait_for(|down| *down).await;
    }
}
