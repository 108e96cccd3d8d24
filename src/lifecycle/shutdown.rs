//! Shutdown coordination for servers.

use tokio::sync::watch;

/// How a server is being stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownMode {
    Running,
    /// Stop accepting; let in-flight requests finish.
    Graceful,
    /// Stop accepting; abort in-flight requests.
    Immediate,
}

/// Coordinator for shutdown.
///
/// Provides a watch channel that the accept loop and its tasks subscribe to.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: watch::Sender<ShutdownMode>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ShutdownMode::Running);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ShutdownMode> {
        self.tx.subscribe()
    }

    /// Request a shutdown. A weaker mode never replaces a stronger one.
    pub fn trigger(&self, mode: ShutdownMode) {
        self.tx.send_if_modified(|current| {
            if mode > *current {
                *current = mode;
                true
            } else {
                false
            }
        });
    }

    /// Return to `Running` so the owner can be started again.
    pub fn reset(&self) {
        self.tx.send_replace(ShutdownMode::Running);
    }

    pub fn mode(&self) -> ShutdownMode {
        *self.tx.borrow()
    }

    /// Number of active subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait until `rx` leaves `Running`; returns the requested mode.
pub async fn requested(rx: &mut watch::Receiver<ShutdownMode>) -> ShutdownMode {
    match rx.wait_for(|mode| *mode != ShutdownMode::Running).await {
        Ok(mode) => *mode,
        // Sender gone: nobody can stop us any more, treat as graceful.
        Err(_) => ShutdownMode::Graceful,
    }
}
