//! OS signal handling.
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A second Ctrl+C escalates to an immediate stop

use crate::server::Server;

/// Stop `server` gracefully on Ctrl+C, immediately on the second one.
pub fn stop_on_ctrl_c(server: Server) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            return;
        }
        tracing::info!("Shutdown signal received");
        server.stop();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Second shutdown signal, aborting in-flight requests");
            server.stop_now();
        }
    });
}
