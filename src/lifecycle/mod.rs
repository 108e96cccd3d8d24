//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     stop()     → Graceful  → stop accepting → drain handlers → run() returns
//!     stop_now() → Immediate → stop accepting → abort handlers → run() returns
//!
//! Signals (signals.rs):
//!     Ctrl+C → graceful stop
//! ```
//!
//! # Design Decisions
//! - Shutdown state is a watch channel: late subscribers still see it
//! - The mode can only escalate (Graceful → Immediate), never go back

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownMode};
