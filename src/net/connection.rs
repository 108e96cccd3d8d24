//! Connection identity and lifecycle state.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing (client and server side)
//! - Describe connection state (Open → Closed)

use std::sync::atomic::{AtomicU64, Ordering};

// Shared by client connections and accepted sockets, so log lines of both
// sides never reuse an id within one process.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection id, displayed as `conn-N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Whether a client connection still holds its transport resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    /// Terminal; methods fail with `CommunicationError::Closed`.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Open => f.write_str("open"),
            ConnectionState::Closed => f.write_str("closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase_and_display_with_prefix() {
        let first = ConnectionId::new();
        let second = ConnectionId::new();
        assert!(second > first);
        assert_eq!(second.to_string(), format!("conn-{}", second.as_u64()));
        assert_eq!(ConnectionState::Closed.to_string(), "closed");
    }
}
