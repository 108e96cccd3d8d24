//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept in arrival order, assign connection id)
//!     → server admission check (server/mod.rs)
//!     → tls.rs (optional TLS handshake, inside the handler task)
//!     → request handler
//!
//! Outgoing connection (client transports)
//!     → tls.rs client configuration when encrypted
//!     → connection.rs id/state recorded on the Connection
//! ```
//!
//! # Design Decisions
//! - TLS handshakes never run on the accept loop
//! - Each connection carries an id for log correlation
//! - TLS is optional and handled transparently

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{ConnectionId, ConnectionState};
pub use listener::{Listener, ListenerError};
pub use tls::{CertificateProvider, PemFileCertificates, SelfSignedCertificates, TlsError};
