//! commlink: uniform client connections over pluggable transports, and a
//! socket server with admission control.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client side                                Server side
//!
//!   Endpoint::at(uri)                          Server::run()
//!       │ registry (scheme → transport)            │ Listener::bind
//!       ▼                                          ▼
//!   EndpointFunction ── connect ──▶ Connection  accept loop ── admission ──▶ task
//!       │                               │          │                         │
//!       │ CommunicationMethod ◀─────────┘          │ limits (bounded I/O)    │
//!       │   (then / then_method chains)            ▼                         ▼
//!       └── close on every exit path           RequestHandler ◀── HttpRequestHandler
//!                                                                  (http codec)
//! ```
//!
//! Cross-cutting: `config` (TOML + layered connection parameters),
//! `observability` (tracing, metrics), `lifecycle` (shutdown, signals).

// Client side
pub mod endpoint;
pub mod error;
pub mod method;
pub mod transport;

// Server side
pub mod http;
pub mod net;
pub mod server;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::{CommConfig, ConnectionParams, ServerConfig};
pub use endpoint::{Connection, Endpoint, EndpointFunction, Transport};
pub use error::{CommunicationError, CommunicationResult};
pub use http::{HttpRequestHandler, HttpService};
pub use lifecycle::{Shutdown, ShutdownMode};
pub use method::{CommunicationMethod, MethodExt};
pub use server::{RequestHandler, Server, ServerError};
