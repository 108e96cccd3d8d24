//! TCP listener for the socket server.
//!
//! # Responsibilities
//! - Bind to the configured address and port
//! - Accept incoming TCP connections in arrival order
//! - Report the bound address (ephemeral ports)
//!
//! Admission control is not done here: the server decides per accepted
//! socket whether it is handled or closed.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};

use crate::config::ServerConfig;
use crate::net::connection::ConnectionId;

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("failed to bind: {0}")]
    Bind(#[source] std::io::Error),

    #[error("failed to accept: {0}")]
    Accept(#[source] std::io::Error),
}

/// The server's listening socket.
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind `config.bind_address` on `port` (`0` picks an ephemeral port).
    pub async fn bind(config: &ServerConfig, port: u16) -> Result<Self, ListenerError> {
        let addr = format!("{}:{}", config.bind_address, port);
        let inner = TcpListener::bind(&addr).await.map_err(ListenerError::Bind)?;
        let local_addr = inner.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            encryption = config.encryption,
            "Listener bound"
        );

        Ok(Self { inner, local_addr })
    }

    /// Accept the next connection and assign it an ID.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionId), ListenerError> {
        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        let id = ConnectionId::new();

        tracing::debug!(connection_id = %id, peer_addr = %addr, "Connection accepted");
        Ok((stream, addr, id))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
