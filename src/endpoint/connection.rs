//! Connections: scoped sessions holding transport resources.
//!
//! # Responsibilities
//! - Carry the merged configuration snapshot of one session
//! - Hold the transport resource (socket, pipe, HTTP session, control channel)
//! - Release resources exactly once through `close()`
//! - Refuse use after close

use std::any::Any;
use std::collections::BTreeMap;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::ConnectionParams;
use crate::endpoint::Endpoint;
use crate::error::{CommunicationError, CommunicationResult};
use crate::net::{ConnectionId, ConnectionState};
use crate::transport::http::HttpSession;
use crate::transport::reply::ControlChannel;
use crate::transport::StreamChannel;

/// A bidirectional byte stream usable as a transport resource.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Boxed stream (plain TCP, TLS, or local pipe).
pub type BoxedStream = Box<dyn AsyncStream>;

/// Transport resource carried by a connection.
pub enum Resource {
    /// TCP socket, possibly TLS-wrapped.
    Stream(StreamChannel),
    /// Local named pipe.
    Pipe(StreamChannel),
    /// HTTP client session.
    Http(HttpSession),
    /// Control channel of a line-reply protocol (FTP, SMTP).
    Control(ControlChannel),
    /// Resource of a user-registered transport.
    Custom(Box<dyn Any + Send>),
}

impl Resource {
    /// Short name used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Resource::Stream(_) => "stream",
            Resource::Pipe(_) => "pipe",
            Resource::Http(_) => "http",
            Resource::Control(_) => "control",
            Resource::Custom(_) => "custom",
        }
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Resource::{}", self.kind())
    }
}

/// One logical session with an endpoint.
///
/// Created by [`Endpoint::connect`]. Usable until [`Connection::close`];
/// afterwards every resource accessor fails with
/// [`CommunicationError::Closed`].
pub struct Connection {
    id: ConnectionId,
    endpoint: Endpoint,
    params: ConnectionParams,
    resource: Option<Resource>,
    attributes: BTreeMap<String, String>,
    state: ConnectionState,
}

impl Connection {
    pub(crate) fn new(endpoint: Endpoint, params: ConnectionParams) -> Self {
        Self {
            id: ConnectionId::new(),
            endpoint,
            params,
            resource: None,
            attributes: BTreeMap::new(),
            state: ConnectionState::Open,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The endpoint that opened this connection.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The merged configuration snapshot.
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    fn ensure_open(&self) -> CommunicationResult<()> {
        if self.is_closed() {
            Err(CommunicationError::Closed)
        } else {
            Ok(())
        }
    }

    /// Store the transport resource, replacing any previous one.
    pub fn set_resource(&mut self, resource: Resource) {
        self.resource = Some(resource);
    }

    /// Remove the transport resource, typically to release it.
    pub fn take_resource(&mut self) -> Option<Resource> {
        self.resource.take()
    }

    pub fn resource(&self) -> Option<&Resource> {
        self.resource.as_ref()
    }

    /// The buffered byte stream of a socket or pipe connection.
    pub fn stream_mut(&mut self) -> CommunicationResult<&mut StreamChannel> {
        self.ensure_open()?;
        match self.resource.as_mut() {
            Some(Resource::Stream(stream)) | Some(Resource::Pipe(stream)) => Ok(stream),
            _ => Err(CommunicationError::MissingResource("stream")),
        }
    }

    /// The session of an HTTP-based connection.
    pub fn http_session(&self) -> CommunicationResult<&HttpSession> {
        self.ensure_open()?;
        match self.resource.as_ref() {
            Some(Resource::Http(session)) => Ok(session),
            _ => Err(CommunicationError::MissingResource("http")),
        }
    }

    /// The control channel of an FTP or SMTP connection.
    pub fn control_mut(&mut self) -> CommunicationResult<&mut ControlChannel> {
        self.ensure_open()?;
        match self.resource.as_mut() {
            Some(Resource::Control(channel)) => Ok(channel),
            _ => Err(CommunicationError::MissingResource("control")),
        }
    }

    /// The resource of a user-registered transport.
    pub fn custom_mut<T: Any + Send>(&mut self) -> CommunicationResult<&mut T> {
        self.ensure_open()?;
        match self.resource.as_mut() {
            Some(Resource::Custom(value)) => value
                .downcast_mut::<T>()
                .ok_or(CommunicationError::MissingResource("custom")),
            _ => Err(CommunicationError::MissingResource("custom")),
        }
    }

    /// Record a session attribute (e.g. the server greeting).
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Release the transport resources.
    ///
    /// Idempotent: only the first call reaches the transport. The connection
    /// is marked closed and its resource dropped even when the transport
    /// reports an error.
    pub async fn close(&mut self) -> CommunicationResult<()> {
        if self.is_closed() {
            return Ok(());
        }

        let transport = self.endpoint.transport();
        let result = transport.close_connection(self).await;
        self.resource = None;
        self.state = ConnectionState::Closed;

        match &result {
            Ok(()) => tracing::debug!(connection_id = %self.id, "Connection closed"),
            Err(e) => tracing::warn!(
                connection_id = %self.id,
                address = %self.endpoint.address(),
                error = %e,
                "Connection close failed"
            ),
        }
        result
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if !self.is_closed() {
            tracing::warn!(
                connection_id = %self.id,
                address = %self.endpoint.address(),
                resource = ?self.resource,
                "Connection dropped without close; releasing resources"
            );
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("address", &self.endpoint.address().as_str())
            .field("resource", &self.resource)
            .field("state", &self.state)
            .finish()
    }
}
