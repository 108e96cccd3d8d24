//! Raw socket transport (`socket://host:port`, `sockets://` for TLS).

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::config::ConnectionParams;
use crate::endpoint::{BoxedStream, Connection, Endpoint, Resource, Transport};
use crate::error::{CommunicationError, CommunicationResult};
use crate::method::CommunicationMethod;
use crate::net::{tls, ConnectionId};
use crate::transport::{is_disconnect, with_timeout, StreamChannel};

/// Open a TCP connection to the endpoint, TLS-wrapped when the connection
/// is encrypted. Shared by all TCP-based transports.
pub(crate) async fn open_stream(
    id: ConnectionId,
    endpoint: &Endpoint,
    params: &ConnectionParams,
    default_port: Option<u16>,
) -> CommunicationResult<BoxedStream> {
    let host = endpoint.host()?.to_string();
    let port = endpoint.port_or(default_port)?;
    let timeout = params.timeout();

    let tcp = with_timeout(timeout, TcpStream::connect((host.as_str(), port))).await?;
    tcp.set_nodelay(true)?;

    if !params.encryption() {
        tracing::debug!(connection_id = %id, host = %host, port, "TCP connected");
        return Ok(Box::new(tcp));
    }

    let config = tls::client_config(params.trust_self_signed(), params.ca_cert_path.as_deref())?;
    let server_name = tls::server_name(&host)?;
    let stream = with_timeout(timeout, TlsConnector::from(config).connect(server_name, tcp)).await?;

    tracing::debug!(connection_id = %id, host = %host, port, "TLS connected");
    Ok(Box::new(stream))
}

/// Open the stream of `connection` and wrap it in a buffer sized by the
/// connection parameters.
pub(crate) async fn open_channel(
    connection: &mut Connection,
    default_port: Option<u16>,
) -> CommunicationResult<StreamChannel> {
    let endpoint = connection.endpoint().clone();
    let params = connection.params().clone();
    let stream = open_stream(connection.id(), &endpoint, &params, default_port).await?;
    let buffer_size = params.buffer_size();
    Ok(BufStream::with_capacity(buffer_size, buffer_size, stream))
}

/// Flush and shut down a stream resource, ignoring a peer that is already gone.
pub(crate) async fn shutdown_stream(mut stream: StreamChannel) -> CommunicationResult<()> {
    match stream.shutdown().await {
        Err(e) if !is_disconnect(&e) => Err(e.into()),
        _ => Ok(()),
    }
}

/// TCP socket transport.
#[derive(Debug, Default)]
pub struct SocketTransport;

#[async_trait]
impl Transport for SocketTransport {
    async fn init_connection(&self, connection: &mut Connection) -> CommunicationResult<()> {
        let channel = open_channel(connection, None).await?;
        connection.set_resource(Resource::Stream(channel));
        Ok(())
    }

    async fn close_connection(&self, connection: &mut Connection) -> CommunicationResult<()> {
        match connection.take_resource() {
            Some(Resource::Stream(stream)) => shutdown_stream(stream).await,
            _ => Ok(()),
        }
    }
}

/// How the reply to a [`SocketRequest`] is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFraming {
    /// Do not read a reply.
    None,
    /// One line, terminated by `\n` (included in the output).
    Line,
    /// Exactly this many bytes.
    Length(usize),
    /// Everything until the peer closes its side.
    UntilClose,
}

/// Write the input to the stream of a socket or pipe connection and read
/// the framed reply.
#[derive(Debug, Clone)]
pub struct SocketRequest {
    token: String,
    framing: ResponseFraming,
    default_input: Option<Vec<u8>>,
    log: bool,
}

impl SocketRequest {
    pub fn new(framing: ResponseFraming) -> Self {
        Self {
            token: "socket".to_string(),
            framing,
            default_input: None,
            log: false,
        }
    }

    /// Request answered by a single line.
    pub fn line() -> Self {
        Self::new(ResponseFraming::Line)
    }

    /// Read without writing anything first (empty default input).
    pub fn receive(framing: ResponseFraming) -> Self {
        Self::new(framing).with_default_input(Vec::new())
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    pub fn with_default_input(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.default_input = Some(input.into());
        self
    }

    pub fn with_logging(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn framing(&self) -> ResponseFraming {
        self.framing
    }
}

#[async_trait]
impl CommunicationMethod<Vec<u8>, Vec<u8>> for SocketRequest {
    fn token(&self) -> &str {
        &self.token
    }

    fn default_input(&self) -> Option<Vec<u8>> {
        self.default_input.clone()
    }

    fn log_execution(&self) -> bool {
        self.log
    }

    async fn do_on(&self, connection: &mut Connection, input: Vec<u8>) -> CommunicationResult<Vec<u8>> {
        let timeout = connection.params().timeout();
        let limit = connection.params().max_response_size();
        let stream = connection.stream_mut()?;

        if !input.is_empty() {
            with_timeout(timeout, stream.write_all(&input)).await?;
            with_timeout(timeout, stream.flush()).await?;
        }

        let mut reply = Vec::new();
        match self.framing {
            ResponseFraming::None => {}
            ResponseFraming::Line => {
                let read = with_timeout(
                    timeout,
                    (&mut *stream).take(limit + 1).read_until(b'\n', &mut reply),
                )
                .await?;
                if read as u64 > limit {
                    return Err(response_too_large(limit));
                }
                if !reply.ends_with(b"\n") {
                    return Err(CommunicationError::Protocol(
                        "connection closed before end of line".to_string(),
                    ));
                }
            }
            ResponseFraming::Length(len) => {
                if len as u64 > limit {
                    return Err(response_too_large(limit));
                }
                reply.resize(len, 0);
                with_timeout(timeout, stream.read_exact(&mut reply)).await?;
            }
            ResponseFraming::UntilClose => {
                let read = with_timeout(
                    timeout,
                    (&mut *stream).take(limit + 1).read_to_end(&mut reply),
                )
                .await?;
                if read as u64 > limit {
                    return Err(response_too_large(limit));
                }
            }
        }
        Ok(reply)
    }
}

fn response_too_large(limit: u64) -> CommunicationError {
    CommunicationError::Protocol(format!("response exceeds {limit} bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    async fn echo_lines() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (read, mut write) = socket.into_split();
                    let mut lines = BufReader::new(read).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        if write.write_all(format!("{}\n", line.to_uppercase()).as_bytes()).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn line_exchange_over_one_connection() {
        let addr = echo_lines().await;
        let endpoint = Endpoint::at(&format!("socket://{addr}")).unwrap();
        let mut connection = endpoint.connect(None).await.unwrap();

        let request = SocketRequest::line();
        let first = request.evaluate(Some(b"hello\n".to_vec()), &mut connection).await.unwrap();
        let second = request.evaluate(Some(b"again\n".to_vec()), &mut connection).await.unwrap();
        assert_eq!(first, b"HELLO\n");
        assert_eq!(second, b"AGAIN\n");
        connection.close().await.unwrap();
    }

    #[tokio::test]
    async fn oversized_reply_is_rejected() {
        let addr = echo_lines().await;
        let endpoint = Endpoint::at(&format!("socket://{addr}")).unwrap();
        let params = ConnectionParams::new().with_max_response_size(4);
        let mut connection = endpoint.connect(Some(&params)).await.unwrap();

        let err = SocketRequest::line()
            .evaluate(Some(b"too long\n".to_vec()), &mut connection)
            .await
            .unwrap_err();
        assert!(matches!(err, CommunicationError::Protocol(_)));
        connection.close().await.unwrap();
    }

    #[tokio::test]
    async fn missing_port_fails_without_connecting() {
        let endpoint = Endpoint::at("socket://localhost").unwrap();
        let err = endpoint.connect(None).await.unwrap_err();
        assert!(matches!(err, CommunicationError::Protocol(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_communication_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = Endpoint::at(&format!("socket://{addr}")).unwrap();
        let err = endpoint.connect(None).await.unwrap_err();
        assert!(matches!(err, CommunicationError::Io(_)));
    }
}
