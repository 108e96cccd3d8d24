//! Local pipe transport (`pipe:///path`).
//!
//! On Unix the path names a Unix domain socket; on Windows it names a
//! named pipe (`pipe:///svc` opens `\\.\pipe\svc`). The stream is exchanged
//! with [`SocketRequest`](crate::transport::SocketRequest) like a socket.

use async_trait::async_trait;
use tokio::io::BufStream;

use crate::config::ConnectionParams;
use crate::endpoint::{BoxedStream, Connection, Resource, Transport};
use crate::error::{CommunicationError, CommunicationResult};
use crate::transport::socket::shutdown_stream;
use crate::transport::with_timeout;

#[derive(Debug, Default)]
pub struct PipeTransport;

#[async_trait]
impl Transport for PipeTransport {
    fn default_params(&self) -> ConnectionParams {
        ConnectionParams::new().with_encryption(false)
    }

    async fn init_connection(&self, connection: &mut Connection) -> CommunicationResult<()> {
        let name = pipe_name(connection)?;
        let timeout = connection.params().timeout();
        let buffer_size = connection.params().buffer_size();

        let stream = with_timeout(timeout, open(&name)).await?;
        tracing::debug!(connection_id = %connection.id(), pipe = %name, "Pipe opened");

        connection.set_resource(Resource::Pipe(BufStream::with_capacity(
            buffer_size,
            buffer_size,
            stream,
        )));
        Ok(())
    }

    async fn close_connection(&self, connection: &mut Connection) -> CommunicationResult<()> {
        match connection.take_resource() {
            Some(Resource::Pipe(stream)) => shutdown_stream(stream).await,
            _ => Ok(()),
        }
    }
}

fn pipe_name(connection: &Connection) -> CommunicationResult<String> {
    let address = connection.endpoint().address();
    let path = percent_encoding::percent_decode_str(address.path())
        .decode_utf8_lossy()
        .into_owned();
    if path.is_empty() || path == "/" {
        return Err(CommunicationError::Protocol(format!("no pipe path in {address}")));
    }
    Ok(platform_name(&path))
}

#[cfg(unix)]
fn platform_name(path: &str) -> String {
    path.to_string()
}

#[cfg(windows)]
fn platform_name(path: &str) -> String {
    format!(r"\\.\pipe\{}", path.trim_start_matches('/').replace('/', "\\"))
}

#[cfg(unix)]
async fn open(name: &str) -> std::io::Result<BoxedStream> {
    let stream = tokio::net::UnixStream::connect(name).await?;
    Ok(Box::new(stream))
}

#[cfg(windows)]
async fn open(name: &str) -> std::io::Result<BoxedStream> {
    use tokio::net::windows::named_pipe::ClientOptions;

    let client = ClientOptions::new().open(name)?;
    Ok(Box::new(client))
}
