//! Built-in transports and their communication methods.
//!
//! # Schemes
//! ```text
//! socket / sockets      → socket.rs   (TCP, TLS)       SocketRequest
//! pipe                  → pipe.rs     (local pipe)     SocketRequest
//! http / https          → http.rs     (reqwest)        HttpRequestMethod
//! ftp / ftps            → ftp.rs      (control chan.)  FtpCommand
//! smtp / smtps          → smtp.rs     (control chan.)  SmtpCommand, SendMail
//! json-rpc / json-rpcs  → jsonrpc.rs  (HTTP session)   JsonRpcCall
//! ```
//!
//! Every read and write on a stream is bounded by the connection timeout;
//! every response read is bounded by `max_response_size`.

pub mod ftp;
pub mod http;
pub mod jsonrpc;
pub mod pipe;
pub mod reply;
pub mod smtp;
pub mod socket;

use std::future::Future;
use std::time::Duration;

use tokio::io::BufStream;

use crate::endpoint::BoxedStream;
use crate::error::{CommunicationError, CommunicationResult};

pub use ftp::{FtpCommand, FtpTransport};
pub use http::{HttpRequestMethod, HttpSession, HttpTransport};
pub use jsonrpc::{JsonRpcCall, JsonRpcTransport};
pub use pipe::PipeTransport;
pub use reply::{ControlChannel, ControlCommand, Reply};
pub use smtp::{MailMessage, SendMail, SmtpCommand, SmtpTransport};
pub use socket::{ResponseFraming, SocketRequest, SocketTransport};

/// Buffered stream resource of socket and pipe connections.
pub type StreamChannel = BufStream<BoxedStream>;

/// Run an I/O future, failing with [`CommunicationError::Timeout`] when it
/// does not finish within `limit`.
pub(crate) async fn with_timeout<T, F>(limit: Duration, future: F) -> CommunicationResult<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result.map_err(CommunicationError::from),
        Err(_) => Err(CommunicationError::Timeout(limit)),
    }
}

/// Whether a shutdown error only says the peer is already gone.
pub(crate) fn is_disconnect(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::UnexpectedEof
    )
}
