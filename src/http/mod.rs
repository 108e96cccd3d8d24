//! HTTP/1.1 wire codec and request handler.
//!
//! # Data Flow
//! ```text
//! accepted socket (RequestInput, bounded)
//!     → request.rs (request line, headers; strict CRLF, line limit)
//!     → handler.rs (HttpService produces an HttpResponse)
//!     → response.rs (status line, headers in order, streamed body)
//!     → RequestOutput (bounded)
//! ```
//!
//! # Design Decisions
//! - Every parse failure carries the status to answer with
//! - A connection closed before sending a byte is `EmptyRequest`, not an error
//! - Header lookups ignore case and treat `_` like `-`

pub mod handler;
pub mod headers;
pub mod request;
pub mod response;

use std::io;

use http::StatusCode;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::server::is_limit_exceeded;

pub use handler::{EchoService, HttpRequestHandler, HttpService};
pub use headers::HttpHeaders;
pub use request::HttpRequest;
pub use response::{HttpBody, HttpResponse};

/// Default maximum length of a request line or header line.
pub const DEFAULT_MAX_LINE: usize = 8 * 1024;

/// Errors of the HTTP codec.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The peer closed the connection without sending anything.
    #[error("empty request")]
    EmptyRequest,

    /// The server closed the connection without answering.
    #[error("empty response")]
    EmptyResponse,

    /// The request cannot be served; answer with `status`.
    #[error("{status}: {message}")]
    Status {
        status: StatusCode,
        message: String,
        /// Extra headers for the error response (e.g. `Allow`).
        headers: HttpHeaders,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        HttpError::Status {
            status,
            message: message.into(),
            headers: HttpHeaders::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Add a header to the error response. No effect on non-status errors.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        if let HttpError::Status { headers, .. } = &mut self {
            headers.add(name, value);
        }
        self
    }

    /// The status an error response should carry.
    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::EmptyRequest => StatusCode::BAD_REQUEST,
            HttpError::EmptyResponse => StatusCode::BAD_GATEWAY,
            HttpError::Status { status, .. } => *status,
            HttpError::Io(e) if is_limit_exceeded(e) => StatusCode::PAYLOAD_TOO_LARGE,
            HttpError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Read one CRLF-terminated line without its terminator. `None` at EOF
/// before any byte.
pub(crate) async fn read_line<R>(reader: &mut R, max_line: usize) -> Result<Option<String>, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::new();
    let read = (&mut *reader)
        .take(max_line as u64 + 2)
        .read_until(b'\n', &mut raw)
        .await?;
    if read == 0 {
        return Ok(None);
    }
    if !raw.ends_with(b"\n") {
        return Err(if read > max_line {
            HttpError::bad_request(format!("line exceeds {max_line} bytes"))
        } else {
            HttpError::bad_request("unterminated line")
        });
    }
    if !raw.ends_with(b"\r\n") {
        return Err(HttpError::bad_request("line not terminated by CRLF"));
    }
    raw.truncate(raw.len() - 2);
    if raw.len() > max_line {
        return Err(HttpError::bad_request(format!("line exceeds {max_line} bytes")));
    }
    String::from_utf8(raw)
        .map(Some)
        .map_err(|_| HttpError::bad_request("line is not valid UTF-8"))
}
