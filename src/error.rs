//! Client-side error taxonomy.
//!
//! Every failure raised while resolving an endpoint, opening or closing a
//! connection, or running a communication method surfaces as a
//! [`CommunicationError`]. Transport errors are converted at the boundary
//! through the `From` impls below, so a value that is already a
//! `CommunicationError` is never wrapped a second time.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by endpoints, connections and communication methods.
#[derive(Debug, Error)]
pub enum CommunicationError {
    /// No transport is registered for the URI scheme.
    #[error("unsupported endpoint scheme '{0}'")]
    UnsupportedScheme(String),

    /// The endpoint URI could not be parsed.
    #[error("invalid endpoint address '{address}': {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: url::ParseError,
    },

    /// The connection has already been closed.
    #[error("connection is closed")]
    Closed,

    /// The connection does not carry the resource a method needs.
    #[error("connection has no {0} resource")]
    MissingResource(&'static str),

    /// No input was given and the method has no default input.
    #[error("no input for method '{0}'")]
    MissingInput(String),

    /// A connect or read did not complete in time.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Stream or socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The HTTP peer answered with a non-success status.
    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// A line-based protocol peer (FTP, SMTP) answered with a negative reply.
    #[error("negative reply {code}: {message}")]
    Reply { code: u16, message: String },

    /// TLS setup failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The peer violated the protocol or answered with an application error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Any other failure.
    #[error("{0}")]
    Message(String),
}

impl CommunicationError {
    /// Create a free-form error.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Whether the error was caused by an elapsed timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for CommunicationError {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}

impl From<crate::net::tls::TlsError> for CommunicationError {
    fn from(e: crate::net::tls::TlsError) -> Self {
        Self::Tls(e.to_string())
    }
}

/// Result type for client-side operations.
pub type CommunicationResult<T> = Result<T, CommunicationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert_once() {
        let err: CommunicationError =
            std::io::Error::new(std::io::ErrorKind::TimedOut, "slow").into();
        assert!(err.is_timeout());
        assert!(matches!(err, CommunicationError::Io(_)));
    }

    #[test]
    fn display_includes_scheme() {
        let err = CommunicationError::UnsupportedScheme("gopher".into());
        assert!(err.to_string().contains("gopher"));
    }
}
