//! Response writing, and parsing for clients and tests.
//!
//! # Responsibilities
//! - Write the status line, headers in insertion order, blank line, body
//! - Stream reader bodies through without buffering them
//! - Add `Content-Length` whenever the body length is known

use std::borrow::Cow;

use http::StatusCode;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::http::headers::HttpHeaders;
use crate::http::{read_line, HttpError};

/// Response body source.
pub enum HttpBody {
    Empty,
    Bytes(Vec<u8>),
    /// Streamed to the peer; `length` becomes `Content-Length` when known.
    Reader {
        reader: Box<dyn AsyncRead + Unpin + Send>,
        length: Option<u64>,
    },
}

impl HttpBody {
    pub fn len(&self) -> Option<u64> {
        match self {
            HttpBody::Empty => Some(0),
            HttpBody::Bytes(bytes) => Some(bytes.len() as u64),
            HttpBody::Reader { length, .. } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

impl std::fmt::Debug for HttpBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpBody::Empty => f.write_str("Empty"),
            HttpBody::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            HttpBody::Reader { length, .. } => write!(f, "Reader(length: {length:?})"),
        }
    }
}

#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HttpHeaders,
    body: HttpBody,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HttpHeaders::new(),
            body: HttpBody::Empty,
        }
    }

    /// A `text/plain` response.
    pub fn text(status: StatusCode, text: impl Into<String>) -> Self {
        Self::bytes(status, text.into().into_bytes())
            .with_header("Content-Type", "text/plain; charset=utf-8")
    }

    pub fn bytes(status: StatusCode, body: Vec<u8>) -> Self {
        Self {
            body: HttpBody::Bytes(body),
            ..Self::new(status)
        }
    }

    /// A response streaming `reader`; `length` is its size if known.
    pub fn stream(
        status: StatusCode,
        reader: impl AsyncRead + Unpin + Send + 'static,
        length: Option<u64>,
    ) -> Self {
        Self {
            body: HttpBody::Reader {
                reader: Box::new(reader),
                length,
            },
            ..Self::new(status)
        }
    }

    /// Error response for a failed request: status, the error's extra
    /// headers, and its message as text.
    pub fn from_error(error: &HttpError) -> Self {
        let status = error.status();
        let (message, extra) = match error {
            HttpError::Status { message, headers, .. } => (message.clone(), Some(headers)),
            _ => (status.canonical_reason().unwrap_or("Error").to_string(), None),
        };

        let mut response = Self::text(status, message).with_header("Connection", "close");
        if let Some(extra) = extra {
            for (name, value) in extra.iter() {
                response.headers.add(name, value);
            }
        }
        response
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        &mut self.headers
    }

    pub fn body(&self) -> &HttpBody {
        &self.body
    }

    /// In-memory body as text; `None` for streamed bodies.
    pub fn body_text(&self) -> Option<Cow<'_, str>> {
        match &self.body {
            HttpBody::Empty => Some(Cow::Borrowed("")),
            HttpBody::Bytes(bytes) => Some(String::from_utf8_lossy(bytes)),
            HttpBody::Reader { .. } => None,
        }
    }

    /// Write the response. The body is copied through, not buffered.
    pub async fn write_to<W>(mut self, writer: &mut W) -> Result<(), HttpError>
    where
        W: AsyncWrite + Unpin,
    {
        if let Some(length) = self.body.len() {
            if !self.headers.contains("Content-Length") {
                self.headers.set("Content-Length", length.to_string());
            }
        }

        let mut head = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status.as_u16(),
            self.status.canonical_reason().unwrap_or("")
        );
        for (name, value) in self.headers.iter() {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str("\r\n");
        writer.write_all(head.as_bytes()).await?;

        match self.body {
            HttpBody::Empty => {}
            HttpBody::Bytes(bytes) => writer.write_all(&bytes).await?,
            HttpBody::Reader { mut reader, length } => {
                let copied = match length {
                    Some(length) => tokio::io::copy(&mut (&mut reader).take(length), writer).await?,
                    None => tokio::io::copy(&mut reader, writer).await?,
                };
                if let Some(length) = length.filter(|l| copied < *l) {
                    return Err(HttpError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("body ended after {copied} of {length} bytes"),
                    )));
                }
            }
        }
        writer.flush().await?;
        Ok(())
    }

    /// Parse a response. Without `Content-Length` the body runs to EOF.
    pub async fn read_from<R>(reader: &mut R, max_line: usize) -> Result<Self, HttpError>
    where
        R: AsyncBufRead + Unpin,
    {
        let line = read_line(reader, max_line)
            .await?
            .ok_or(HttpError::EmptyResponse)?;
        let malformed = || HttpError::bad_request(format!("malformed status line '{line}'"));

        let mut parts = line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        let code = parts.next().ok_or_else(malformed)?;
        if !version.starts_with("HTTP/") {
            return Err(malformed());
        }
        let status = code
            .parse::<u16>()
            .ok()
            .and_then(|c| StatusCode::from_u16(c).ok())
            .ok_or_else(malformed)?;

        let headers = HttpHeaders::read_from(reader, max_line).await?;
        let mut body = Vec::new();
        match headers.content_length()? {
            Some(length) => {
                (&mut *reader).take(length).read_to_end(&mut body).await?;
            }
            None => {
                reader.read_to_end(&mut body).await?;
            }
        }

        Ok(Self {
            status,
            headers,
            body: HttpBody::Bytes(body),
        })
    }
}
