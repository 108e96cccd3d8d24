//! Request parsing.
//!
//! # Responsibilities
//! - Parse the request line (`METHOD SP PATH SP HTTP/x.y CRLF`)
//! - Parse the header block up to the blank line
//! - Read the body, gated by `Content-Length`
//!
//! The stream is left positioned at the first body byte.

use http::{Method, StatusCode};
use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::http::headers::HttpHeaders;
use crate::http::{read_line, HttpError};

const KNOWN_METHODS: [Method; 9] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::CONNECT,
    Method::OPTIONS,
    Method::TRACE,
    Method::PATCH,
];

/// A parsed request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    method: Method,
    path: String,
    version: String,
    headers: HttpHeaders,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            version: "HTTP/1.1".to_string(),
            headers: HttpHeaders::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        &mut self.headers
    }

    /// `METHOD PATH VERSION`, as received.
    pub fn request_line(&self) -> String {
        format!("{} {} {}", self.method, self.path, self.version)
    }

    /// Parse a request head. Fails with [`HttpError::EmptyRequest`] when the
    /// stream ends before the first byte.
    pub async fn read_from<R>(reader: &mut R, max_line: usize) -> Result<Self, HttpError>
    where
        R: AsyncBufRead + Unpin,
    {
        let line = read_line(reader, max_line)
            .await?
            .ok_or(HttpError::EmptyRequest)?;

        let mut parts = line.split(' ');
        let (Some(method), Some(path), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(HttpError::bad_request(format!("malformed request line '{line}'")));
        };
        if path.is_empty() || !version.starts_with("HTTP/") {
            return Err(HttpError::bad_request(format!("malformed request line '{line}'")));
        }
        let method = parse_method(method)?;
        let headers = HttpHeaders::read_from(reader, max_line).await?;

        Ok(Self {
            method,
            path: path.to_string(),
            version: version.to_string(),
            headers,
        })
    }

    /// Read the whole body. Requires a `Content-Length` header
    /// (`411 Length Required` otherwise).
    pub async fn read_body<R>(&self, reader: &mut R) -> Result<Vec<u8>, HttpError>
    where
        R: AsyncRead + Unpin,
    {
        let length = self.headers.content_length()?.ok_or_else(|| {
            HttpError::new(StatusCode::LENGTH_REQUIRED, "Content-Length required")
        })?;

        let mut body = Vec::new();
        (&mut *reader).take(length).read_to_end(&mut body).await?;
        if (body.len() as u64) < length {
            return Err(HttpError::bad_request(format!(
                "body ended after {} of {length} bytes",
                body.len()
            )));
        }
        Ok(body)
    }

    /// Read the body as UTF-8 text.
    pub async fn read_text<R>(&self, reader: &mut R) -> Result<String, HttpError>
    where
        R: AsyncRead + Unpin,
    {
        String::from_utf8(self.read_body(reader).await?)
            .map_err(|_| HttpError::bad_request("body is not valid UTF-8"))
    }

    /// Write the request head and `body`, adding `Content-Length` when a
    /// body is given.
    pub async fn write_to<W>(&self, writer: &mut W, body: &[u8]) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut head = format!("{}\r\n", self.request_line());
        for (name, value) in self.headers.iter() {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        if !body.is_empty() && !self.headers.contains("Content-Length") {
            head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        head.push_str("\r\n");

        writer.write_all(head.as_bytes()).await?;
        writer.write_all(body).await?;
        writer.flush().await
    }
}

fn parse_method(token: &str) -> Result<Method, HttpError> {
    KNOWN_METHODS
        .iter()
        .find(|m| m.as_str() == token)
        .cloned()
        .ok_or_else(|| {
            HttpError::bad_request(format!("unknown method '{token}'"))
                .with_header("Allow", "GET, HEAD, POST, PUT, DELETE, CONNECT, OPTIONS, TRACE, PATCH")
        })
}
