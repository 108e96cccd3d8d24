//! Control channels of line-reply protocols (FTP, SMTP).
//!
//! Replies are `NNN text` lines; a multi-line reply opens with `NNN-` and
//! ends with the first line starting with the same code followed by a space.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt};

use crate::endpoint::Connection;
use crate::error::{CommunicationError, CommunicationResult};
use crate::method::CommunicationMethod;
use crate::transport::socket::shutdown_stream;
use crate::transport::{with_timeout, StreamChannel};

/// A parsed server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    /// Text of every line, code prefix removed.
    pub lines: Vec<String>,
}

impl Reply {
    /// All lines joined with `\n`.
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// 1xx
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// 2xx or 3xx
    pub fn is_positive(&self) -> bool {
        (200..400).contains(&self.code)
    }

    pub fn into_error(self) -> CommunicationError {
        CommunicationError::Reply {
            code: self.code,
            message: self.message(),
        }
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.message())
    }
}

/// Buffered line channel with per-operation timeouts.
pub struct ControlChannel {
    stream: StreamChannel,
    timeout: Duration,
    max_line: u64,
}

impl ControlChannel {
    pub fn new(stream: StreamChannel, timeout: Duration, max_line: u64) -> Self {
        Self {
            stream,
            timeout,
            max_line,
        }
    }

    async fn read_line(&mut self) -> CommunicationResult<String> {
        let mut raw = Vec::new();
        let limit = self.max_line;
        let read = with_timeout(
            self.timeout,
            (&mut self.stream).take(limit + 1).read_until(b'\n', &mut raw),
        )
        .await?;
        if read == 0 {
            return Err(CommunicationError::Protocol(
                "connection closed while waiting for a reply".to_string(),
            ));
        }
        if read as u64 > limit {
            return Err(CommunicationError::Protocol(format!("reply line exceeds {limit} bytes")));
        }
        let line = String::from_utf8_lossy(&raw);
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Read one complete, possibly multi-line, reply.
    pub async fn read_reply(&mut self) -> CommunicationResult<Reply> {
        let first = self.read_line().await?;
        let (code, separator, text) = split_reply_line(&first)?;
        let mut lines = vec![text.to_string()];

        if separator == '-' {
            loop {
                let line = self.read_line().await?;
                match split_reply_line(&line) {
                    Ok((c, ' ', text)) if c == code => {
                        lines.push(text.to_string());
                        break;
                    }
                    Ok((c, '-', text)) if c == code => lines.push(text.to_string()),
                    _ => lines.push(line.clone()),
                }
            }
        }

        Ok(Reply { code, lines })
    }

    /// Write one line terminated by CRLF.
    pub async fn send_line(&mut self, line: &str) -> CommunicationResult<()> {
        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(b"\r\n");
        with_timeout(self.timeout, self.stream.write_all(&data)).await?;
        with_timeout(self.timeout, self.stream.flush()).await
    }

    /// Send a command and read its reply.
    pub async fn command(&mut self, line: &str) -> CommunicationResult<Reply> {
        self.send_line(line).await?;
        self.read_reply().await
    }

    /// Send a command and require one of the `expected` codes.
    pub async fn expect(&mut self, line: &str, expected: &[u16]) -> CommunicationResult<Reply> {
        let reply = self.command(line).await?;
        ensure_code(reply, expected)
    }

    /// Raw access to the stream, e.g. to write a message body.
    pub fn stream_mut(&mut self) -> &mut StreamChannel {
        &mut self.stream
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) async fn shutdown(self) -> CommunicationResult<()> {
        shutdown_stream(self.stream).await
    }
}

impl std::fmt::Debug for ControlChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlChannel")
            .field("timeout", &self.timeout)
            .field("max_line", &self.max_line)
            .finish()
    }
}

/// Fail with [`CommunicationError::Reply`] unless the code is expected.
pub(crate) fn ensure_code(reply: Reply, expected: &[u16]) -> CommunicationResult<Reply> {
    if expected.contains(&reply.code) {
        Ok(reply)
    } else {
        Err(reply.into_error())
    }
}

fn split_reply_line(line: &str) -> CommunicationResult<(u16, char, &str)> {
    let malformed = || CommunicationError::Protocol(format!("malformed reply line '{line}'"));
    let code = line
        .get(..3)
        .filter(|c| c.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(malformed)?;
    match line[3..].chars().next() {
        None => Ok((code, ' ', "")),
        Some(sep @ (' ' | '-')) => Ok((code, sep, &line[4..])),
        Some(_) => Err(malformed()),
    }
}

/// Send one command line over a control channel and return the reply.
///
/// Replies with code 400 and above fail with [`CommunicationError::Reply`].
#[derive(Debug, Clone)]
pub struct ControlCommand {
    token: String,
    default_input: Option<String>,
    log: bool,
}

impl ControlCommand {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            default_input: None,
            log: false,
        }
    }

    /// A fixed command, e.g. `ControlCommand::fixed("PWD")`.
    pub fn fixed(command: &str) -> Self {
        Self::new(command).with_default_input(command)
    }

    pub fn with_default_input(mut self, input: impl Into<String>) -> Self {
        self.default_input = Some(input.into());
        self
    }

    pub fn with_logging(mut self, log: bool) -> Self {
        self.log = log;
        self
    }
}

#[async_trait]
impl CommunicationMethod<String, Reply> for ControlCommand {
    fn token(&self) -> &str {
        &self.token
    }

    fn default_input(&self) -> Option<String> {
        self.default_input.clone()
    }

    fn log_execution(&self) -> bool {
        self.log
    }

    async fn do_on(&self, connection: &mut Connection, input: String) -> CommunicationResult<Reply> {
        let id = connection.id();
        let channel = connection.control_mut()?;
        let reply = channel.command(&input).await?;
        tracing::debug!(connection_id = %id, code = reply.code, "Command answered");
        if reply.code >= 400 {
            return Err(reply.into_error());
        }
        Ok(reply)
    }
}
