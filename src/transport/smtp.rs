//! SMTP transport (`smtp://`, `smtps://`).
//!
//! The session is opened with the greeting and `EHLO`, optionally
//! authenticated with `AUTH PLAIN`, and ended with `QUIT`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::io::AsyncWriteExt;

use crate::endpoint::{Connection, Resource, Transport};
use crate::error::{CommunicationError, CommunicationResult};
use crate::method::CommunicationMethod;
use crate::transport::reply::{ensure_code, ControlChannel, ControlCommand, Reply};
use crate::transport::socket::open_channel;
use crate::transport::with_timeout;

pub const SMTP_PORT: u16 = 25;
pub const SMTPS_PORT: u16 = 465;

/// Parameter key overriding the `EHLO` domain.
pub const HELO_KEY: &str = "smtp.helo";

const DEFAULT_HELO: &str = "localhost";
const MAX_REPLY_LINE: u64 = 8 * 1024;

/// Sends one SMTP command and returns the reply.
pub type SmtpCommand = ControlCommand;

#[derive(Debug, Default)]
pub struct SmtpTransport;

#[async_trait]
impl Transport for SmtpTransport {
    async fn init_connection(&self, connection: &mut Connection) -> CommunicationResult<()> {
        let port = if connection.params().encryption() {
            SMTPS_PORT
        } else {
            SMTP_PORT
        };
        let stream = open_channel(connection, Some(port)).await?;
        let timeout = connection.params().timeout();
        connection.set_resource(Resource::Control(ControlChannel::new(
            stream,
            timeout,
            MAX_REPLY_LINE,
        )));

        let helo = connection
            .params()
            .extra(HELO_KEY)
            .unwrap_or(DEFAULT_HELO)
            .to_string();
        let credentials = connection.params().user.clone().map(|user| {
            let password = connection.params().password.clone().unwrap_or_default();
            (user, password)
        });
        let id = connection.id();
        let channel = connection.control_mut()?;

        let greeting = ensure_code(channel.read_reply().await?, &[220])?;
        let ehlo = channel.expect(&format!("EHLO {helo}"), &[250]).await?;

        if let Some((user, password)) = credentials {
            let token = STANDARD.encode(format!("\0{user}\0{password}"));
            channel.expect(&format!("AUTH PLAIN {token}"), &[235]).await?;
            tracing::debug!(connection_id = %id, user = %user, "SMTP authenticated");
        }

        connection.set_attribute("greeting", greeting.message());
        connection.set_attribute("capabilities", ehlo.lines[1..].join("\n"));
        Ok(())
    }

    async fn close_connection(&self, connection: &mut Connection) -> CommunicationResult<()> {
        let Some(Resource::Control(mut channel)) = connection.take_resource() else {
            return Ok(());
        };
        let quit = channel.command("QUIT").await;
        let shutdown = channel.shutdown().await;
        ensure_code(quit?, &[221])?;
        shutdown
    }
}

/// A message handed to [`SendMail`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub to: Vec<String>,
    /// Headers and body, lines separated by `\n` or `\r\n`.
    pub data: String,
}

impl MailMessage {
    pub fn new(from: impl Into<String>, to: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: vec![to.into()],
            data: data.into(),
        }
    }

    pub fn with_recipient(mut self, to: impl Into<String>) -> Self {
        self.to.push(to.into());
        self
    }
}

/// Deliver a message: `MAIL FROM`, `RCPT TO` per recipient, `DATA`.
/// Returns the final reply of the server.
#[derive(Debug, Clone, Default)]
pub struct SendMail {
    log: bool,
}

impl SendMail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logging(mut self, log: bool) -> Self {
        self.log = log;
        self
    }
}

#[async_trait]
impl CommunicationMethod<MailMessage, Reply> for SendMail {
    fn token(&self) -> &str {
        "send-mail"
    }

    fn log_execution(&self) -> bool {
        self.log
    }

    async fn do_on(&self, connection: &mut Connection, message: MailMessage) -> CommunicationResult<Reply> {
        if message.to.is_empty() {
            return Err(CommunicationError::Protocol("message has no recipient".to_string()));
        }
        let channel = connection.control_mut()?;

        channel.expect(&format!("MAIL FROM:<{}>", message.from), &[250]).await?;
        for recipient in &message.to {
            channel.expect(&format!("RCPT TO:<{recipient}>"), &[250, 251]).await?;
        }
        channel.expect("DATA", &[354]).await?;

        let body = dot_stuff(&message.data);
        let timeout = channel.timeout();
        with_timeout(timeout, channel.stream_mut().write_all(body.as_bytes())).await?;
        channel.expect(".", &[250]).await
    }
}

/// Normalise line endings to CRLF and escape lines starting with `.`.
fn dot_stuff(data: &str) -> String {
    let mut out = String::with_capacity(data.len() + 16);
    for line in data.lines() {
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
        out.push_str("\r\n");
    }
    out
}
