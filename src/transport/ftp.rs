//! FTP control-channel transport (`ftp://`, `ftps://`).
//!
//! Only the control connection is managed: connect, greeting, login,
//! `QUIT` on close. Commands are exchanged with [`FtpCommand`].

use async_trait::async_trait;

use crate::endpoint::{Connection, Resource, Transport};
use crate::error::CommunicationResult;
use crate::transport::reply::{ensure_code, ControlChannel, ControlCommand};
use crate::transport::socket::open_channel;

pub const FTP_PORT: u16 = 21;
pub const FTPS_PORT: u16 = 990;

const ANONYMOUS_USER: &str = "anonymous";
const ANONYMOUS_PASSWORD: &str = "anonymous@";
const MAX_REPLY_LINE: u64 = 8 * 1024;

/// Sends one FTP command and returns the reply.
pub type FtpCommand = ControlCommand;

#[derive(Debug, Default)]
pub struct FtpTransport;

#[async_trait]
impl Transport for FtpTransport {
    async fn init_connection(&self, connection: &mut Connection) -> CommunicationResult<()> {
        let port = if connection.params().encryption() {
            FTPS_PORT
        } else {
            FTP_PORT
        };
        let stream = open_channel(connection, Some(port)).await?;
        let timeout = connection.params().timeout();
        connection.set_resource(Resource::Control(ControlChannel::new(
            stream,
            timeout,
            MAX_REPLY_LINE,
        )));

        let user = connection
            .params()
            .user
            .clone()
            .unwrap_or_else(|| ANONYMOUS_USER.to_string());
        let password = connection
            .params()
            .password
            .clone()
            .unwrap_or_else(|| ANONYMOUS_PASSWORD.to_string());
        let id = connection.id();
        let channel = connection.control_mut()?;

        let mut greeting = channel.read_reply().await?;
        while greeting.code == 120 {
            greeting = channel.read_reply().await?;
        }
        let greeting = ensure_code(greeting, &[220])?;

        let reply = channel.expect(&format!("USER {user}"), &[230, 331, 332]).await?;
        if reply.code == 331 || reply.code == 332 {
            channel.expect(&format!("PASS {password}"), &[202, 230]).await?;
        }

        tracing::debug!(connection_id = %id, user = %user, "FTP login complete");
        connection.set_attribute("greeting", greeting.message());
        Ok(())
    }

    async fn close_connection(&self, connection: &mut Connection) -> CommunicationResult<()> {
        let Some(Resource::Control(mut channel)) = connection.take_resource() else {
            return Ok(());
        };
        let quit = channel.command("QUIT").await;
        let shutdown = channel.shutdown().await;
        quit?;
        shutdown
    }
}
