//! commlink command line.
//!
//! - `serve` runs the HTTP echo service on the socket server
//! - `send` pushes text through an endpoint and prints the reply

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::Value;

use commlink::config::{load_and_apply, CommConfig, ConfigError};
use commlink::http::{EchoService, HttpRequestHandler};
use commlink::lifecycle::signals::stop_on_ctrl_c;
use commlink::observability::{init_logging, init_metrics};
use commlink::transport::{
    ControlCommand, HttpRequestMethod, JsonRpcCall, ResponseFraming, SocketRequest,
};
use commlink::{Endpoint, Server};

#[derive(Parser)]
#[command(name = "commlink")]
#[command(about = "Connect to endpoints or serve HTTP on a bounded socket server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP echo service
    Serve {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Listening port (overrides the configuration)
        #[arg(short, long)]
        port: Option<u16>,

        /// Maximum concurrent connections (overrides the configuration)
        #[arg(long)]
        max_connections: Option<usize>,
    },
    /// Send text to an endpoint and print the reply
    Send {
        /// Endpoint URI, e.g. socket://localhost:7000
        uri: String,

        /// TOML configuration file; its `[connection]` section sets the
        /// connection defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Text to send; HTTP sends a GET without it
        #[arg(short, long)]
        data: Option<String>,

        /// Remote method name for json-rpc endpoints
        #[arg(short, long, default_value = "ping")]
        method: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            port,
            max_connections,
        } => {
            let mut config = load(config.as_deref())?;
            init_logging(&config.observability.log_level);

            if port.is_some() {
                config.server.port = port;
            }
            if let Some(max) = max_connections {
                config.server.max_connections = max;
            }
            serve(config).await?;
        }
        Commands::Send {
            uri,
            config,
            data,
            method,
        } => {
            load(config.as_deref())?;
            init_logging("warn");
            let reply = send(&uri, data, method).await?;
            println!("{reply}");
        }
    }

    Ok(())
}

/// Load the configuration file, if any, and install its connection
/// defaults.
fn load(path: Option<&Path>) -> Result<CommConfig, ConfigError> {
    match path {
        Some(path) => load_and_apply(path),
        None => Ok(CommConfig::default()),
    }
}

async fn serve(config: CommConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    tracing::info!(
        bind_address = %config.server.bind_address,
        port = ?config.server.port,
        max_connections = config.server.max_connections,
        "commlink v0.1.0 starting"
    );

    let handler = HttpRequestHandler::from_config(EchoService, &config.server);
    let server = Server::new(config.server, handler);
    stop_on_ctrl_c(server.clone());
    server.run().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Send `data` with the default method of the URI's scheme.
async fn send(
    uri: &str,
    data: Option<String>,
    rpc_method: String,
) -> Result<String, Box<dyn std::error::Error>> {
    let endpoint = Endpoint::at(uri)?;
    let scheme = endpoint.scheme().trim_end_matches('s').to_string();

    let reply = match scheme.as_str() {
        "http" => {
            let method = match data {
                Some(_) => HttpRequestMethod::post(""),
                None => HttpRequestMethod::get(""),
            };
            endpoint.then(method).evaluate(data, None).await?
        }
        "json-rpc" => {
            let params = match data {
                Some(text) => serde_json::from_str(&text)?,
                None => Value::Null,
            };
            let result = endpoint.then(JsonRpcCall::new(rpc_method)).send(params).await?;
            serde_json::to_string_pretty(&result)?
        }
        "ftp" | "smtp" => {
            let line = data.ok_or("--data is required for ftp and smtp")?;
            endpoint.then(ControlCommand::new("command")).send(line).await?.to_string()
        }
        _ => {
            let bytes = match data {
                Some(text) => {
                    let request = endpoint.then(SocketRequest::line());
                    request.send(format!("{text}\n").into_bytes()).await?
                }
                None => {
                    let request = endpoint.then(SocketRequest::receive(ResponseFraming::Line));
                    request.receive().await?
                }
            };
            String::from_utf8_lossy(&bytes).trim_end().to_string()
        }
    };
    Ok(reply)
}
