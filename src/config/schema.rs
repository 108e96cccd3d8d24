//! Configuration schema definitions.
//!
//! This module defines the configuration document of the library.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::config::params::ConnectionParams;

/// Root configuration document.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CommConfig {
    /// Library-wide defaults for client connections.
    pub connection: ConnectionParams,

    /// Socket server settings.
    pub server: ServerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Socket server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub bind_address: String,

    /// Listening port. Required to run; `0` picks an ephemeral port.
    pub port: Option<u16>,

    /// Maximum concurrently handled connections (admission control).
    pub max_connections: usize,

    /// Maximum number of bytes read from one client.
    pub max_request_size: u64,

    /// Maximum number of bytes written to one client.
    pub max_response_size: u64,

    /// Serve over TLS.
    pub encryption: bool,

    /// Certificate files. Without them an encrypted server uses a
    /// self-signed certificate.
    pub tls: Option<TlsConfig>,

    /// HTTP codec limits.
    pub http: HttpConfig,
}

impl ServerConfig {
    /// Configuration listening on the given port with all other defaults.
    pub fn with_port(port: u16) -> Self {
        Self {
            port: Some(port),
            ..Self::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: None,
            max_connections: default_max_connections(),
            max_request_size: 64 * 1024,
            max_response_size: 1024 * 1024,
            encryption: false,
            tls: None,
            http: HttpConfig::default(),
        }
    }
}

fn default_max_connections() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(4)
}

/// TLS certificate configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// HTTP codec configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Longest accepted request or header line, excluding the CRLF.
    pub max_header_line_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_header_line_size: 8 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter used when `RUST_LOG` is not set.
    pub log_level: String,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let config = ServerConfig::default();
        assert!(config.port.is_none());
        assert!(config.max_connections >= 4);
        assert_eq!(config.max_request_size, 64 * 1024);
        assert_eq!(config.max_response_size, 1024 * 1024);
        assert_eq!(config.http.max_header_line_size, 8 * 1024);
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config: CommConfig = toml::from_str(
            r#"
            [server]
            port = 8080
            max_connections = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, Some(8080));
        assert_eq!(config.server.max_connections, 2);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert!(!config.server.encryption);
    }
}
