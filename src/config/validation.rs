//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes and limits > 0)
//! - Check that dependent keys are present together (TLS files, proxy port)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: CommConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::CommConfig;

/// A single semantic violation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending key.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &CommConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let server = &config.server;

    if server.max_connections == 0 {
        errors.push(ValidationError::new("server.max_connections", "must be greater than 0"));
    }
    if server.max_request_size == 0 {
        errors.push(ValidationError::new("server.max_request_size", "must be greater than 0"));
    }
    if server.max_response_size == 0 {
        errors.push(ValidationError::new("server.max_response_size", "must be greater than 0"));
    }
    if server.http.max_header_line_size == 0 {
        errors.push(ValidationError::new(
            "server.http.max_header_line_size",
            "must be greater than 0",
        ));
    }
    if let Some(tls) = &server.tls {
        if tls.cert_path.is_empty() {
            errors.push(ValidationError::new("server.tls.cert_path", "must not be empty"));
        }
        if tls.key_path.is_empty() {
            errors.push(ValidationError::new("server.tls.key_path", "must not be empty"));
        }
    }

    let connection = &config.connection;
    if connection.timeout_ms == Some(0) {
        errors.push(ValidationError::new("connection.timeout_ms", "must be greater than 0"));
    }
    if connection.buffer_size == Some(0) {
        errors.push(ValidationError::new("connection.buffer_size", "must be greater than 0"));
    }
    if let Some(proxy) = &connection.proxy {
        if proxy.host.is_empty() {
            errors.push(ValidationError::new("connection.proxy.host", "must not be empty"));
        }
        if proxy.port.is_none() {
            errors.push(ValidationError::new("connection.proxy.port", "required with a proxy host"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
