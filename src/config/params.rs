//! Layered connection parameters.
//!
//! A connection's configuration is assembled from three layers, each
//! overriding the previous one only for the keys it defines:
//!
//! ```text
//! library defaults (builtin ⊕ set_default_params)
//!     ⊕ endpoint parameters (URI credentials, Endpoint::with_params)
//!     ⊕ call parameters (Endpoint::connect / EndpointFunction::evaluate)
//! ```

use std::collections::BTreeMap;
use std::sync::{LazyLock, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default connect and read timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
/// Default I/O buffer size in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;
/// Default upper bound for a response read by a client method.
pub const DEFAULT_MAX_RESPONSE_SIZE: u64 = 1024 * 1024;

static DEFAULT_PARAMS: LazyLock<RwLock<ConnectionParams>> =
    LazyLock::new(|| RwLock::new(ConnectionParams::builtin()));

/// Replace the library-wide default layer.
///
/// Keys not defined in `params` keep their built-in defaults.
pub fn set_default_params(params: &ConnectionParams) {
    let merged = ConnectionParams::builtin().overlay(params);
    *DEFAULT_PARAMS.write().unwrap_or_else(PoisonError::into_inner) = merged;
}

/// The current library-wide default layer.
pub fn default_params() -> ConnectionParams {
    DEFAULT_PARAMS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Proxy settings for transports that support one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProxyParams {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Connection parameters. Every key is optional so that a value can act as
/// one layer of the configuration stack.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionParams {
    /// Connect and read timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// I/O buffer size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<usize>,

    /// Maximum number of response bytes a client method reads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_size: Option<u64>,

    /// Use the encrypted variant of the transport.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption: Option<bool>,

    /// Accept self-signed (unverifiable) server certificates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_self_signed: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// PEM file with additional trusted root certificates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyParams>,

    /// Transport-specific keys (e.g. `smtp.helo`).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

macro_rules! take_defined {
    ($merged:ident, $other:ident, $($field:ident),+) => {
        $(
            if $other.$field.is_some() {
                $merged.$field = $other.$field.clone();
            }
        )+
    };
}

impl ConnectionParams {
    /// Empty layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fully populated built-in defaults.
    pub fn builtin() -> Self {
        Self {
            timeout_ms: Some(DEFAULT_TIMEOUT_MS),
            buffer_size: Some(DEFAULT_BUFFER_SIZE),
            max_response_size: Some(DEFAULT_MAX_RESPONSE_SIZE),
            trust_self_signed: Some(false),
            ..Self::default()
        }
    }

    /// Return a copy of `self` with every key defined by `other` replaced.
    pub fn overlay(&self, other: &ConnectionParams) -> ConnectionParams {
        let mut merged = self.clone();
        take_defined!(
            merged,
            other,
            timeout_ms,
            buffer_size,
            max_response_size,
            encryption,
            trust_self_signed,
            user,
            password,
            ca_cert_path,
            proxy
        );
        for (key, value) in &other.extra {
            merged.extra.insert(key.clone(), value.clone());
        }
        merged
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    pub fn with_max_response_size(mut self, size: u64) -> Self {
        self.max_response_size = Some(size);
        self
    }

    pub fn with_encryption(mut self, encryption: bool) -> Self {
        self.encryption = Some(encryption);
        self
    }

    pub fn with_trust_self_signed(mut self, trust: bool) -> Self {
        self.trust_self_signed = Some(trust);
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_ca_cert_path(mut self, path: impl Into<String>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyParams) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Connect and read timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS))
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE)
    }

    pub fn max_response_size(&self) -> u64 {
        self.max_response_size.unwrap_or(DEFAULT_MAX_RESPONSE_SIZE)
    }

    pub fn encryption(&self) -> bool {
        self.encryption.unwrap_or(false)
    }

    pub fn trust_self_signed(&self) -> bool {
        self.trust_self_signed.unwrap_or(false)
    }

    /// Look up a transport-specific key.
    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }
}

impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("timeout_ms", &self.timeout_ms)
            .field("buffer_size", &self.buffer_size)
            .field("max_response_size", &self.max_response_size)
            .field("encryption", &self.encryption)
            .field("trust_self_signed", &self.trust_self_signed)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ca_cert_path", &self.ca_cert_path)
            .field("proxy", &self.proxy.as_ref().map(|p| (&p.host, p.port)))
            .field("extra", &self.extra)
            .finish()
    }
}
