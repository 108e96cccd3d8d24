//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CommConfig (validated, immutable)
//!
//! Client connections:
//!     params.rs defaults ⊕ endpoint layer ⊕ call layer
//!     → merged ConnectionParams snapshot owned by each Connection
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod params;
pub mod schema;
pub mod validation;

pub use loader::{load_and_apply, load_config, ConfigError};
pub use params::{default_params, set_default_params, ConnectionParams, ProxyParams};
pub use schema::{CommConfig, HttpConfig, ObservabilityConfig, ServerConfig, TlsConfig};
