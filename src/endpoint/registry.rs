//! Scheme registry: URI scheme → transport factory.
//!
//! # Responsibilities
//! - Hold the built-in transports, registered on first use
//! - Accept user registrations (`register_endpoint_type`)
//! - Derive the encrypted `<scheme>s` variant from a registered `<scheme>`
//!
//! # Design Decisions
//! - Lookups are case-insensitive (keys stored lowercase)
//! - A factory is called once per `Endpoint::at`, so every endpoint gets its
//!   own transport instance

use std::sync::{Arc, LazyLock};

use dashmap::DashMap;

use crate::endpoint::{parse_uri, Endpoint, Transport};
use crate::error::{CommunicationError, CommunicationResult};
use crate::transport::{
    ftp::FtpTransport, http::HttpTransport, jsonrpc::JsonRpcTransport, pipe::PipeTransport,
    smtp::SmtpTransport, socket::SocketTransport,
};

/// Constructor for a transport instance.
pub type TransportFactory = Arc<dyn Fn() -> Arc<dyn Transport> + Send + Sync>;

static REGISTRY: LazyLock<DashMap<String, TransportFactory>> = LazyLock::new(|| {
    let registry = DashMap::new();
    let builtin: [(&str, TransportFactory); 6] = [
        ("http", Arc::new(|| Arc::new(HttpTransport) as Arc<dyn Transport>)),
        ("socket", Arc::new(|| Arc::new(SocketTransport) as Arc<dyn Transport>)),
        ("pipe", Arc::new(|| Arc::new(PipeTransport) as Arc<dyn Transport>)),
        ("ftp", Arc::new(|| Arc::new(FtpTransport) as Arc<dyn Transport>)),
        ("smtp", Arc::new(|| Arc::new(SmtpTransport) as Arc<dyn Transport>)),
        ("json-rpc", Arc::new(|| Arc::new(JsonRpcTransport) as Arc<dyn Transport>)),
    ];
    for (scheme, factory) in builtin {
        registry.insert(format!("{scheme}s"), Arc::clone(&factory));
        registry.insert(scheme.to_string(), factory);
    }
    registry
});

/// Register (or replace) the transport used for `scheme`.
pub fn register_endpoint_type<F, T>(scheme: &str, factory: F)
where
    F: Fn() -> T + Send + Sync + 'static,
    T: Transport,
{
    let scheme = scheme.to_ascii_lowercase();
    tracing::debug!(scheme = %scheme, "Registering endpoint type");
    REGISTRY.insert(
        scheme,
        Arc::new(move || Arc::new(factory()) as Arc<dyn Transport>),
    );
}

/// All currently registered schemes, sorted.
pub fn registered_schemes() -> Vec<String> {
    let mut schemes: Vec<String> = REGISTRY.iter().map(|e| e.key().clone()).collect();
    schemes.sort();
    schemes
}

fn lookup(scheme: &str) -> Option<TransportFactory> {
    if let Some(factory) = REGISTRY.get(scheme) {
        return Some(Arc::clone(factory.value()));
    }

    // `<scheme>s` is the encrypted variant of a registered `<scheme>`.
    let plain = scheme.strip_suffix('s').filter(|p| !p.is_empty())?;
    let factory = REGISTRY.get(plain).map(|f| Arc::clone(f.value()))?;
    tracing::debug!(scheme = %scheme, plain = %plain, "Deriving encrypted endpoint type");
    REGISTRY.insert(scheme.to_string(), Arc::clone(&factory));
    Some(factory)
}

impl Endpoint {
    /// Resolve `uri` to an endpoint through the scheme registry.
    pub fn at(uri: &str) -> CommunicationResult<Endpoint> {
        let scheme = parse_uri(uri)?.scheme().to_ascii_lowercase();
        let factory =
            lookup(&scheme).ok_or_else(|| CommunicationError::UnsupportedScheme(scheme.clone()))?;
        Endpoint::with_transport(uri, factory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Connection;
    use async_trait::async_trait;

    struct Dummy;

    #[async_trait]
    impl Transport for Dummy {
        async fn init_connection(&self, _c: &mut Connection) -> CommunicationResult<()> {
            Ok(())
        }
        async fn close_connection(&self, _c: &mut Connection) -> CommunicationResult<()> {
            Ok(())
        }
    }

    #[test]
    fn builtin_schemes_resolve() {
        for uri in [
            "http://localhost/",
            "https://localhost/",
            "socket://localhost:1",
            "sockets://localhost:1",
            "pipe:///tmp/commlink.sock",
            "ftp://localhost",
            "smtps://localhost",
            "json-rpc://localhost/rpc",
        ] {
            assert!(Endpoint::at(uri).is_ok(), "{uri}");
        }
    }

    #[test]
    fn scheme_lookup_is_case_insensitive() {
        let endpoint = Endpoint::at("SOCKET://localhost:1").unwrap();
        assert_eq!(endpoint.scheme(), "socket");
    }

    #[test]
    fn unknown_scheme_names_the_scheme() {
        let err = Endpoint::at("gopher://localhost").unwrap_err();
        match err {
            CommunicationError::UnsupportedScheme(scheme) => assert_eq!(scheme, "gopher"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn encrypted_variant_is_derived_and_registered() {
        register_endpoint_type("dummy-registry", || Dummy);
        let endpoint = Endpoint::at("dummy-registrys://host").unwrap();
        assert!(endpoint.is_encrypted());
        assert!(registered_schemes().contains(&"dummy-registrys".to_string()));

        let plain = Endpoint::at("Dummy-Registry://host").unwrap();
        assert!(!plain.is_encrypted());
    }
}
