//! Endpoint function lifecycle: one connection per evaluation, always closed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use commlink::endpoint::{register_endpoint_type, Resource};
use commlink::method::FnMethod;
use commlink::net::ConnectionState;
use commlink::{
    CommunicationError, CommunicationMethod, CommunicationResult, Connection, Endpoint,
    MethodExt, Transport,
};

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Keeps a per-connection list of inputs as its resource.
struct Recording {
    counters: Arc<Counters>,
    fail_init: bool,
    fail_close: bool,
}

impl Recording {
    fn new(counters: &Arc<Counters>) -> Self {
        Self {
            counters: Arc::clone(counters),
            fail_init: false,
            fail_close: false,
        }
    }
}

#[async_trait]
impl Transport for Recording {
    async fn init_connection(&self, connection: &mut Connection) -> CommunicationResult<()> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        connection.set_resource(Resource::Custom(Box::new(Vec::<String>::new())));
        if self.fail_init {
            return Err(CommunicationError::Protocol("handshake refused".to_string()));
        }
        Ok(())
    }

    async fn close_connection(&self, _connection: &mut Connection) -> CommunicationResult<()> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(CommunicationError::Protocol("close failed".to_string()));
        }
        Ok(())
    }
}

/// Appends the input to the connection log and returns the log length.
fn push() -> FnMethod<String, usize> {
    FnMethod::new("push", |connection: &mut Connection, input: String| {
        Box::pin(async move {
            let log = connection.custom_mut::<Vec<String>>()?;
            log.push(input);
            Ok::<_, CommunicationError>(log.len())
        })
    })
}

fn failing() -> FnMethod<String, usize> {
    FnMethod::new("failing", |_connection: &mut Connection, _input: String| {
        Box::pin(async move { Err::<usize, _>(CommunicationError::Message("method failed".to_string())) })
    })
}

#[tokio::test]
async fn each_evaluation_opens_and_closes_once() {
    let counters = Arc::new(Counters::default());
    let endpoint = Endpoint::new("mock://host", Recording::new(&counters)).unwrap();
    let function = endpoint.then(push());

    assert_eq!(function.send("a".to_string()).await.unwrap(), 1);
    // A fresh connection per call, so the log starts empty again.
    assert_eq!(function.send("b".to_string()).await.unwrap(), 1);

    assert_eq!(counters.opened.load(Ordering::SeqCst), 2);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn connection_is_closed_when_the_method_fails() {
    let counters = Arc::new(Counters::default());
    let endpoint = Endpoint::new("mock://host", Recording::new(&counters)).unwrap();
    let function = endpoint.then(failing());

    let err = function.send("x".to_string()).await.unwrap_err();
    assert!(matches!(err, CommunicationError::Message(_)));
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);

    let last = function.last_connection().unwrap();
    assert_eq!(last.state, ConnectionState::Closed);
    assert_eq!(last.address.as_str(), "mock://host");
}

#[tokio::test]
async fn close_error_never_masks_the_method_error() {
    let counters = Arc::new(Counters::default());
    let transport = Recording {
        fail_close: true,
        ..Recording::new(&counters)
    };
    let endpoint = Endpoint::new("mock://host", transport).unwrap();

    let err = endpoint.then(failing()).send("x".to_string()).await.unwrap_err();
    assert!(matches!(err, CommunicationError::Message(_)));

    // With a successful method the close failure is the result.
    let err = endpoint.then(push()).send("x".to_string()).await.unwrap_err();
    assert!(matches!(err, CommunicationError::Protocol(ref m) if m == "close failed"));
    assert_eq!(counters.closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_init_releases_the_partial_connection() {
    let counters = Arc::new(Counters::default());
    let transport = Recording {
        fail_init: true,
        ..Recording::new(&counters)
    };
    let endpoint = Endpoint::new("mock://host", transport).unwrap();

    let err = endpoint.then(push()).send("x".to_string()).await.unwrap_err();
    assert!(matches!(err, CommunicationError::Protocol(ref m) if m == "handshake refused"));
    assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_input_is_reported_before_any_io() {
    let counters = Arc::new(Counters::default());
    let endpoint = Endpoint::new("mock://host", Recording::new(&counters)).unwrap();

    let err = endpoint.then(push()).receive().await.unwrap_err();
    assert!(matches!(err, CommunicationError::MissingInput(ref t) if t == "push"));
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);

    let with_default = endpoint.then(push().with_default_input("d".to_string()));
    assert_eq!(with_default.receive().await.unwrap(), 1);
}

#[tokio::test]
async fn transforms_and_method_chains_share_one_connection() {
    let counters = Arc::new(Counters::default());
    let endpoint = Endpoint::new("mock://host", Recording::new(&counters)).unwrap();

    let described = endpoint.then(push()).then(|n| format!("{n} entries"));
    assert_eq!(described.send("a".to_string()).await.unwrap(), "1 entries");

    // The second push sees the first one's entry: same connection.
    let twice = push().then(|n: usize| n.to_string()).then_method(push());
    assert!(twice.token().contains("push"));
    assert_eq!(endpoint.then(twice).send("a".to_string()).await.unwrap(), 2);

    let via_function = endpoint
        .then(push())
        .then(|n| n.to_string())
        .then_method(push().then(|n: usize| n * 10));
    assert_eq!(via_function.send("a".to_string()).await.unwrap(), 20);

    assert_eq!(counters.opened.load(Ordering::SeqCst), 3);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn closed_connection_rejects_methods() {
    let counters = Arc::new(Counters::default());
    let endpoint = Endpoint::new("mock://host", Recording::new(&counters)).unwrap();

    let mut connection = endpoint.connect(None).await.unwrap();
    connection.close().await.unwrap();
    connection.close().await.unwrap();
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);

    let err = push().evaluate(Some("x".to_string()), &mut connection).await.unwrap_err();
    assert!(matches!(err, CommunicationError::Closed));
}

#[tokio::test]
async fn registered_scheme_resolves_through_at() {
    let counters = Arc::new(Counters::default());
    let shared = Arc::clone(&counters);
    register_endpoint_type("recording", move || Recording::new(&shared));

    let endpoint = Endpoint::at("RECORDING://host:1").unwrap();
    assert!(!endpoint.is_encrypted());
    assert_eq!(endpoint.then(push()).send("x".to_string()).await.unwrap(), 1);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);

    let encrypted = Endpoint::at("recordings://host:1").unwrap();
    assert!(encrypted.is_encrypted());
}
