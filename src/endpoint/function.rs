//! Endpoint functions: an endpoint bound to a communication method.
//!
//! Each evaluation opens a fresh connection, runs the method on it and
//! closes it before returning, on success and on failure alike.

use std::sync::{Arc, Mutex, PoisonError};

use url::Url;

use crate::config::ConnectionParams;
use crate::endpoint::Endpoint;
use crate::error::CommunicationResult;
use crate::method::{CommunicationChain, CommunicationMethod, MethodChain};
use crate::net::{ConnectionId, ConnectionState};

/// Diagnostic view of the connection most recently opened by a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub id: ConnectionId,
    pub address: Url,
    pub state: ConnectionState,
}

/// An endpoint bound to a communication method.
pub struct EndpointFunction<I, O> {
    endpoint: Endpoint,
    method: Arc<dyn CommunicationMethod<I, O>>,
    last_connection: Arc<Mutex<Option<ConnectionSnapshot>>>,
}

impl<I, O> Clone for EndpointFunction<I, O> {
    fn clone(&self) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            method: Arc::clone(&self.method),
            last_connection: Arc::clone(&self.last_connection),
        }
    }
}

impl<I, O> EndpointFunction<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn new<M>(endpoint: Endpoint, method: M) -> Self
    where
        M: CommunicationMethod<I, O> + 'static,
    {
        Self::from_arc(endpoint, Arc::new(method))
    }

    fn from_arc(endpoint: Endpoint, method: Arc<dyn CommunicationMethod<I, O>>) -> Self {
        Self {
            endpoint,
            method,
            last_connection: Arc::new(Mutex::new(None)),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Token of the wrapped method.
    pub fn token(&self) -> &str {
        self.method.token()
    }

    /// Open a connection, evaluate the method, close the connection.
    ///
    /// A close failure is returned only when the method itself succeeded;
    /// otherwise it is logged and the method's error is returned.
    pub async fn evaluate(
        &self,
        input: Option<I>,
        params: Option<&ConnectionParams>,
    ) -> CommunicationResult<O> {
        let mut connection = self.endpoint.connect(params).await?;
        self.record(ConnectionSnapshot {
            id: connection.id(),
            address: self.endpoint.address().clone(),
            state: ConnectionState::Open,
        });

        let result = self.method.evaluate(input, &mut connection).await;
        let closed = connection.close().await;
        self.record(ConnectionSnapshot {
            id: connection.id(),
            address: self.endpoint.address().clone(),
            state: connection.state(),
        });

        match (result, closed) {
            (Ok(output), Ok(())) => Ok(output),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(err), _) => Err(err),
        }
    }

    /// Evaluate with an explicit input and default parameters.
    pub async fn send(&self, input: I) -> CommunicationResult<O> {
        self.evaluate(Some(input), None).await
    }

    /// Evaluate with the method's default input.
    pub async fn receive(&self) -> CommunicationResult<O> {
        self.evaluate(None, None).await
    }

    /// Post-process every result with `transform`.
    pub fn then<P, F>(&self, transform: F) -> EndpointFunction<I, P>
    where
        P: Send + 'static,
        F: Fn(O) -> P + Send + Sync + 'static,
    {
        let chain = CommunicationChain::new(Arc::clone(&self.method), "transform", move |o| {
            Ok(transform(o))
        });
        EndpointFunction::new(self.endpoint.clone(), chain)
    }

    /// Feed every result into `next`, evaluated on the same connection.
    pub fn then_method<P, M>(&self, next: M) -> EndpointFunction<I, P>
    where
        P: Send + 'static,
        M: CommunicationMethod<O, P> + 'static,
    {
        let chain = MethodChain::new(Arc::clone(&self.method), next);
        EndpointFunction::new(self.endpoint.clone(), chain)
    }

    /// The connection opened by the most recent evaluation.
    pub fn last_connection(&self) -> Option<ConnectionSnapshot> {
        self.last_connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, snapshot: ConnectionSnapshot) {
        *self
            .last_connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }
}

impl<I, O> std::fmt::Debug for EndpointFunction<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointFunction")
            .field("endpoint", &self.endpoint.address().as_str())
            .field("method", &self.method.token())
            .finish()
    }
}
