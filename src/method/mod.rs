//! Communication methods: composable functions evaluated on a connection.
//!
//! # Data Flow
//! ```text
//! evaluate(input, connection)
//!     → default input substituted when none is given
//!     → do_on(connection, input)   (transport-specific)
//!     → optional log line, errors always propagated
//!
//! method.then(f)          → CommunicationChain: f(method(x))
//! method.then_method(m2)  → MethodChain: m2(method(x)) on the same connection
//! ```

pub mod chain;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::endpoint::Connection;
use crate::error::{CommunicationError, CommunicationResult};

pub use chain::{CommunicationChain, MethodChain};

/// A named function `(input, connection) → output`.
#[async_trait]
pub trait CommunicationMethod<I, O>: Send + Sync
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Name used in logs and in the tokens of derived chains.
    fn token(&self) -> &str;

    /// Input substituted when the caller supplies none.
    fn default_input(&self) -> Option<I> {
        None
    }

    /// Whether evaluations are logged.
    fn log_execution(&self) -> bool {
        false
    }

    /// Run the method against an open connection.
    async fn do_on(&self, connection: &mut Connection, input: I) -> CommunicationResult<O>;

    /// Evaluate the method. Errors are logged (when enabled) and returned
    /// unchanged.
    async fn evaluate(&self, input: Option<I>, connection: &mut Connection) -> CommunicationResult<O> {
        if connection.is_closed() {
            return Err(CommunicationError::Closed);
        }
        let input = match input.or_else(|| self.default_input()) {
            Some(input) => input,
            None => return Err(CommunicationError::MissingInput(self.token().to_string())),
        };

        let started = Instant::now();
        let result = self.do_on(connection, input).await;
        if self.log_execution() {
            match &result {
                Ok(_) => tracing::info!(
                    method = self.token(),
                    connection_id = %connection.id(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Method evaluated"
                ),
                Err(e) => tracing::warn!(
                    method = self.token(),
                    connection_id = %connection.id(),
                    error = %e,
                    "Method failed"
                ),
            }
        }
        result
    }
}

#[async_trait]
impl<I, O, M> CommunicationMethod<I, O> for Arc<M>
where
    I: Send + 'static,
    O: Send + 'static,
    M: CommunicationMethod<I, O> + ?Sized,
{
    fn token(&self) -> &str {
        (**self).token()
    }

    fn default_input(&self) -> Option<I> {
        (**self).default_input()
    }

    fn log_execution(&self) -> bool {
        (**self).log_execution()
    }

    async fn do_on(&self, connection: &mut Connection, input: I) -> CommunicationResult<O> {
        (**self).do_on(connection, input).await
    }

    async fn evaluate(&self, input: Option<I>, connection: &mut Connection) -> CommunicationResult<O> {
        (**self).evaluate(input, connection).await
    }
}

#[async_trait]
impl<I, O, M> CommunicationMethod<I, O> for Box<M>
where
    I: Send + 'static,
    O: Send + 'static,
    M: CommunicationMethod<I, O> + ?Sized,
{
    fn token(&self) -> &str {
        (**self).token()
    }

    fn default_input(&self) -> Option<I> {
        (**self).default_input()
    }

    fn log_execution(&self) -> bool {
        (**self).log_execution()
    }

    async fn do_on(&self, connection: &mut Connection, input: I) -> CommunicationResult<O> {
        (**self).do_on(connection, input).await
    }

    async fn evaluate(&self, input: Option<I>, connection: &mut Connection) -> CommunicationResult<O> {
        (**self).evaluate(input, connection).await
    }
}

/// Composition helpers available on every method.
pub trait MethodExt<I, O>: CommunicationMethod<I, O> + Sized
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Apply a plain transform to the result; token `transform(<token>)`.
    fn then<P, F>(self, transform: F) -> CommunicationChain<Self, O, P>
    where
        P: Send + 'static,
        F: Fn(O) -> P + Send + Sync + 'static,
    {
        self.then_named("transform", transform)
    }

    /// Like [`MethodExt::then`] with an explicit transform name.
    fn then_named<P, F>(self, name: &str, transform: F) -> CommunicationChain<Self, O, P>
    where
        P: Send + 'static,
        F: Fn(O) -> P + Send + Sync + 'static,
    {
        CommunicationChain::new(self, name, move |o| Ok(transform(o)))
    }

    /// Apply a fallible transform to the result.
    fn then_try<P, F>(self, name: &str, transform: F) -> CommunicationChain<Self, O, P>
    where
        P: Send + 'static,
        F: Fn(O) -> CommunicationResult<P> + Send + Sync + 'static,
    {
        CommunicationChain::new(self, name, transform)
    }

    /// Feed the result into another method on the same connection.
    fn then_method<P, M>(self, next: M) -> MethodChain<Self, M, O>
    where
        P: Send + 'static,
        M: CommunicationMethod<O, P>,
    {
        MethodChain::new(self, next)
    }
}

impl<I, O, M> MethodExt<I, O> for M
where
    I: Send + 'static,
    O: Send + 'static,
    M: CommunicationMethod<I, O>,
{
}

/// Future returned by [`FnMethod`] closures.
pub type MethodFuture<'a, O> = BoxFuture<'a, CommunicationResult<O>>;

type MethodFn<I, O> = dyn for<'a> Fn(&'a mut Connection, I) -> MethodFuture<'a, O> + Send + Sync;

/// A method defined by a closure.
///
/// ```ignore
/// let upper = FnMethod::new("upper", |_conn, input: String| {
///     Box::pin(async move { Ok(input.to_uppercase()) })
/// });
/// ```
pub struct FnMethod<I, O> {
    token: String,
    default_input: Option<I>,
    log: bool,
    f: Arc<MethodFn<I, O>>,
}

impl<I, O> FnMethod<I, O> {
    pub fn new<F>(token: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Connection, I) -> MethodFuture<'a, O> + Send + Sync + 'static,
    {
        Self {
            token: token.into(),
            default_input: None,
            log: false,
            f: Arc::new(f),
        }
    }

    pub fn with_default_input(mut self, input: I) -> Self {
        self.default_input = Some(input);
        self
    }

    pub fn with_logging(mut self, log: bool) -> Self {
        self.log = log;
        self
    }
}

#[async_trait]
impl<I, O> CommunicationMethod<I, O> for FnMethod<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    fn token(&self) -> &str {
        &self.token
    }

    fn default_input(&self) -> Option<I> {
        self.default_input.clone()
    }

    fn log_execution(&self) -> bool {
        self.log
    }

    async fn do_on(&self, connection: &mut Connection, input: I) -> CommunicationResult<O> {
        (self.f)(connection, input).await
    }
}
