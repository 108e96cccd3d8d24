//! Method chains.
//!
//! Both chain types are full communication methods themselves, so they log
//! like any other method and can be chained again.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::endpoint::Connection;
use crate::error::CommunicationResult;
use crate::method::CommunicationMethod;

type Transform<O, P> = dyn Fn(O) -> CommunicationResult<P> + Send + Sync;

/// A method followed by a plain transform of its result.
pub struct CommunicationChain<M, O, P> {
    first: M,
    transform: Arc<Transform<O, P>>,
    token: String,
    log: bool,
}

impl<M, O, P> CommunicationChain<M, O, P> {
    /// Chain `first` with `transform`; the token becomes `name(<first token>)`.
    pub fn new<I, F>(first: M, name: &str, transform: F) -> Self
    where
        I: Send + 'static,
        O: Send + 'static,
        M: CommunicationMethod<I, O>,
        F: Fn(O) -> CommunicationResult<P> + Send + Sync + 'static,
    {
        let token = format!("{}({})", name, first.token());
        Self {
            first,
            transform: Arc::new(transform),
            token,
            log: false,
        }
    }

    pub fn with_logging(mut self, log: bool) -> Self {
        self.log = log;
        self
    }
}

#[async_trait]
impl<I, O, P, M> CommunicationMethod<I, P> for CommunicationChain<M, O, P>
where
    I: Send + 'static,
    O: Send + 'static,
    P: Send + 'static,
    M: CommunicationMethod<I, O>,
{
    fn token(&self) -> &str {
        &self.token
    }

    fn default_input(&self) -> Option<I> {
        self.first.default_input()
    }

    fn log_execution(&self) -> bool {
        self.log
    }

    async fn do_on(&self, connection: &mut Connection, input: I) -> CommunicationResult<P> {
        let intermediate = self.first.evaluate(Some(input), connection).await?;
        (self.transform)(intermediate)
    }
}

/// A method whose result is the input of a second method evaluated on the
/// same connection.
pub struct MethodChain<A, B, O> {
    first: A,
    next: B,
    token: String,
    log: bool,
    _intermediate: PhantomData<fn() -> O>,
}

impl<A, B, O> MethodChain<A, B, O> {
    /// Chain `first` into `next`; the token becomes `<next>(<first>)`.
    pub fn new<I, P>(first: A, next: B) -> Self
    where
        I: Send + 'static,
        O: Send + 'static,
        P: Send + 'static,
        A: CommunicationMethod<I, O>,
        B: CommunicationMethod<O, P>,
    {
        let token = format!("{}({})", next.token(), first.token());
        Self {
            first,
            next,
            token,
            log: false,
            _intermediate: PhantomData,
        }
    }

    pub fn with_logging(mut self, log: bool) -> Self {
        self.log = log;
        self
    }
}

#[async_trait]
impl<I, O, P, A, B> CommunicationMethod<I, P> for MethodChain<A, B, O>
where
    I: Send + 'static,
    O: Send + 'static,
    P: Send + 'static,
    A: CommunicationMethod<I, O>,
    B: CommunicationMethod<O, P>,
{
    fn token(&self) -> &str {
        &self.token
    }

    fn default_input(&self) -> Option<I> {
        self.first.default_input()
    }

    fn log_execution(&self) -> bool {
        self.log
    }

    async fn do_on(&self, connection: &mut Connection, input: I) -> CommunicationResult<P> {
        let intermediate = self.first.evaluate(Some(input), connection).await?;
        self.next.evaluate(Some(intermediate), connection).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{Endpoint, Transport};
    use crate::error::CommunicationError;
    use crate::method::{FnMethod, MethodExt};
    use crate::net::ConnectionId;

    struct Noop;

    #[async_trait]
    impl Transport for Noop {
        async fn init_connection(&self, _c: &mut Connection) -> CommunicationResult<()> {
            Ok(())
        }
        async fn close_connection(&self, _c: &mut Connection) -> CommunicationResult<()> {
            Ok(())
        }
    }

    fn length() -> FnMethod<String, usize> {
        FnMethod::new("length", |_conn, input: String| {
            Box::pin(async move { Ok(input.len()) })
        })
    }

    async fn open() -> Connection {
        Endpoint::new("noop://host", Noop)
            .unwrap()
            .connect(None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn chain_applies_transform_after_method() {
        let mut connection = open().await;
        let chain = length().then(|n: usize| n * 2);

        assert_eq!(chain.token(), "transform(length)");
        let out = chain.evaluate(Some("abcd".into()), &mut connection).await.unwrap();
        let direct = length().evaluate(Some("abcd".into()), &mut connection).await.unwrap();
        assert_eq!(out, direct * 2);
        connection.close().await.unwrap();
    }

    #[tokio::test]
    async fn chain_is_chainable_and_keeps_default_input() {
        let mut connection = open().await;
        let chain = length()
            .with_default_input("xyz".into())
            .then_named("double", |n: usize| n * 2)
            .then_named("describe", |n: usize| format!("{n} bytes"));

        assert_eq!(chain.token(), "describe(double(length))");
        assert_eq!(chain.evaluate(None, &mut connection).await.unwrap(), "6 bytes");
        connection.close().await.unwrap();
    }

    #[tokio::test]
    async fn chain_propagates_first_error_unchanged() {
        let mut connection = open().await;
        let failing = FnMethod::new("fail", |_conn, _input: String| {
            Box::pin(async move { Err::<usize, _>(CommunicationError::Reply { code: 550, message: "nope".into() }) })
        });
        let chain = failing.then(|n: usize| n + 1);

        let err = chain.evaluate(Some("x".into()), &mut connection).await.unwrap_err();
        assert!(matches!(err, CommunicationError::Reply { code: 550, .. }));
        connection.close().await.unwrap();
    }

    #[tokio::test]
    async fn method_chain_reuses_connection() {
        let mut connection = open().await;
        let expected = connection.id();
        let first = FnMethod::new("id", |conn: &mut Connection, _input: ()| {
            let id = conn.id();
            Box::pin(async move { Ok(id) })
        })
        .with_default_input(());
        let second = FnMethod::new("same", |conn: &mut Connection, id: ConnectionId| {
            let same = conn.id() == id;
            Box::pin(async move { Ok(same) })
        });

        let chain = first.then_method(second);
        assert_eq!(chain.token(), "same(id)");
        assert!(chain.evaluate(None, &mut connection).await.unwrap());
        assert_eq!(connection.id(), expected);
        connection.close().await.unwrap();
    }

    #[tokio::test]
    async fn missing_input_without_default() {
        let mut connection = open().await;
        let err = length().evaluate(None, &mut connection).await.unwrap_err();
        assert!(matches!(err, CommunicationError::MissingInput(token) if token == "length"));
        connection.close().await.unwrap();
    }

    #[tokio::test]
    async fn closed_connection_is_rejected() {
        let mut connection = open().await;
        connection.close().await.unwrap();
        let err = length().evaluate(Some("a".into()), &mut connection).await.unwrap_err();
        assert!(matches!(err, CommunicationError::Closed));
    }
}
