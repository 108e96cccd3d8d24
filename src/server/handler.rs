//! Pluggable request handlers.

use async_trait::async_trait;
use tokio::io::{BufReader, BufWriter, ReadHalf, WriteHalf};

use crate::endpoint::BoxedStream;
use crate::server::limits::{LimitedReader, LimitedWriter};

/// Request side of an accepted socket: buffered, bounded by
/// `max_request_size`.
pub type RequestInput = BufReader<LimitedReader<ReadHalf<BoxedStream>>>;

/// Response side of an accepted socket: buffered, bounded by
/// `max_response_size`. The server flushes it after the handler returns.
pub type RequestOutput = BufWriter<LimitedWriter<WriteHalf<BoxedStream>>>;

/// Failure of a handler; logged by the server, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Handles one accepted connection.
///
/// One handler instance serves every connection of a server, concurrently.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Serve the request and return a one-line description of it.
    async fn handle_request(
        &self,
        input: &mut RequestInput,
        output: &mut RequestOutput,
    ) -> Result<String, HandlerError>;

    /// Called after every request, whatever its outcome.
    fn release(&self) {}
}
