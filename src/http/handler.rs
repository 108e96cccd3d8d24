//! Bridges the socket server to HTTP services.

use std::sync::Arc;

use async_trait::async_trait;
use http::{Method, StatusCode};
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::http::{HttpError, DEFAULT_MAX_LINE};
use crate::server::{HandlerError, RequestHandler, RequestInput, RequestOutput};

/// Produces a response for one parsed request.
///
/// `body` is positioned at the first body byte; read it with
/// [`HttpRequest::read_body`] when the request carries one.
#[async_trait]
pub trait HttpService: Send + Sync + 'static {
    async fn serve(
        &self,
        request: &HttpRequest,
        body: &mut RequestInput,
    ) -> Result<HttpResponse, HttpError>;
}

#[async_trait]
impl<S: HttpService + ?Sized> HttpService for Arc<S> {
    async fn serve(
        &self,
        request: &HttpRequest,
        body: &mut RequestInput,
    ) -> Result<HttpResponse, HttpError> {
        (**self).serve(request, body).await
    }
}

/// [`RequestHandler`] reading one HTTP request per connection.
#[derive(Debug)]
pub struct HttpRequestHandler<S> {
    service: S,
    max_line: usize,
}

impl<S: HttpService> HttpRequestHandler<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            max_line: DEFAULT_MAX_LINE,
        }
    }

    /// Handler using the codec limits of `config`.
    pub fn from_config(service: S, config: &ServerConfig) -> Self {
        Self::new(service).with_max_header_line_size(config.http.max_header_line_size)
    }

    pub fn with_max_header_line_size(mut self, max_line: usize) -> Self {
        self.max_line = max_line;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }
}

#[async_trait]
impl<S: HttpService> RequestHandler for HttpRequestHandler<S> {
    async fn handle_request(
        &self,
        input: &mut RequestInput,
        output: &mut RequestOutput,
    ) -> Result<String, HandlerError> {
        let request = match HttpRequest::read_from(input, self.max_line).await {
            Ok(request) => request,
            Err(HttpError::EmptyRequest) => {
                debug!("connection closed before a request was sent");
                return Ok("empty request".to_string());
            }
            Err(e) => {
                let status = e.status();
                warn!(status = status.as_u16(), error = %e, "rejecting malformed request");
                // The peer may already be gone; the answer is best effort.
                if let Err(write_error) = HttpResponse::from_error(&e).write_to(output).await {
                    debug!(error = %write_error, "could not send error response");
                }
                return Ok(format!("malformed request -> {}", status.as_u16()));
            }
        };

        let response = match self.service.serve(&request, input).await {
            Ok(response) => response,
            Err(e) => {
                warn!(request = %request.request_line(), error = %e, "service failed");
                HttpResponse::from_error(&e)
            }
        };
        let status = response.status();
        response.write_to(output).await?;

        Ok(format!("{} -> {}", request.request_line(), status.as_u16()))
    }
}

/// Answers every request with its method, path and body.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoService;

#[async_trait]
impl HttpService for EchoService {
    async fn serve(
        &self,
        request: &HttpRequest,
        body: &mut RequestInput,
    ) -> Result<HttpResponse, HttpError> {
        let text = if request.headers().contains("Content-Length") {
            request.read_text(body).await?
        } else {
            String::new()
        };
        if *request.method() == Method::HEAD {
            return Ok(HttpResponse::new(StatusCode::OK));
        }
        Ok(HttpResponse::text(
            StatusCode::OK,
            format!("{} {}\n{}", request.method(), request.path(), text),
        ))
    }
}
