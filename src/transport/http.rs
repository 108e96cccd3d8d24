//! HTTP client transport (`http://`, `https://`) on top of `reqwest`.

use std::path::Path;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use url::Url;

use crate::endpoint::{Connection, Resource, Transport};
use crate::error::{CommunicationError, CommunicationResult};
use crate::method::CommunicationMethod;
use crate::net::tls;

/// A configured HTTP client bound to a base URL.
#[derive(Debug, Clone)]
pub struct HttpSession {
    client: Client,
    base: Url,
    user: Option<String>,
    password: Option<String>,
}

impl HttpSession {
    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Start a request to `path` resolved against the base URL. An empty
    /// path targets the base URL itself.
    pub fn request(&self, method: Method, path: &str) -> CommunicationResult<RequestBuilder> {
        let url = if path.is_empty() {
            self.base.clone()
        } else {
            self.base
                .join(path)
                .map_err(|source| CommunicationError::InvalidAddress {
                    address: path.to_string(),
                    source,
                })?
        };

        let mut request = self.client.request(method, url);
        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.password.as_deref());
        }
        Ok(request)
    }
}

/// Build the session of an HTTP-based connection: timeouts, trust settings
/// and proxy come from the connection parameters.
pub(crate) fn build_session(connection: &Connection, base: Url) -> CommunicationResult<HttpSession> {
    let params = connection.params();
    let mut builder = Client::builder()
        .timeout(params.timeout())
        .connect_timeout(params.timeout());

    if params.trust_self_signed() {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(path) = &params.ca_cert_path {
        for cert in tls::load_certs(Path::new(path))? {
            builder = builder.add_root_certificate(reqwest::Certificate::from_der(cert.as_ref())?);
        }
    }
    if let Some(proxy) = &params.proxy {
        let address = match proxy.port {
            Some(port) => format!("http://{}:{}", proxy.host, port),
            None => format!("http://{}", proxy.host),
        };
        let mut route = reqwest::Proxy::all(address)?;
        if let Some(user) = &proxy.user {
            route = route.basic_auth(user, proxy.password.as_deref().unwrap_or(""));
        }
        builder = builder.proxy(route);
    }

    Ok(HttpSession {
        client: builder.build()?,
        base,
        user: params.user.clone(),
        password: params.password.clone(),
    })
}

/// HTTP transport. `http` endpoints with encryption enabled are upgraded
/// to `https`.
#[derive(Debug, Default)]
pub struct HttpTransport;

#[async_trait]
impl Transport for HttpTransport {
    async fn init_connection(&self, connection: &mut Connection) -> CommunicationResult<()> {
        let mut base = connection.endpoint().address().clone();
        if connection.params().encryption() && base.scheme() == "http" {
            let _ = base.set_scheme("https");
        }
        let session = build_session(connection, base)?;
        connection.set_resource(Resource::Http(session));
        Ok(())
    }

    async fn close_connection(&self, connection: &mut Connection) -> CommunicationResult<()> {
        connection.take_resource();
        Ok(())
    }
}

/// Send a request with the input as body and return the response body.
///
/// Non-success statuses fail with [`CommunicationError::HttpStatus`].
#[derive(Debug, Clone)]
pub struct HttpRequestMethod {
    token: String,
    method: Method,
    path: String,
    headers: Vec<(String, String)>,
    default_input: Option<String>,
    log: bool,
}

impl HttpRequestMethod {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let token = format!("http-{}", method.as_str().to_ascii_lowercase());
        let default_input = matches!(method, Method::GET | Method::DELETE | Method::HEAD)
            .then(String::new);
        Self {
            token,
            method,
            path: path.into(),
            headers: Vec::new(),
            default_input,
            log: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_default_input(mut self, input: impl Into<String>) -> Self {
        self.default_input = Some(input.into());
        self
    }

    pub fn with_logging(mut self, log: bool) -> Self {
        self.log = log;
        self
    }
}

#[async_trait]
impl CommunicationMethod<String, String> for HttpRequestMethod {
    fn token(&self) -> &str {
        &self.token
    }

    fn default_input(&self) -> Option<String> {
        self.default_input.clone()
    }

    fn log_execution(&self) -> bool {
        self.log
    }

    async fn do_on(&self, connection: &mut Connection, input: String) -> CommunicationResult<String> {
        let limit = connection.params().max_response_size();
        let session = connection.http_session()?;

        let mut request = session.request(self.method.clone(), &self.path)?;
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !input.is_empty() {
            request = request.body(input);
        }

        let mut response = request.send().await?;
        let status = response.status();

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(CommunicationError::Protocol(format!(
                    "response exceeds {limit} bytes"
                )));
            }
            body.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&body).into_owned();

        tracing::debug!(
            connection_id = %connection.id(),
            method = %self.method,
            status = status.as_u16(),
            "HTTP response received"
        );

        if !status.is_success() {
            return Err(CommunicationError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot HTTP peer answering every request with `status` and `body`.
    async fn peer(status: &'static str, body: &'static str) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let reply = format!(
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
            }
        });
        addr
    }

    #[tokio::test]
    async fn get_returns_body() {
        let addr = peer("200 OK", "pong").await;
        let endpoint = Endpoint::at(&format!("http://{addr}/")).unwrap();
        let body = endpoint
            .then(HttpRequestMethod::get("ping"))
            .receive()
            .await
            .unwrap();
        assert_eq!(body, "pong");
    }

    #[tokio::test]
    async fn error_status_is_http_status_error() {
        let addr = peer("404 Not Found", "missing").await;
        let endpoint = Endpoint::at(&format!("http://{addr}/")).unwrap();
        let err = endpoint
            .then(HttpRequestMethod::get(""))
            .receive()
            .await
            .unwrap_err();
        assert!(matches!(err, CommunicationError::HttpStatus { status: 404, ref body } if body == "missing"));
    }

    #[test]
    fn tokens_and_default_inputs() {
        assert_eq!(HttpRequestMethod::get("/").token(), "http-get");
        assert_eq!(HttpRequestMethod::get("/").default_input(), Some(String::new()));
        assert_eq!(HttpRequestMethod::post("/").token(), "http-post");
        assert_eq!(HttpRequestMethod::post("/").default_input(), None);
    }
}
