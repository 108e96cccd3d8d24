//! Server lifecycle and admission control tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;

use commlink::http::{EchoService, HttpRequestHandler, HttpResponse};
use commlink::net::SelfSignedCertificates;
use commlink::server::{HandlerError, RequestInput, RequestOutput};
use commlink::{RequestHandler, Server};

mod common;

/// Echoes one line once a permit is available.
struct GatedEcho {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl RequestHandler for GatedEcho {
    async fn handle_request(
        &self,
        input: &mut RequestInput,
        output: &mut RequestOutput,
    ) -> Result<String, HandlerError> {
        let mut line = String::new();
        input.read_line(&mut line).await?;
        let _permit = self.gate.acquire().await?;
        output.write_all(line.as_bytes()).await?;
        Ok(format!("echo {}", line.trim_end()))
    }
}

/// Replies "ok" and counts how often it is released.
struct Releasing {
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl RequestHandler for Releasing {
    async fn handle_request(
        &self,
        _input: &mut RequestInput,
        output: &mut RequestOutput,
    ) -> Result<String, HandlerError> {
        output.write_all(b"ok").await?;
        Ok("ok".to_string())
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn send_line(addr: std::net::SocketAddr, line: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(format!("{line}\n").as_bytes()).await.unwrap();
    stream
}

async fn read_all(stream: &mut TcpStream) -> String {
    let mut reply = String::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut reply)).await;
    reply
}

#[tokio::test]
async fn excess_connections_are_rejected() {
    let gate = Arc::new(Semaphore::new(0));
    let mut config = common::local_config();
    config.max_connections = 2;
    let (server, addr, task) = common::start_server(config, GatedEcho { gate: gate.clone() }).await;

    let mut first = send_line(addr, "one").await;
    let mut second = send_line(addr, "two").await;
    wait_for(|| server.active_requests() == 2).await;

    // Accepted, then closed without a response.
    let mut third = send_line(addr, "three").await;
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(5), third.read(&mut buf))
        .await
        .expect("rejected socket was not closed");
    assert!(matches!(read, Ok(0) | Err(_)));

    gate.add_permits(2);
    assert_eq!(read_all(&mut first).await, "one\n");
    assert_eq!(read_all(&mut second).await, "two\n");

    server.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn capacity_frees_up_after_requests_finish() {
    let gate = Arc::new(Semaphore::new(10));
    let mut config = common::local_config();
    config.max_connections = 1;
    let (server, addr, task) = common::start_server(config, GatedEcho { gate }).await;

    for word in ["a", "b", "c"] {
        let mut stream = send_line(addr, word).await;
        assert_eq!(read_all(&mut stream).await, format!("{word}\n"));
        wait_for(|| server.active_requests() == 0).await;
        // Let the finished task be reaped before the next accept.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    server.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn graceful_stop_waits_for_in_flight_requests() {
    let gate = Arc::new(Semaphore::new(0));
    let (server, addr, task) =
        common::start_server(common::local_config(), GatedEcho { gate: gate.clone() }).await;

    let mut client = send_line(addr, "pending").await;
    wait_for(|| server.active_requests() == 1).await;

    server.stop();
    assert!(!server.is_running());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!task.is_finished(), "run returned before the request finished");

    // No new connections once stopping.
    assert!(TcpStream::connect(addr).await.is_err());

    gate.add_permits(1);
    assert_eq!(read_all(&mut client).await, "pending\n");
    task.await.unwrap().unwrap();
    assert_eq!(server.last_request().unwrap().description, "echo pending");
}

#[tokio::test]
async fn stop_now_aborts_in_flight_requests() {
    let gate = Arc::new(Semaphore::new(0));
    let (server, addr, task) =
        common::start_server(common::local_config(), GatedEcho { gate }).await;

    let mut client = send_line(addr, "stuck").await;
    wait_for(|| server.active_requests() == 1).await;

    server.stop_now();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("run did not return after stop_now")
        .unwrap()
        .unwrap();

    assert_eq!(read_all(&mut client).await, "");
    assert_eq!(server.active_requests(), 0);
    assert!(server.last_request().is_none());
}

#[tokio::test]
async fn repeated_stop_is_harmless() {
    let gate = Arc::new(Semaphore::new(1));
    let (server, _addr, task) =
        common::start_server(common::local_config(), GatedEcho { gate }).await;

    server.stop();
    server.stop();
    task.await.unwrap().unwrap();
    server.stop();
    assert!(!server.is_running());
    assert!(server.local_addr().is_none());
}

#[tokio::test]
async fn server_can_run_again_after_stop() {
    let gate = Arc::new(Semaphore::new(10));
    let (server, _addr, task) =
        common::start_server(common::local_config(), GatedEcho { gate }).await;
    server.stop();
    task.await.unwrap().unwrap();

    let again = server.clone();
    let task = tokio::spawn(async move { again.run().await });
    let addr = server.ready().await.unwrap();

    let mut client = send_line(addr, "back").await;
    assert_eq!(read_all(&mut client).await, "back\n");
    server.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn http_echo_records_last_request() {
    let config = common::local_config();
    let handler = HttpRequestHandler::from_config(EchoService, &config);
    let (server, addr, task) = common::start_server(config, handler).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"POST /hello HTTP/1.1\r\nContent-Length: 5\r\n\r\nworld")
        .await
        .unwrap();
    let response = HttpResponse::read_from(&mut BufReader::new(stream), 1024).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.body_text().unwrap(), "POST /hello\nworld");

    wait_for(|| server.last_request().is_some()).await;
    let record = server.last_request().unwrap();
    assert_eq!(record.description, "POST /hello HTTP/1.1 -> 200");

    server.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn malformed_request_gets_bad_request() {
    let config = common::local_config();
    let (server, addr, task) =
        common::start_server(config.clone(), HttpRequestHandler::from_config(EchoService, &config)).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"GET /only-two-parts\r\n\r\n").await.unwrap();
    let response = HttpResponse::read_from(&mut BufReader::new(stream), 1024).await.unwrap();
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(response.headers().get("connection"), Some("close"));

    server.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn oversized_request_gets_payload_too_large() {
    let mut config = common::local_config();
    config.max_request_size = 64;
    let (server, addr, task) =
        common::start_server(config.clone(), HttpRequestHandler::from_config(EchoService, &config)).await;

    let mut request = b"POST /big HTTP/1.1\r\nContent-Length: 200\r\n\r\n".to_vec();
    request.extend(std::iter::repeat(b'x').take(200));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&request).await.unwrap();
    let response = HttpResponse::read_from(&mut BufReader::new(stream), 1024).await.unwrap();
    assert_eq!(response.status().as_u16(), 413);

    server.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn empty_connection_is_ignored() {
    let config = common::local_config();
    let (server, addr, task) =
        common::start_server(config.clone(), HttpRequestHandler::from_config(EchoService, &config)).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.shutdown().await.unwrap();
    assert_eq!(read_all(&mut stream).await, "");

    wait_for(|| server.last_request().is_some()).await;
    assert_eq!(server.last_request().unwrap().description, "empty request");

    server.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn handler_is_released_after_each_request() {
    let released = Arc::new(AtomicUsize::new(0));
    let handler = Releasing { released: released.clone() };
    let (server, addr, task) = common::start_server(common::local_config(), handler).await;

    for _ in 0..2 {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        assert_eq!(read_all(&mut stream).await, "ok");
    }
    wait_for(|| released.load(Ordering::SeqCst) == 2).await;

    server.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn failed_handshake_still_releases_the_handler() {
    let released = Arc::new(AtomicUsize::new(0));
    let mut config = common::local_config();
    config.encryption = true;
    let server = Server::new(config, Releasing { released: released.clone() })
        .with_certificate_provider(SelfSignedCertificates::localhost().unwrap());
    let running = server.clone();
    let task = tokio::spawn(async move { running.run().await });
    let addr = server.ready().await.unwrap();

    // Plain text where a TLS ClientHello is expected.
    let _stream = send_line(addr, "GET / HTTP/1.1").await;
    wait_for(|| released.load(Ordering::SeqCst) == 1).await;
    assert!(server.last_request().is_none());

    server.stop();
    task.await.unwrap().unwrap();
}
