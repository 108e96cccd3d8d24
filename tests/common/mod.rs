//! Mock peers shared by the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use commlink::{RequestHandler, Server, ServerConfig};

/// Lines received by a mock peer, across all its connections.
pub type Transcript = Arc<Mutex<Vec<String>>>;

pub fn transcript_lines(transcript: &Transcript) -> Vec<String> {
    transcript.lock().unwrap().clone()
}

/// Start a line-reply server (FTP/SMTP style).
///
/// Every connection is greeted with `greeting`, then each received line is
/// answered with the lines `respond` returns. After a `354` reply the peer
/// collects message data silently until the lone `.` line, which is again
/// passed to `respond`.
pub async fn start_line_reply_server<F>(greeting: &'static str, respond: F) -> (SocketAddr, Transcript)
where
    F: Fn(&str) -> Vec<String> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let transcript: Transcript = Arc::default();
    let respond = Arc::new(respond);

    let log = Arc::clone(&transcript);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let respond = Arc::clone(&respond);
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let (read, mut write) = socket.into_split();
                let mut lines = BufReader::new(read).lines();
                let _ = write.write_all(format!("{greeting}\r\n").as_bytes()).await;

                let mut in_data = false;
                while let Ok(Some(line)) = lines.next_line().await {
                    log.lock().unwrap().push(line.clone());
                    if in_data && line != "." {
                        continue;
                    }
                    in_data = false;

                    let reply = respond(&line);
                    for reply_line in &reply {
                        let _ = write.write_all(format!("{reply_line}\r\n").as_bytes()).await;
                    }
                    if reply.last().is_some_and(|l| l.starts_with("354")) {
                        in_data = true;
                    }
                    if line == "QUIT" {
                        break;
                    }
                }
            });
        }
    });

    (addr, transcript)
}

/// Start a server answering every line with its uppercase form.
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (read, mut write) = socket.into_split();
                let mut lines = BufReader::new(read).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let reply = format!("{}\n", line.to_uppercase());
                    if write.write_all(reply.as_bytes()).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    addr
}

/// Start an HTTP peer answering every request with `status` and `body`.
/// Each received request (head and body) is recorded as text.
pub async fn start_http_peer(status: u16, body: &'static str) -> (SocketAddr, Transcript) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let transcript: Transcript = Arc::default();

    let log = Arc::clone(&transcript);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let mut reader = BufReader::new(socket);
                let mut request = String::new();
                let mut length = 0usize;
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                        return;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            length = value.trim().parse().unwrap_or(0);
                        }
                    }
                    let end = line == "\r\n";
                    request.push_str(&line);
                    if end {
                        break;
                    }
                }
                let mut payload = vec![0; length];
                let _ = reader.read_exact(&mut payload).await;
                request.push_str(&String::from_utf8_lossy(&payload));
                log.lock().unwrap().push(request);

                let response = format!(
                    "HTTP/1.1 {status} Mock\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let mut socket = reader.into_inner();
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, transcript)
}

/// Server config on an ephemeral loopback port.
pub fn local_config() -> ServerConfig {
    ServerConfig {
        bind_address: "127.0.0.1".to_string(),
        ..ServerConfig::with_port(0)
    }
}

/// Run `handler` on a server and wait until it accepts connections.
pub async fn start_server(
    config: ServerConfig,
    handler: impl RequestHandler,
) -> (Server, SocketAddr, JoinHandle<Result<(), commlink::ServerError>>) {
    let server = Server::new(config, handler);
    let running = server.clone();
    let task = tokio::spawn(async move { running.run().await });
    let addr = server.ready().await.expect("server did not bind");
    (server, addr, task)
}
