//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header::HOST, Request, Response},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use rpc_relay::config::ProxyConfig;
use rpc_relay::http::HttpServer;
use rpc_relay::lifecycle::Shutdown;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Start the relay on an ephemeral port in front of `target_url`.
pub async fn start_relay<F>(target_url: &str, configure: F) -> (SocketAddr, Shutdown)
where
    F: FnOnce(&mut ProxyConfig),
{
    let mut config = ProxyConfig::default();
    config.upstream.url = target_url.to_string();
    config.listener.bind_host = "127.0.0.1".into();
    config.listener.port = 0;
    config.listener.shutdown_grace_secs = 2;
    configure(&mut config);

    let server = HttpServer::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

/// HTTP client that talks to the relay directly and never follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

/// A port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Assemble a raw HTTP/1.1 response with `Content-Length` and `Connection: close`.
pub fn raw_response(status_line: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut head = format!("HTTP/1.1 {status_line}\r\n");
    for (name, value) in headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    ));

    let mut response = head.into_bytes();
    response.extend_from_slice(body);
    response
}

async fn read_request_head(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

/// Start a programmable raw TCP backend; every connection gets `f()`'s bytes.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Vec<u8>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        read_request_head(&mut socket).await;
                        let response = f().await;
                        let _ = socket.write_all(&response).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a backend that always answers with the same raw response.
pub async fn start_mock_backend(response: Vec<u8>) -> SocketAddr {
    let response = Arc::new(response);
    start_programmable_backend(move || {
        let response = response.clone();
        async move { response.to_vec() }
    })
    .await
}

/// Start an axum backend that echoes the request body and reports the
/// request line and `Host` in `x-echo-*` headers.
pub async fn start_echo_backend() -> SocketAddr {
    async fn echo(request: Request<Body>) -> Response<Body> {
        let (parts, body) = request.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        let host = parts
            .headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        Response::builder()
            .header("x-echo-method", parts.method.as_str())
            .header("x-echo-path", parts.uri.path())
            .header("x-echo-query", parts.uri.query().unwrap_or(""))
            .header("x-echo-host", host)
            .header(
                "x-echo-has-connection-token",
                parts.headers.contains_key("x-hop").to_string(),
            )
            .body(Body::from(bytes))
            .unwrap()
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(echo);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// What the WebSocket backend observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsEvent {
    Text(String),
    Binary(Vec<u8>),
    Closed(Option<(u16, String)>),
    Dropped,
}

/// How the WebSocket backend treats each connection.
#[derive(Debug, Clone, Copy)]
pub enum WsScript {
    /// Answer `ping` with `pong`; echo everything else with its own kind.
    Echo,
    /// Close with this code and reason after the first data message.
    CloseAfterFirst(u16, &'static str),
    /// Drop the TCP connection after the first data message.
    DropAfterFirst,
}

pub struct WsBackend {
    pub addr: SocketAddr,
    pub events: mpsc::UnboundedReceiver<WsEvent>,
}

impl WsBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Next event, failing the test after a few seconds of silence.
    pub async fn next_event(&mut self) -> WsEvent {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("backend event timed out")
            .expect("backend event channel closed")
    }
}

/// Start a tungstenite WebSocket backend that delays each handshake by
/// `accept_delay`.
pub async fn start_ws_backend(script: WsScript, accept_delay: Duration) -> WsBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (events_tx, events) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let events = events_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(accept_delay).await;
                let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
                    return;
                };

                while let Some(message) = ws.next().await {
                    let reply = match message {
                        Ok(Message::Text(text)) => {
                            let text = text.as_str().to_string();
                            let _ = events.send(WsEvent::Text(text.clone()));
                            let echo = if text == "ping" { "pong".to_string() } else { text };
                            Message::Text(echo.into())
                        }
                        Ok(Message::Binary(bytes)) => {
                            let _ = events.send(WsEvent::Binary(bytes.to_vec()));
                            Message::Binary(bytes)
                        }
                        Ok(Message::Close(frame)) => {
                            let _ = events.send(WsEvent::Closed(
                                frame.map(|f| (u16::from(f.code), f.reason.as_str().to_string())),
                            ));
                            break;
                        }
                        Ok(_) => continue,
                        Err(_) => {
                            let _ = events.send(WsEvent::Dropped);
                            break;
                        }
                    };

                    match script {
                        WsScript::Echo => {
                            if ws.send(reply).await.is_err() {
                                break;
                            }
                        }
                        WsScript::CloseAfterFirst(code, reason) => {
                            let frame = tokio_tungstenite::tungstenite::protocol::CloseFrame {
                                code: code.into(),
                                reason: reason.into(),
                            };
                            let _ = ws.close(Some(frame)).await;
                        }
                        WsScript::DropAfterFirst => return,
                    }
                }
            });
        }
    });

    WsBackend { addr, events }
}
