//! Concurrency and capacity tests for the relay.

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use common::WsScript;

mod common;

#[tokio::test]
async fn test_concurrent_http_exchanges_stay_isolated() {
    let backend = common::start_echo_backend().await;
    let (relay, _shutdown) = common::start_relay(&format!("http://{backend}"), |_| {}).await;

    let concurrency = 20;
    let requests_per_task = 10;
    let client = common::client();
    let start = Instant::now();

    let mut tasks = Vec::new();
    for task in 0..concurrency {
        let client = client.clone();
        let url = format!("http://{relay}/task/{task}");
        tasks.push(tokio::spawn(async move {
            for i in 0..requests_per_task {
                let body = format!(r#"{{"jsonrpc":"2.0","id":{i},"task":{task}}}"#);
                let res = client.post(&url).body(body.clone()).send().await.unwrap();
                assert_eq!(res.status(), StatusCode::OK);
                assert_eq!(res.text().await.unwrap(), body);
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    println!(
        "{} requests in {:?}",
        concurrency * requests_per_task,
        start.elapsed()
    );
}

#[tokio::test]
async fn test_concurrent_websocket_sessions_are_paired_one_to_one() {
    let backend = common::start_ws_backend(WsScript::Echo, Duration::ZERO).await;
    let (relay, _shutdown) = common::start_relay(&backend.url(), |_| {}).await;

    let mut tasks = Vec::new();
    for session in 0..25 {
        tasks.push(tokio::spawn(async move {
            let (mut ws, _) = connect_async(format!("ws://{relay}/")).await.unwrap();
            for i in 0..20 {
                let text = format!("s{session}-m{i}");
                ws.send(Message::Text(text.clone().into())).await.unwrap();
                let reply = tokio::time::timeout(Duration::from_secs(5), ws.next())
                    .await
                    .unwrap()
                    .unwrap()
                    .unwrap();
                assert_eq!(reply, Message::Text(text.into()));
            }
            ws.close(None).await.unwrap();
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn test_session_cap_rejects_with_503_then_recovers() {
    let backend = common::start_ws_backend(WsScript::Echo, Duration::ZERO).await;
    let (relay, _shutdown) = common::start_relay(&backend.url(), |config| {
        config.listener.max_sessions = Some(1);
    })
    .await;

    let (mut ws, _) = connect_async(format!("ws://{relay}/")).await.unwrap();
    ws.send(Message::Text("ping".into())).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(reply, Message::Text("pong".into()));

    let client = common::client();
    let res = client.get(format!("http://{relay}/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("session limit"));

    ws.close(None).await.unwrap();
    while let Some(Ok(_)) = ws.next().await {}

    // The slot frees once the session has fully torn down.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let res = client.get(format!("http://{relay}/")).send().await.unwrap();
        if res.status() != StatusCode::SERVICE_UNAVAILABLE {
            break;
        }
        assert!(Instant::now() < deadline, "slot never released");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
