//! End-to-end session flow against an in-process gateway.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use botwire_client::{ConnectOptions, Session, SessionEvent};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Serve one gateway connection: greet with lifecycle + one message,
/// then echo-reply every correlated action frame.
async fn serve_gateway(listener: TcpListener) {
    let (stream, _) = listener.accept().await.unwrap();
    let ws = accept_async(stream).await.unwrap();
    let (mut write, mut read) = ws.split();

    let lifecycle = json!({
        "post_type": "meta_event",
        "meta_event_type": "lifecycle",
        "sub_type": "connect",
        "self_id": 10_000,
    });
    write
        .send(Message::Text(lifecycle.to_string().into()))
        .await
        .unwrap();

    let inbound = json!({
        "post_type": "message",
        "message_type": "private",
        "message_id": 1,
        "user_id": 42,
        "self_id": 10_000,
        "sender": {"user_id": 42, "nickname": "alice"},
        "message": [{"type": "text", "data": {"text": "ping"}}],
        "time": 1_700_000_000,
    });
    write
        .send(Message::Text(inbound.to_string().into()))
        .await
        .unwrap();

    while let Some(Ok(Message::Text(text))) = read.next().await {
        let frame: Value = serde_json::from_str(&text).unwrap();
        if let Some(echo) = frame.get("echo").and_then(Value::as_str) {
            let reply = json!({
                "status": "ok",
                "retcode": 0,
                "data": {"message_id": 99},
                "echo": echo,
            });
            if write
                .send(Message::Text(reply.to_string().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    }
}

#[tokio::test]
async fn forward_session_round_trip() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _gateway = tokio::spawn(serve_gateway(listener));

    let mut options = ConnectOptions::new(format!("ws://{addr}"));
    options.request_timeout_ms = 2000;
    options.chunk_delay_ms = 1;
    let session = Session::new(options).unwrap();
    let mut events = session.connect().await.unwrap();

    match events.recv().await {
        Some(SessionEvent::Connected) => {}
        other => panic!("expected connect, got {other:?}"),
    }

    match events.recv().await {
        Some(SessionEvent::Message(msg)) => {
            assert_eq!(msg.text, "ping");
            assert_eq!(msg.sender_name, "alice");
            assert_eq!(msg.user_id, Some(42));
            assert!(!msg.from_self);
        }
        other => panic!("expected message, got {other:?}"),
    }

    // Lifecycle frame arrived before the message, so the account id is
    // known by now.
    assert_eq!(session.self_id(), Some(10_000));

    // Outbound over the socket with echo correlation.
    session.send_text("private:42", "pong", None).await.unwrap();

    // Connectivity probe succeeds within the window.
    assert!(session.probe(Duration::from_secs(2)).await);

    session.disconnect();
}

#[tokio::test]
async fn dropped_connection_triggers_reconnect() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let _gateway = tokio::spawn(async move {
        // First connection is closed immediately; the second stays open.
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        drop(ws);

        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (_write, mut read) = ws.split();
        while read.next().await.is_some() {}
    });

    let options = ConnectOptions::new(format!("ws://{addr}"));
    let session = Session::new(options).unwrap();
    let mut events = session.connect().await.unwrap();

    assert!(matches!(events.recv().await, Some(SessionEvent::Connected)));
    assert!(matches!(
        events.recv().await,
        Some(SessionEvent::Disconnected)
    ));
    // First retry is scheduled one second out.
    assert!(matches!(events.recv().await, Some(SessionEvent::Connected)));

    session.disconnect();
}
