// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for the WebSocket transport.
//!
//! Runs a real `tokio-tungstenite` server on a loopback listener and
//! validates:
//! - the dialer authenticates with a `Bearer` Authorization header
//! - JSON frames are decoded and delivered in order
//! - malformed frames are skipped without dropping the connection
//! - a server-initiated close surfaces the close code
//! - an abrupt socket drop surfaces as a failure, not a hang

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::SinkExt;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use uuid::Uuid;

use wirechat::transport::ws::WsDialer;
use wirechat::transport::{ConnEvent, Connection, Dialer, TransportError};
use wirechat_proto::message::{Message, MessageId, UserId};

fn sample_message(n: u128) -> Message {
    Message {
        id: MessageId::from_uuid(Uuid::from_u128(n)),
        from_id: UserId::from_uuid(Uuid::from_u128(100)),
        to_id: UserId::from_uuid(Uuid::from_u128(200)),
        content: format!("frame {n}"),
        created_at: DateTime::<Utc>::from_timestamp(1_700_000_000 + n as i64, 0).unwrap(),
    }
}

/// Binds a loopback listener and returns it plus the `ws://` URL to dial.
async fn ws_listener() -> (TcpListener, url::Url) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let url = url::Url::parse(&format!("ws://127.0.0.1:{port}/chat/ws")).unwrap();
    (listener, url)
}

/// Accepts one WebSocket connection, recording the Authorization header.
async fn accept_one(
    listener: &TcpListener,
    auth_seen: Arc<Mutex<Option<String>>>,
) -> tokio_tungstenite::WebSocketStream<tokio::net::TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_hdr_async(stream, move |req: &Request, resp: Response| {
        *auth_seen.lock() = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        Ok(resp)
    })
    .await
    .unwrap()
}

async fn next_event_within(conn: &mut impl Connection, what: &str) -> ConnEvent {
    tokio::time::timeout(Duration::from_secs(5), conn.next_event())
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

#[tokio::test]
async fn dial_authenticates_and_delivers_frames_in_order() {
    let (listener, url) = ws_listener().await;
    let auth_seen = Arc::new(Mutex::new(None));

    let server = tokio::spawn({
        let auth_seen = Arc::clone(&auth_seen);
        async move {
            let mut ws = accept_one(&listener, auth_seen).await;
            for n in 1..=2u128 {
                let json = serde_json::to_string(&sample_message(n)).unwrap();
                ws.send(WsMessage::Text(json.into())).await.unwrap();
            }
            ws
        }
    });

    let dialer = WsDialer::new(url);
    let mut conn = dialer.dial("sekrit").await.unwrap();

    for n in 1..=2u128 {
        match next_event_within(&mut conn, "frame").await {
            ConnEvent::Frame(msg) => assert_eq!(msg, sample_message(n)),
            other => panic!("expected frame, got {other:?}"),
        }
    }
    assert_eq!(auth_seen.lock().as_deref(), Some("Bearer sekrit"));
    drop(server.await.unwrap());
}

#[tokio::test]
async fn malformed_frames_are_skipped_without_disconnecting() {
    let (listener, url) = ws_listener().await;

    let server = tokio::spawn(async move {
        let mut ws = accept_one(&listener, Arc::new(Mutex::new(None))).await;
        ws.send(WsMessage::Text("this is not json".into()))
            .await
            .unwrap();
        ws.send(WsMessage::Binary(vec![0xff, 0xfe].into()))
            .await
            .unwrap();
        let json = serde_json::to_string(&sample_message(7)).unwrap();
        ws.send(WsMessage::Text(json.into())).await.unwrap();
        ws
    });

    let mut conn = WsDialer::new(url).dial("tok").await.unwrap();
    match next_event_within(&mut conn, "the one valid frame").await {
        ConnEvent::Frame(msg) => assert_eq!(msg.content, "frame 7"),
        other => panic!("expected frame, got {other:?}"),
    }
    drop(server.await.unwrap());
}

#[tokio::test]
async fn server_close_surfaces_the_close_code() {
    let (listener, url) = ws_listener().await;

    let server = tokio::spawn(async move {
        let mut ws = accept_one(&listener, Arc::new(Mutex::new(None))).await;
        ws.close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .unwrap();
    });

    let mut conn = WsDialer::new(url).dial("tok").await.unwrap();
    match next_event_within(&mut conn, "close").await {
        ConnEvent::Closed(code) => assert_eq!(code, Some(1000)),
        other => panic!("expected close, got {other:?}"),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn abrupt_socket_drop_is_detected() {
    let (listener, url) = ws_listener().await;

    let server = tokio::spawn(async move {
        let ws = accept_one(&listener, Arc::new(Mutex::new(None))).await;
        // Drop the stream without a close handshake.
        drop(ws);
    });

    let mut conn = WsDialer::new(url).dial("tok").await.unwrap();
    match next_event_within(&mut conn, "loss detection").await {
        ConnEvent::Failed(_) | ConnEvent::Closed(None) => {}
        other => panic!("expected failure or eof, got {other:?}"),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn dial_to_dead_port_fails() {
    // Bind then immediately drop to get a port with no listener.
    let (listener, url) = ws_listener().await;
    drop(listener);

    let err = WsDialer::new(url)
        .with_connect_timeout(Duration::from_secs(2))
        .dial("tok")
        .await
        .expect_err("dial must fail");
    assert!(matches!(
        err,
        TransportError::Io(_) | TransportError::Rejected(_) | TransportError::Timeout
    ));
}
