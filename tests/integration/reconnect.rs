// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Whole-client reconnect tests over the scripted loopback transport.
//!
//! Validates, through the public [`ChatClient`] surface:
//! - connection loss enters backoff and redials automatically
//! - live frames keep flowing into open conversations after reconnect
//! - exhausting the attempt cap is terminal until an explicit reconnect
//! - an explicit `connect()` after terminal disconnect starts a fresh
//!   attempt cycle

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use wirechat::api::memory::InMemoryApi;
use wirechat::auth::SessionTokens;
use wirechat::backoff::BackoffPolicy;
use wirechat::client::{ChatClient, ClientConfig};
use wirechat::conn::ConnectionState;
use wirechat::transport::loopback::{LoopbackDialer, LoopbackHandle};
use wirechat_proto::message::{Message, MessageId, UserId};

type TestClient = ChatClient<LoopbackDialer, InMemoryApi, SessionTokens>;

fn uid(n: u128) -> UserId {
    UserId::from_uuid(Uuid::from_u128(n))
}

fn msg(id: u128, content: &str, secs: i64) -> Message {
    Message {
        id: MessageId::from_uuid(Uuid::from_u128(id)),
        from_id: uid(2),
        to_id: uid(1),
        content: content.into(),
        created_at: DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap(),
    }
}

fn fast_config() -> ClientConfig {
    ClientConfig {
        backoff: BackoffPolicy {
            base: Duration::from_millis(50),
            multiplier: 2,
            max_attempts: 5,
        },
        ..ClientConfig::default()
    }
}

fn build_client(dialer: LoopbackDialer) -> TestClient {
    let (client, _search_rx) = ChatClient::new(
        Arc::new(dialer),
        Arc::new(InMemoryApi::new(uid(1))),
        Arc::new(SessionTokens::new("tok")),
        uid(1),
        fast_config(),
    );
    client
}

async fn accepted(accepted_rx: &mut mpsc::UnboundedReceiver<LoopbackHandle>) -> LoopbackHandle {
    tokio::time::timeout(Duration::from_secs(5), accepted_rx.recv())
        .await
        .expect("dial within deadline")
        .expect("dialer alive")
}

async fn wait_for_state(
    client: &TestClient,
    what: &str,
    predicate: impl Fn(&ConnectionState) -> bool,
) {
    let mut state_rx = client.subscribe_connection();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if predicate(&state_rx.borrow_and_update()) {
                return;
            }
            state_rx.changed().await.expect("state channel open");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

#[tokio::test]
async fn connection_loss_backs_off_and_redials() {
    let (dialer, mut accepted_rx) = LoopbackDialer::new();
    let client = build_client(dialer.clone());

    client.connect().unwrap();
    let first = accepted(&mut accepted_rx).await;
    wait_for_state(&client, "initial connect", |s| *s == ConnectionState::Connected).await;

    let mut state_rx = client.subscribe_connection();
    first.close(Some(1006));
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if matches!(
                *state_rx.borrow_and_update(),
                ConnectionState::Backoff { attempt: 1, .. }
            ) {
                return;
            }
            state_rx.changed().await.expect("state channel open");
        }
    })
    .await
    .expect("backoff after loss");

    let _second = accepted(&mut accepted_rx).await;
    wait_for_state(&client, "reconnect", |s| *s == ConnectionState::Connected).await;
    assert_eq!(dialer.dial_count(), 2);
    client.shutdown();
}

#[tokio::test]
async fn frames_flow_again_after_reconnect() {
    let (dialer, mut accepted_rx) = LoopbackDialer::new();
    let client = build_client(dialer);

    client.connect().unwrap();
    let first = accepted(&mut accepted_rx).await;
    client.open_conversation(uid(2)).await.unwrap();
    first.push(msg(1, "before loss", 10));
    drop(first);

    let second = accepted(&mut accepted_rx).await;
    wait_for_state(&client, "reconnect", |s| *s == ConnectionState::Connected).await;
    second.push(msg(2, "after reconnect", 20));

    tokio::time::timeout(Duration::from_secs(5), async {
        while client.conversation(uid(2)).len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("both frames reconciled");

    let contents: Vec<_> = client
        .conversation(uid(2))
        .into_iter()
        .map(|e| e.message.content)
        .collect();
    assert_eq!(contents, vec!["before loss", "after reconnect"]);
    client.shutdown();
}

#[tokio::test]
async fn exhausted_attempts_are_terminal_until_explicit_reconnect() {
    let (dialer, mut accepted_rx) = LoopbackDialer::new();
    let client = build_client(dialer.clone());

    client.connect().unwrap();
    let first = accepted(&mut accepted_rx).await;
    wait_for_state(&client, "initial connect", |s| *s == ConnectionState::Connected).await;

    // Every redial after the loss is refused.
    dialer.refuse_next(5);
    first.close(None);
    wait_for_state(&client, "terminal disconnect", |s| {
        *s == ConnectionState::Disconnected
    })
    .await;

    // One successful dial plus five refused redials, then nothing more.
    assert_eq!(dialer.dial_count(), 6);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(dialer.dial_count(), 6);

    // An explicit reconnect starts a fresh cycle.
    client.connect().unwrap();
    let _second = accepted(&mut accepted_rx).await;
    wait_for_state(&client, "manual reconnect", |s| *s == ConnectionState::Connected).await;
    assert_eq!(dialer.dial_count(), 7);
    client.shutdown();
}
