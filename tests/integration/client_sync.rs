// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! End-to-end sync tests through the assembled [`ChatClient`].
//!
//! Uses the in-process loopback transport and the in-memory REST fake to
//! validate whole-client behavior:
//! - fetched history and live frames interleave into one ordered timeline
//! - a frame that is also in the fetched batch appears exactly once
//! - the optimistic placeholder is replaced exactly once even when the
//!   echo arrives over both REST and the live channel
//! - frames for unopened conversations are buffered until open
//! - search queries flow through the debouncer to the REST fake

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use wirechat::api::memory::InMemoryApi;
use wirechat::auth::SessionTokens;
use wirechat::backoff::BackoffPolicy;
use wirechat::client::{ChatClient, ClientConfig};
use wirechat::reconcile::{DeliveryState, TimelineEntry};
use wirechat::search::SearchOutcome;
use wirechat::transport::loopback::{LoopbackDialer, LoopbackHandle};
use wirechat_proto::message::{Message, MessageId, UserId};

type TestClient = ChatClient<LoopbackDialer, InMemoryApi, SessionTokens>;

fn uid(n: u128) -> UserId {
    UserId::from_uuid(Uuid::from_u128(n))
}

fn msg(id: u128, from: u128, to: u128, content: &str, secs: i64) -> Message {
    Message {
        id: MessageId::from_uuid(Uuid::from_u128(id)),
        from_id: uid(from),
        to_id: uid(to),
        content: content.into(),
        created_at: DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap(),
    }
}

fn test_config() -> ClientConfig {
    ClientConfig {
        backoff: BackoffPolicy {
            base: Duration::from_millis(50),
            multiplier: 2,
            max_attempts: 5,
        },
        search_debounce: Duration::from_millis(30),
        ..ClientConfig::default()
    }
}

/// Spins up a connected client plus the server-side loopback handle.
async fn connected_client(
    api: InMemoryApi,
) -> (TestClient, LoopbackHandle, mpsc::Receiver<SearchOutcome>) {
    let (dialer, mut accepted_rx) = LoopbackDialer::new();
    let credentials = Arc::new(SessionTokens::new("tok"));
    let (client, search_rx) = ChatClient::new(
        Arc::new(dialer),
        Arc::new(api),
        credentials,
        uid(1),
        test_config(),
    );
    client.connect().unwrap();
    let server = tokio::time::timeout(Duration::from_secs(5), accepted_rx.recv())
        .await
        .expect("dial within deadline")
        .expect("dialer alive");
    (client, server, search_rx)
}

async fn wait_for_entries(client: &TestClient, peer: UserId, count: usize) -> Vec<TimelineEntry> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let entries = client.conversation(peer);
        if entries.len() >= count {
            return entries;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {count} entries, have {}",
            entries.len()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn contents(entries: &[TimelineEntry]) -> Vec<String> {
    entries.iter().map(|e| e.message.content.clone()).collect()
}

#[tokio::test]
async fn history_and_live_frames_interleave_in_order() {
    let api = InMemoryApi::new(uid(1));
    api.preload_history(uid(2), vec![msg(1, 1, 2, "t1", 10), msg(3, 2, 1, "t3", 30)]);
    api.set_fetch_delay(Duration::from_millis(80));
    let (client, server, _search_rx) = connected_client(api).await;

    let opened = {
        let peer = uid(2);
        let client = &client;
        tokio::join!(
            async move { client.open_conversation(peer).await },
            async {
                // Push a frame with an in-between timestamp while the
                // history fetch is still in flight.
                tokio::time::sleep(Duration::from_millis(20)).await;
                server.push(msg(2, 2, 1, "t2", 20));
            }
        )
        .0
    };
    opened.unwrap();

    let entries = wait_for_entries(&client, uid(2), 3).await;
    assert_eq!(contents(&entries), vec!["t1", "t2", "t3"]);
    client.shutdown();
}

#[tokio::test]
async fn frame_duplicated_in_history_appears_once() {
    let api = InMemoryApi::new(uid(1));
    api.preload_history(uid(2), vec![msg(1, 2, 1, "only once", 10)]);
    let (client, server, _search_rx) = connected_client(api).await;

    client.open_conversation(uid(2)).await.unwrap();
    // The same message arrives again over the live channel.
    server.push(msg(1, 2, 1, "only once", 10));
    server.push(msg(2, 2, 1, "second", 20));

    let entries = wait_for_entries(&client, uid(2), 2).await;
    assert_eq!(contents(&entries), vec!["only once", "second"]);
    client.shutdown();
}

#[tokio::test]
async fn optimistic_echo_over_both_channels_yields_one_entry() {
    let api = InMemoryApi::new(uid(1));
    let (client, server, _search_rx) = connected_client(api.clone()).await;

    client.open_conversation(uid(2)).await.unwrap();
    client.send_message(uid(2), "hello").await.unwrap();

    // The server also echoes the accepted message on the live channel.
    let echo = api.sent().pop().unwrap();
    server.push(echo.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let entries = client.conversation(uid(2));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].state, DeliveryState::Confirmed);
    assert_eq!(entries[0].message.id, echo.id);
    client.shutdown();
}

#[tokio::test]
async fn frames_before_open_are_buffered_and_drained_on_open() {
    let api = InMemoryApi::new(uid(1));
    let (client, server, _search_rx) = connected_client(api).await;

    server.push(msg(1, 3, 1, "while closed 1", 10));
    server.push(msg(2, 3, 1, "while closed 2", 20));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(client.conversation(uid(3)).is_empty());

    client.open_conversation(uid(3)).await.unwrap();
    let entries = wait_for_entries(&client, uid(3), 2).await;
    assert_eq!(contents(&entries), vec!["while closed 1", "while closed 2"]);
    client.shutdown();
}

#[tokio::test]
async fn search_flows_through_the_debouncer() {
    let api = InMemoryApi::new(uid(1));
    api.add_users(vec![wirechat_proto::message::UserSummary {
        id: uid(9),
        username: "dora".into(),
        email: "dora@example.com".into(),
    }]);
    let (client, _server, mut search_rx) = connected_client(api.clone()).await;

    client.search("do");
    client.search("dor");
    client.search("dora");

    let outcome = tokio::time::timeout(Duration::from_secs(5), search_rx.recv())
        .await
        .expect("outcome within deadline")
        .expect("channel open");
    match outcome {
        SearchOutcome::Results(users) => assert_eq!(users[0].username, "dora"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(api.searched(), vec!["dora"]);
    client.shutdown();
}
