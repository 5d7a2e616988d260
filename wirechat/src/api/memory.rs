//! Scriptable in-memory implementation of [`ChatApi`] for tests.
//!
//! Plays the server's role: assigns authoritative ids and timestamps on
//! send, serves preloaded history, and can be scripted to fail or delay
//! individual operations.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use wirechat_proto::message::{Message, MessageId, UserId, UserSummary};

use super::{ApiError, ChatApi};

struct Inner {
    local_user: UserId,
    history: Mutex<HashMap<UserId, Vec<Message>>>,
    users: Mutex<Vec<UserSummary>>,
    sent: Mutex<Vec<Message>>,
    searched: Mutex<Vec<String>>,
    fail_next_fetch: Mutex<Option<ApiError>>,
    fail_next_send: Mutex<Option<ApiError>>,
    fail_next_search: Mutex<Option<ApiError>>,
    fetch_delay: Mutex<Option<Duration>>,
    fetch_calls: AtomicUsize,
}

/// In-memory fake of the chat server's REST surface.
#[derive(Clone)]
pub struct InMemoryApi {
    inner: Arc<Inner>,
}

impl InMemoryApi {
    /// Creates a fake server that will attribute sends to `local_user`.
    #[must_use]
    pub fn new(local_user: UserId) -> Self {
        Self {
            inner: Arc::new(Inner {
                local_user,
                history: Mutex::new(HashMap::new()),
                users: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
                searched: Mutex::new(Vec::new()),
                fail_next_fetch: Mutex::new(None),
                fail_next_send: Mutex::new(None),
                fail_next_search: Mutex::new(None),
                fetch_delay: Mutex::new(None),
                fetch_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Preloads the history returned for conversations with `peer`.
    pub fn preload_history(&self, peer: UserId, messages: Vec<Message>) {
        self.inner.history.lock().insert(peer, messages);
    }

    /// Registers users visible to the search endpoint.
    pub fn add_users(&self, users: Vec<UserSummary>) {
        self.inner.users.lock().extend(users);
    }

    /// Scripts the next history fetch to fail with `err`.
    pub fn fail_next_fetch(&self, err: ApiError) {
        *self.inner.fail_next_fetch.lock() = Some(err);
    }

    /// Scripts the next send to fail with `err`.
    pub fn fail_next_send(&self, err: ApiError) {
        *self.inner.fail_next_send.lock() = Some(err);
    }

    /// Scripts the next user search to fail with `err`.
    pub fn fail_next_search(&self, err: ApiError) {
        *self.inner.fail_next_search.lock() = Some(err);
    }

    /// Delays every history fetch by `delay` (for coalescing tests).
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.inner.fetch_delay.lock() = Some(delay);
    }

    /// Messages accepted by the send endpoint, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<Message> {
        self.inner.sent.lock().clone()
    }

    /// Queries the search endpoint has served, in order.
    #[must_use]
    pub fn searched(&self) -> Vec<String> {
        self.inner.searched.lock().clone()
    }

    /// Number of history fetches served (or failed) so far.
    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.inner.fetch_calls.load(Ordering::SeqCst)
    }
}

impl ChatApi for InMemoryApi {
    async fn fetch_history(&self, peer: UserId, _token: &str) -> Result<Vec<Message>, ApiError> {
        self.inner.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.inner.fetch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.inner.fail_next_fetch.lock().take() {
            return Err(err);
        }

        Ok(self
            .inner
            .history
            .lock()
            .get(&peer)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(
        &self,
        peer: UserId,
        content: &str,
        _token: &str,
    ) -> Result<Message, ApiError> {
        if let Some(err) = self.inner.fail_next_send.lock().take() {
            return Err(err);
        }

        let msg = Message {
            id: MessageId::from_uuid(Uuid::new_v4()),
            from_id: self.inner.local_user,
            to_id: peer,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.inner.sent.lock().push(msg.clone());
        self.inner
            .history
            .lock()
            .entry(peer)
            .or_default()
            .push(msg.clone());
        Ok(msg)
    }

    async fn search_users(&self, query: &str, _token: &str) -> Result<Vec<UserSummary>, ApiError> {
        self.inner.searched.lock().push(query.to_string());
        if let Some(err) = self.inner.fail_next_search.lock().take() {
            return Err(err);
        }
        let needle = query.to_lowercase();
        Ok(self
            .inner
            .users
            .lock()
            .iter()
            .filter(|u| {
                u.username.to_lowercase().contains(&needle)
                    || u.email.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }
}
