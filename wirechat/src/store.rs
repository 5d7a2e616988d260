//! Conversation store: per-peer reconciled state, exposed to the UI.
//!
//! Owns one [`Timeline`] per open conversation. Mutations come from
//! exactly three places: live frames forwarded by the connection
//! manager ([`apply_incoming`](ConversationStore::apply_incoming)), a
//! one-shot history fetch on open, and the optimistic send path. The UI
//! only ever reads snapshots and watches a revision counter.
//!
//! Frames for conversations that are not open are buffered up to a small
//! bound per peer (latest-wins) so opening the conversation later does
//! not go blind; the history fetch fills any gap beyond the bound.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;

use wirechat_proto::message::{
    ConversationKey, Message, MessageId, UserId, ValidationError, validate_content,
};

use crate::api::{ApiError, ChatApi};
use crate::auth::CredentialSource;
use crate::reconcile::{Timeline, TimelineEntry};

/// Errors surfaced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// No credential available; nothing was attempted.
    #[error("not logged in")]
    CredentialMissing,

    /// Outgoing message content failed validation.
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationError),

    /// The REST collaborator failed. For a history fetch the
    /// conversation stays open with whatever was previously reconciled;
    /// for a send the placeholder is marked failed, never dropped.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Tunables for the store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Max buffered frames per not-yet-open conversation.
    pub frame_buffer: usize,
    /// Echo-match window for optimistic sends.
    pub echo_window: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            frame_buffer: 32,
            echo_window: Duration::from_secs(30),
        }
    }
}

struct Inner {
    open: HashMap<ConversationKey, Timeline>,
    buffered: HashMap<ConversationKey, VecDeque<Message>>,
    /// Conversations with a history fetch in flight; concurrent opens
    /// for the same peer coalesce instead of fetching twice.
    fetching: HashSet<ConversationKey>,
}

/// Process-wide per-peer conversation state.
pub struct ConversationStore<A: ChatApi, C: CredentialSource> {
    api: Arc<A>,
    credentials: Arc<C>,
    local_user: UserId,
    config: StoreConfig,
    /// Session generation for the stale-response guard: results of
    /// requests issued under an older generation are discarded.
    generation: AtomicU64,
    /// Bumped on every visible mutation; the UI re-reads snapshots on
    /// change.
    revision_tx: watch::Sender<u64>,
    inner: Mutex<Inner>,
}

impl<A: ChatApi, C: CredentialSource> ConversationStore<A, C> {
    /// Creates an empty store for `local_user`'s session.
    #[must_use]
    pub fn new(api: Arc<A>, credentials: Arc<C>, local_user: UserId, config: StoreConfig) -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            api,
            credentials,
            local_user,
            config,
            generation: AtomicU64::new(0),
            revision_tx,
            inner: Mutex::new(Inner {
                open: HashMap::new(),
                buffered: HashMap::new(),
                fetching: HashSet::new(),
            }),
        }
    }

    /// The local participant of every conversation in this store.
    #[must_use]
    pub const fn local_user(&self) -> UserId {
        self.local_user
    }

    /// Subscribes to the revision counter; any visible mutation bumps it.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }

    /// Invalidates in-flight request results (stale-response guard).
    /// Called on disconnect and logout.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Drops all conversation state. Called on logout.
    pub fn clear(&self) {
        self.invalidate();
        let mut inner = self.inner.lock();
        inner.open.clear();
        inner.buffered.clear();
        drop(inner);
        self.bump_revision();
    }

    /// Opens (or re-syncs) the conversation with `peer`: creates the
    /// timeline if absent, drains any frames buffered while it was
    /// closed, and issues the one-shot history fetch.
    ///
    /// Concurrent opens for the same peer coalesce into one fetch.
    ///
    /// # Errors
    ///
    /// [`SyncError::CredentialMissing`] without a fetch attempt when
    /// logged out; [`SyncError::Api`] if the fetch fails, in which case
    /// the conversation stays open with whatever was already reconciled.
    pub async fn open_conversation(&self, peer: UserId) -> Result<(), SyncError> {
        let key = ConversationKey::new(self.local_user, peer);

        let drained_changed = {
            let mut inner = self.inner.lock();
            let buffered = inner.buffered.remove(&key);
            let echo_window = self.config.echo_window;
            let timeline = inner
                .open
                .entry(key)
                .or_insert_with(|| Timeline::new(echo_window));
            let mut changed = false;
            if let Some(buffered) = buffered {
                for msg in buffered {
                    changed |= timeline.insert_confirmed(msg);
                }
            }

            if !inner.fetching.insert(key) {
                // A fetch for this peer is already in flight.
                tracing::debug!(%key, "history fetch coalesced");
                drop(inner);
                if changed {
                    self.bump_revision();
                }
                return Ok(());
            }
            changed
        };
        // The flag must come off even if this future is dropped at the
        // fetch await, or the peer could never fetch again.
        let _fetch_flag = FetchFlag { store: self, key };
        if drained_changed {
            self.bump_revision();
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let Some(token) = self.credentials.current_token() else {
            return Err(SyncError::CredentialMissing);
        };

        let result = self.api.fetch_history(peer, &token).await;

        let mut inner = self.inner.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(%key, "discarding stale history fetch result");
            return Ok(());
        }

        match result {
            Ok(batch) => {
                let count = batch.len();
                let changed = inner
                    .open
                    .get_mut(&key)
                    .is_some_and(|timeline| timeline.merge_history(batch));
                drop(inner);
                tracing::info!(%key, count, "history reconciled");
                if changed {
                    self.bump_revision();
                }
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%key, err = %err, "history fetch failed");
                Err(SyncError::Api(err))
            }
        }
    }

    /// Reconciles one live frame into the matching conversation, or
    /// buffers it (bounded, latest-wins) if that conversation is not
    /// open. Frames not involving the local user are dropped.
    pub fn apply_incoming(&self, msg: Message) {
        let key = msg.conversation();
        if !key.contains(self.local_user) {
            tracing::warn!(%key, "dropping frame for a conversation we are not part of");
            return;
        }

        let mut inner = self.inner.lock();
        if let Some(timeline) = inner.open.get_mut(&key) {
            let changed = timeline.insert_confirmed(msg);
            drop(inner);
            if changed {
                self.bump_revision();
            }
        } else {
            let queue = inner.buffered.entry(key).or_default();
            if queue.len() >= self.config.frame_buffer {
                queue.pop_front();
                tracing::debug!(%key, "frame buffer full, dropped oldest");
            }
            queue.push_back(msg);
        }
    }

    /// Inserts an optimistic placeholder and issues the send.
    ///
    /// The placeholder is visible (as pending) before the request goes
    /// out. On success the authoritative echo replaces it; on failure it
    /// is marked failed and kept visible. Returns the placeholder.
    ///
    /// # Errors
    ///
    /// [`SyncError::Invalid`] for empty/oversized content (nothing
    /// inserted), [`SyncError::CredentialMissing`] when logged out,
    /// [`SyncError::Api`] when the send request fails.
    pub async fn send_optimistic(&self, peer: UserId, content: &str) -> Result<Message, SyncError> {
        validate_content(content)?;
        let token = self
            .credentials
            .current_token()
            .ok_or(SyncError::CredentialMissing)?;

        let key = ConversationKey::new(self.local_user, peer);
        let placeholder = Message {
            id: MessageId::temporary(),
            from_id: self.local_user,
            to_id: peer,
            content: content.to_string(),
            created_at: Utc::now(),
        };

        {
            let mut inner = self.inner.lock();
            let echo_window = self.config.echo_window;
            inner
                .open
                .entry(key)
                .or_insert_with(|| Timeline::new(echo_window))
                .insert_pending(placeholder.clone());
        }
        self.bump_revision();

        let generation = self.generation.load(Ordering::SeqCst);
        match self.api.send_message(peer, content, &token).await {
            Ok(echo) => {
                let mut inner = self.inner.lock();
                if self.generation.load(Ordering::SeqCst) == generation {
                    let changed = inner
                        .open
                        .get_mut(&key)
                        .is_some_and(|timeline| timeline.insert_confirmed(echo));
                    drop(inner);
                    if changed {
                        self.bump_revision();
                    }
                } else {
                    // Session moved on; the next history fetch will
                    // confirm or drop the placeholder.
                    tracing::debug!(%key, "discarding stale send echo");
                }
                Ok(placeholder)
            }
            Err(err) => {
                tracing::warn!(%key, err = %err, temp_id = %placeholder.id, "send failed");
                let mut inner = self.inner.lock();
                if let Some(timeline) = inner.open.get_mut(&key) {
                    timeline.mark_failed(placeholder.id);
                }
                drop(inner);
                self.bump_revision();
                Err(SyncError::Api(err))
            }
        }
    }

    /// Snapshot of the ordered sequence for `peer`. Never blocks beyond
    /// a short critical section; empty if the conversation is not open.
    #[must_use]
    pub fn current_sequence(&self, peer: UserId) -> Vec<TimelineEntry> {
        let key = ConversationKey::new(self.local_user, peer);
        self.inner
            .lock()
            .open
            .get(&key)
            .map(Timeline::snapshot)
            .unwrap_or_default()
    }

    fn bump_revision(&self) {
        self.revision_tx.send_modify(|revision| *revision += 1);
    }
}

/// Removes a conversation's in-flight-fetch flag on drop.
///
/// `open_conversation` holds one across its fetch await so the flag is
/// cleared on every exit path, including the caller dropping the future
/// mid-fetch. Must never be dropped while the store's lock is held.
struct FetchFlag<'a, A: ChatApi, C: CredentialSource> {
    store: &'a ConversationStore<A, C>,
    key: ConversationKey,
}

impl<A: ChatApi, C: CredentialSource> Drop for FetchFlag<'_, A, C> {
    fn drop(&mut self) {
        self.store.inner.lock().fetching.remove(&self.key);
    }
}
