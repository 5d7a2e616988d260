//! The assembled client: connection supervision, conversation state,
//! and debounced search behind one explicitly owned facade.
//!
//! [`ChatClient`] spawns two background tasks at construction: a frame
//! pump that feeds live frames from the connection manager into the
//! store, and a logout watcher that tears the session down the moment
//! the credential store reports logout. Both are aborted by
//! [`shutdown`](ChatClient::shutdown) (or on drop).

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use wirechat_proto::message::{Message, UserId};

use crate::api::ChatApi;
use crate::auth::CredentialSource;
use crate::backoff::BackoffPolicy;
use crate::conn::{ConnectError, ConnectionManager, ConnectionState};
use crate::reconcile::TimelineEntry;
use crate::search::{DEFAULT_DEBOUNCE, SearchDebouncer, SearchOutcome};
use crate::store::{ConversationStore, StoreConfig, SyncError};
use crate::transport::Dialer;

/// Tunables for a [`ChatClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Reconnect backoff schedule.
    pub backoff: BackoffPolicy,
    /// Conversation store tunables.
    pub store: StoreConfig,
    /// Debounce window for user search.
    pub search_debounce: Duration,
    /// Capacity of the inbound frame channel.
    pub frame_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            store: StoreConfig::default(),
            search_debounce: DEFAULT_DEBOUNCE,
            frame_capacity: 64,
        }
    }
}

/// One user's chat session, end to end.
pub struct ChatClient<D: Dialer, A: ChatApi, C: CredentialSource> {
    manager: Arc<ConnectionManager<D, C>>,
    store: Arc<ConversationStore<A, C>>,
    search: SearchDebouncer<A, C>,
    state_rx: watch::Receiver<ConnectionState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<D: Dialer, A: ChatApi, C: CredentialSource> ChatClient<D, A, C> {
    /// Assembles a client for `local_user`'s session and spawns its
    /// background tasks. Search outcomes arrive on the returned channel.
    ///
    /// Nothing is dialed until [`connect`](Self::connect).
    #[must_use]
    pub fn new(
        dialer: Arc<D>,
        api: Arc<A>,
        credentials: Arc<C>,
        local_user: UserId,
        config: ClientConfig,
    ) -> (Self, mpsc::Receiver<SearchOutcome>) {
        let (manager, state_rx, frames_rx) = ConnectionManager::new(
            dialer,
            Arc::clone(&credentials),
            config.backoff,
            config.frame_capacity,
        );
        let manager = Arc::new(manager);
        let store = Arc::new(ConversationStore::new(
            Arc::clone(&api),
            Arc::clone(&credentials),
            local_user,
            config.store,
        ));
        let (search, search_rx) =
            SearchDebouncer::new(api, Arc::clone(&credentials), config.search_debounce);

        let pump = tokio::spawn(pump_frames(frames_rx, Arc::clone(&store)));
        let watcher = tokio::spawn(watch_logout(
            credentials.on_logout(),
            Arc::clone(&manager),
            Arc::clone(&store),
        ));

        (
            Self {
                manager,
                store,
                search,
                state_rx,
                tasks: Mutex::new(vec![pump, watcher]),
            },
            search_rx,
        )
    }

    /// Starts the live connection supervisor.
    ///
    /// # Errors
    ///
    /// [`ConnectError::CredentialMissing`] when logged out.
    pub fn connect(&self) -> Result<(), ConnectError> {
        self.manager.connect()
    }

    /// Tears down the live connection. Conversation state is kept;
    /// in-flight request results are invalidated.
    pub fn disconnect(&self) {
        self.manager.disconnect();
        self.store.invalidate();
    }

    /// Current connection state snapshot.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Subscribes to connection state transitions.
    #[must_use]
    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.manager.subscribe()
    }

    /// Subscribes to the store revision counter; bumps on every visible
    /// timeline mutation.
    #[must_use]
    pub fn subscribe_store(&self) -> watch::Receiver<u64> {
        self.store.subscribe()
    }

    /// Opens the conversation with `peer` and syncs its history.
    ///
    /// # Errors
    ///
    /// See [`ConversationStore::open_conversation`].
    pub async fn open_conversation(&self, peer: UserId) -> Result<(), SyncError> {
        self.store.open_conversation(peer).await
    }

    /// Sends `content` to `peer` with an optimistic placeholder.
    ///
    /// # Errors
    ///
    /// See [`ConversationStore::send_optimistic`].
    pub async fn send_message(&self, peer: UserId, content: &str) -> Result<Message, SyncError> {
        self.store.send_optimistic(peer, content).await
    }

    /// Snapshot of the ordered timeline for `peer`.
    #[must_use]
    pub fn conversation(&self, peer: UserId) -> Vec<TimelineEntry> {
        self.store.current_sequence(peer)
    }

    /// Registers the latest search query text (debounced).
    pub fn search(&self, query: &str) {
        self.search.update(query);
    }

    /// Tears the whole session down: connection, background tasks, any
    /// pending search. Conversation state is dropped. Idempotent.
    pub fn shutdown(&self) {
        self.manager.disconnect();
        self.search.cancel();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.store.clear();
    }
}

impl<D: Dialer, A: ChatApi, C: CredentialSource> Drop for ChatClient<D, A, C> {
    fn drop(&mut self) {
        self.manager.disconnect();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Feeds live frames into the store until the manager side closes.
async fn pump_frames<A: ChatApi, C: CredentialSource>(
    mut frames_rx: mpsc::Receiver<Message>,
    store: Arc<ConversationStore<A, C>>,
) {
    while let Some(msg) = frames_rx.recv().await {
        store.apply_incoming(msg);
    }
}

/// Tears the session down when the credential store reports logout.
async fn watch_logout<D: Dialer, A: ChatApi, C: CredentialSource>(
    mut logout_rx: watch::Receiver<bool>,
    manager: Arc<ConnectionManager<D, C>>,
    store: Arc<ConversationStore<A, C>>,
) {
    loop {
        if *logout_rx.borrow_and_update() {
            tracing::info!("logout observed, tearing session down");
            manager.disconnect();
            store.clear();
            return;
        }
        if logout_rx.changed().await.is_err() {
            return;
        }
    }
}
