//! Debounced user search.
//!
//! Every keystroke lands here via [`SearchDebouncer::update`]; only the
//! last value within the debounce window reaches the REST collaborator.
//! Superseded timers (and in-flight requests they already dispatched)
//! are aborted, so outcomes can never arrive out of order.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use wirechat_proto::message::UserSummary;

use crate::api::{ApiError, ChatApi};
use crate::auth::CredentialSource;

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// What a settled search produced.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// Matches for the most recent query.
    Results(Vec<UserSummary>),
    /// The query emptied out; show nothing.
    Cleared,
    /// The request for the most recent query failed.
    Failed(ApiError),
}

/// Coalesces a stream of query edits into at most one request per
/// debounce window.
pub struct SearchDebouncer<A: ChatApi, C: CredentialSource> {
    api: Arc<A>,
    credentials: Arc<C>,
    delay: Duration,
    outcomes_tx: mpsc::Sender<SearchOutcome>,
    /// The armed timer (and, once it fires, the request) for the latest
    /// query. Replaced wholesale on every update.
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<A: ChatApi, C: CredentialSource> SearchDebouncer<A, C> {
    /// Creates a debouncer delivering outcomes on the returned channel.
    #[must_use]
    pub fn new(
        api: Arc<A>,
        credentials: Arc<C>,
        delay: Duration,
    ) -> (Self, mpsc::Receiver<SearchOutcome>) {
        let (outcomes_tx, outcomes_rx) = mpsc::channel(16);
        (
            Self {
                api,
                credentials,
                delay,
                outcomes_tx,
                pending: Mutex::new(None),
            },
            outcomes_rx,
        )
    }

    /// Registers the latest query text. Resets the debounce timer and
    /// supersedes any earlier query, settled or not. Empty or
    /// whitespace-only text clears results once the timer fires, without
    /// issuing a request.
    pub fn update(&self, query: &str) {
        let mut pending = self.pending.lock();
        if let Some(handle) = pending.take() {
            handle.abort();
        }

        let trimmed = query.trim();
        if trimmed.is_empty() {
            let outcomes_tx = self.outcomes_tx.clone();
            let delay = self.delay;
            *pending = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = outcomes_tx.send(SearchOutcome::Cleared).await;
            }));
            return;
        }

        let query = trimmed.to_string();
        let api = Arc::clone(&self.api);
        let credentials = Arc::clone(&self.credentials);
        let outcomes_tx = self.outcomes_tx.clone();
        let delay = self.delay;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(token) = credentials.current_token() else {
                let _ = outcomes_tx.send(SearchOutcome::Failed(ApiError::Unauthorized)).await;
                return;
            };
            tracing::debug!(query = %query, "dispatching user search");
            let outcome = match api.search_users(&query, &token).await {
                Ok(users) => SearchOutcome::Results(users),
                Err(err) => {
                    tracing::warn!(err = %err, "user search failed");
                    SearchOutcome::Failed(err)
                }
            };
            let _ = outcomes_tx.send(outcome).await;
        }));
    }

    /// Drops any armed timer or in-flight request without an outcome.
    pub fn cancel(&self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
    }
}

impl<A: ChatApi, C: CredentialSource> Drop for SearchDebouncer<A, C> {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
    }
}
