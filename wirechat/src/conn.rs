//! Connection manager: supervised lifecycle of the live channel.
//!
//! A single supervisor task owns the transport exclusively. It dials,
//! pumps inbound frames to the subscriber channel, and on loss walks the
//! [`BackoffPolicy`] delay table until either the connection comes back
//! or the attempt cap is exhausted (terminal disconnect, manual
//! [`ConnectionManager::connect`] required). The credential is re-read
//! at every attempt so a logout during backoff aborts cleanly instead of
//! reconnecting with a stale token.
//!
//! `disconnect()` aborts the supervisor task, which deterministically
//! cancels any pending backoff timer; there is no fire-and-forget timer
//! anywhere in this module.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use wirechat_proto::message::Message;

use crate::auth::CredentialSource;
use crate::backoff::BackoffPolicy;
use crate::transport::{ConnEvent, Connection, Dialer};

/// Observable state of the live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no supervisor running.
    Disconnected,
    /// A dial attempt is in flight.
    Connecting,
    /// The live channel is up.
    Connected,
    /// Waiting out a backoff delay before the next attempt.
    Backoff {
        /// 1-based reconnect attempt number.
        attempt: u32,
        /// How long this wait is.
        delay: Duration,
    },
}

/// Errors from [`ConnectionManager::connect`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConnectError {
    /// No credential is available; no transport attempt was made.
    #[error("no credential available")]
    CredentialMissing,
}

/// Owns the live transport lifecycle: connect, detect failure, back off,
/// reconnect, expose current state.
///
/// Constructed once per session. At most one transport is live per
/// manager instance; subscribers observe state via a `watch` channel and
/// inbound frames via the `mpsc` receiver returned at construction.
pub struct ConnectionManager<D: Dialer, C: CredentialSource> {
    dialer: Arc<D>,
    credentials: Arc<C>,
    policy: BackoffPolicy,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    frames_tx: mpsc::Sender<Message>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl<D: Dialer, C: CredentialSource> ConnectionManager<D, C> {
    /// Creates a manager plus its state and frame subscriptions.
    ///
    /// Nothing is dialed until [`connect`](Self::connect) is called.
    #[must_use]
    pub fn new(
        dialer: Arc<D>,
        credentials: Arc<C>,
        policy: BackoffPolicy,
        frame_capacity: usize,
    ) -> (
        Self,
        watch::Receiver<ConnectionState>,
        mpsc::Receiver<Message>,
    ) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (frames_tx, frames_rx) = mpsc::channel(frame_capacity);
        let manager = Self {
            dialer,
            credentials,
            policy,
            state_tx: Arc::new(state_tx),
            frames_tx,
            supervisor: Mutex::new(None),
        };
        (manager, state_rx, frames_rx)
    }

    /// Current connection state snapshot.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    /// Subscribes to state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Starts the connection supervisor.
    ///
    /// Idempotent while a supervisor is already running. After a
    /// terminal disconnect (attempt cap exhausted or logout) a new call
    /// starts over with a fresh attempt counter.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::CredentialMissing`] without any transport
    /// attempt if no credential is available.
    pub fn connect(&self) -> Result<(), ConnectError> {
        if self.credentials.current_token().is_none() {
            return Err(ConnectError::CredentialMissing);
        }

        let mut supervisor = self.supervisor.lock();
        if let Some(handle) = supervisor.as_ref()
            && !handle.is_finished()
        {
            return Ok(());
        }

        let dialer = Arc::clone(&self.dialer);
        let credentials = Arc::clone(&self.credentials);
        let policy = self.policy.clone();
        let state_tx = Arc::clone(&self.state_tx);
        let frames_tx = self.frames_tx.clone();
        *supervisor = Some(tokio::spawn(async move {
            supervise(
                dialer.as_ref(),
                credentials.as_ref(),
                &policy,
                &state_tx,
                &frames_tx,
            )
            .await;
        }));
        Ok(())
    }

    /// Tears the connection down from any state. Idempotent.
    ///
    /// Aborting the supervisor drops the live transport (if any) and
    /// cancels a pending backoff timer; no reconnect happens afterwards
    /// without a new explicit [`connect`](Self::connect).
    pub fn disconnect(&self) {
        let handle = self.supervisor.lock().take();
        if let Some(handle) = handle {
            handle.abort();
        }
        if self.state_tx.send_replace(ConnectionState::Disconnected)
            != ConnectionState::Disconnected
        {
            tracing::info!("live connection torn down");
        }
    }
}

/// Supervisor loop: dial, pump, back off, repeat.
async fn supervise<D: Dialer, C: CredentialSource>(
    dialer: &D,
    credentials: &C,
    policy: &BackoffPolicy,
    state_tx: &watch::Sender<ConnectionState>,
    frames_tx: &mpsc::Sender<Message>,
) {
    let mut attempt: u32 = 0;
    loop {
        // Re-read the credential at every attempt; a logout during
        // backoff must never turn into a reconnect with a stale token.
        let Some(token) = credentials.current_token() else {
            tracing::info!("credential cleared, abandoning connection");
            state_tx.send_replace(ConnectionState::Disconnected);
            return;
        };

        state_tx.send_replace(ConnectionState::Connecting);
        match dialer.dial(&token).await {
            Ok(mut conn) => {
                attempt = 0;
                state_tx.send_replace(ConnectionState::Connected);
                if pump(&mut conn, frames_tx).await == PumpExit::SubscriberGone {
                    state_tx.send_replace(ConnectionState::Disconnected);
                    return;
                }
            }
            Err(err) => {
                tracing::warn!(err = %err, attempt, "connect attempt failed");
            }
        }

        attempt += 1;
        match policy.delay(attempt) {
            Some(delay) => {
                tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
                state_tx.send_replace(ConnectionState::Backoff { attempt, delay });
                tokio::time::sleep(delay).await;
            }
            None => {
                tracing::error!(
                    max_attempts = policy.max_attempts,
                    "reconnect attempts exhausted, giving up"
                );
                state_tx.send_replace(ConnectionState::Disconnected);
                return;
            }
        }
    }
}

#[derive(PartialEq, Eq)]
enum PumpExit {
    ConnectionLost,
    SubscriberGone,
}

/// Forwards frames until the connection dies or the subscriber drops.
async fn pump<T: Connection>(conn: &mut T, frames_tx: &mpsc::Sender<Message>) -> PumpExit {
    loop {
        match conn.next_event().await {
            ConnEvent::Frame(msg) => {
                if frames_tx.send(msg).await.is_err() {
                    tracing::info!("frame subscriber dropped, stopping supervisor");
                    return PumpExit::SubscriberGone;
                }
            }
            ConnEvent::Closed(code) => {
                tracing::info!(?code, "live channel closed");
                return PumpExit::ConnectionLost;
            }
            ConnEvent::Failed(err) => {
                tracing::warn!(err = %err, "live channel failed");
                return PumpExit::ConnectionLost;
            }
        }
    }
}
