//! In-process scripted transport for tests.
//!
//! [`LoopbackDialer`] hands each successful dial back to the test as a
//! [`LoopbackHandle`], which plays the server's role: it injects frames,
//! closes the connection, or fails it. Dials can be scripted to be
//! refused, which is how tests exercise the backoff path.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use wirechat_proto::message::Message;

use super::{ConnEvent, Connection, Dialer, TransportError};

struct Inner {
    /// Number of upcoming dials to refuse before accepting again.
    refusals: Mutex<u32>,
    /// Every token the manager dialed with, in order.
    dialed_tokens: Mutex<Vec<String>>,
    /// Accepted connections are handed to the test through this channel.
    accepted_tx: mpsc::UnboundedSender<LoopbackHandle>,
}

/// Scripted in-process [`Dialer`] implementation.
#[derive(Clone)]
pub struct LoopbackDialer {
    inner: Arc<Inner>,
}

impl LoopbackDialer {
    /// Creates a dialer and the receiver on which accepted connections
    /// (as [`LoopbackHandle`]s) are delivered to the test.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LoopbackHandle>) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let dialer = Self {
            inner: Arc::new(Inner {
                refusals: Mutex::new(0),
                dialed_tokens: Mutex::new(Vec::new()),
                accepted_tx,
            }),
        };
        (dialer, accepted_rx)
    }

    /// Scripts the next `n` dials to be refused.
    pub fn refuse_next(&self, n: u32) {
        *self.inner.refusals.lock() += n;
    }

    /// Returns every token that has been dialed with so far.
    #[must_use]
    pub fn dialed_tokens(&self) -> Vec<String> {
        self.inner.dialed_tokens.lock().clone()
    }

    /// Number of dial attempts observed so far.
    #[must_use]
    pub fn dial_count(&self) -> usize {
        self.inner.dialed_tokens.lock().len()
    }
}

impl Dialer for LoopbackDialer {
    type Conn = LoopbackConnection;

    async fn dial(&self, token: &str) -> Result<LoopbackConnection, TransportError> {
        self.inner.dialed_tokens.lock().push(token.to_string());

        {
            let mut refusals = self.inner.refusals.lock();
            if *refusals > 0 {
                *refusals -= 1;
                return Err(TransportError::Rejected("scripted refusal".into()));
            }
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handle = LoopbackHandle {
            events_tx,
            token: token.to_string(),
        };
        // If the test dropped the receiver the connection still works;
        // it just can't be driven, which is fine for shutdown paths.
        let _ = self.inner.accepted_tx.send(handle);

        Ok(LoopbackConnection { events_rx })
    }
}

/// The server side of an accepted loopback connection.
///
/// Dropping the handle ends the connection as a clean close.
pub struct LoopbackHandle {
    events_tx: mpsc::UnboundedSender<ConnEvent>,
    token: String,
}

impl LoopbackHandle {
    /// The token the client dialed with.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Pushes an inbound frame to the client.
    pub fn push(&self, msg: Message) {
        let _ = self.events_tx.send(ConnEvent::Frame(msg));
    }

    /// Closes the connection with an optional close code.
    pub fn close(&self, code: Option<u16>) {
        let _ = self.events_tx.send(ConnEvent::Closed(code));
    }

    /// Fails the connection mid-stream.
    pub fn fail(&self) {
        let _ = self
            .events_tx
            .send(ConnEvent::Failed(TransportError::ConnectionClosed));
    }
}

/// Client side of a loopback connection.
pub struct LoopbackConnection {
    events_rx: mpsc::UnboundedReceiver<ConnEvent>,
}

impl Connection for LoopbackConnection {
    async fn next_event(&mut self) -> ConnEvent {
        self.events_rx.recv().await.unwrap_or(ConnEvent::Closed(None))
    }
}
