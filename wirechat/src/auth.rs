//! Credential source boundary.
//!
//! The authentication/token store is an external collaborator: this
//! module only defines the contract the sync layer consumes (a bearer
//! token that may vanish, plus a logout signal) and an in-process
//! implementation for wiring and tests.

use parking_lot::RwLock;
use tokio::sync::watch;

/// Supplies the current bearer credential and a logout signal.
///
/// The connection supervisor re-reads the token at every connect attempt
/// so a logout during backoff is never raced past; the logout receiver
/// exists so long-lived tasks can tear down promptly instead of waiting
/// for the next reconnect.
pub trait CredentialSource: Send + Sync + 'static {
    /// Returns the current bearer token, or `None` when logged out.
    fn current_token(&self) -> Option<String>;

    /// Subscribes to the logout signal. The watched value flips to `true`
    /// once the session ends and never flips back for this source.
    fn on_logout(&self) -> watch::Receiver<bool>;
}

/// In-process token holder implementing [`CredentialSource`].
///
/// Constructed at session start with the token obtained from login and
/// cleared exactly once at logout.
pub struct SessionTokens {
    token: RwLock<Option<String>>,
    logout_tx: watch::Sender<bool>,
}

impl SessionTokens {
    /// Creates a source holding the given bearer token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        let (logout_tx, _) = watch::channel(false);
        Self {
            token: RwLock::new(Some(token.into())),
            logout_tx,
        }
    }

    /// Creates a source with no credential (logged-out state).
    #[must_use]
    pub fn logged_out() -> Self {
        let (logout_tx, _) = watch::channel(true);
        Self {
            token: RwLock::new(None),
            logout_tx,
        }
    }

    /// Replaces the stored token, e.g. after a token refresh.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Clears the token and fires the logout signal. Idempotent.
    pub fn log_out(&self) {
        *self.token.write() = None;
        self.logout_tx.send_replace(true);
    }
}

impl CredentialSource for SessionTokens {
    fn current_token(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn on_logout(&self) -> watch::Receiver<bool> {
        self.logout_tx.subscribe()
    }
}
