//! Data model for direct messages and the users that exchange them.
//!
//! All types mirror the server's JSON shapes (camelCase field names).
//! A [`Message`] is immutable once created: the client never edits an
//! entry in place, it only replaces optimistic placeholders wholesale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed message content length in bytes, matching the server's
/// read limit on the live channel.
pub const MAX_CONTENT_SIZE: usize = 4096;

/// Unique identifier for a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Wraps an existing UUID as a user identifier.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::str::FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a message.
///
/// Real identifiers are assigned by the server. [`MessageId::temporary`]
/// generates a local placeholder id for an optimistic send; it is replaced
/// once the authoritative echo arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generates a fresh local identifier for an optimistic placeholder.
    #[must_use]
    pub fn temporary() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID as a message identifier.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single direct message between two users.
///
/// Timestamps come from the server clock and are monotonic per sender at
/// best, never globally, which is why ordering ties are broken by id.
/// The server also sends an `updatedAt` field; the client has no use for
/// it and ignores it on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-assigned identifier (or a temporary local one, see
    /// [`MessageId::temporary`]).
    pub id: MessageId,
    /// The sender.
    pub from_id: UserId,
    /// The recipient.
    pub to_id: UserId,
    /// Message text, non-empty.
    pub content: String,
    /// Server-side creation time.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// The canonical conversation this message belongs to.
    #[must_use]
    pub fn conversation(&self) -> ConversationKey {
        ConversationKey::new(self.from_id, self.to_id)
    }

    /// Sort key for timeline ordering: creation time ascending, ties
    /// broken by identifier so ordering stays deterministic when server
    /// timestamps collide.
    #[must_use]
    pub const fn ordering_key(&self) -> (DateTime<Utc>, MessageId) {
        (self.created_at, self.id)
    }
}

/// Errors produced by [`validate_content`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Message content is empty or whitespace-only.
    #[error("message content is empty")]
    Empty,

    /// Message content exceeds [`MAX_CONTENT_SIZE`].
    #[error("message content is {size} bytes (max {MAX_CONTENT_SIZE})")]
    TooLarge {
        /// Actual content size in bytes.
        size: usize,
    },
}

/// Validates outgoing message content before it is inserted or sent.
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] for empty or whitespace-only content
/// and [`ValidationError::TooLarge`] for content over [`MAX_CONTENT_SIZE`].
pub fn validate_content(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    if content.len() > MAX_CONTENT_SIZE {
        return Err(ValidationError::TooLarge {
            size: content.len(),
        });
    }
    Ok(())
}

/// Canonical identity of a two-party conversation.
///
/// The pair is unordered: `new(a, b)` and `new(b, a)` produce the same
/// key, so a conversation is identified independent of message direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    lo: UserId,
    hi: UserId,
}

impl ConversationKey {
    /// Builds the canonical key for the conversation between two users.
    #[must_use]
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self { lo: a, hi: b }
        } else {
            Self { lo: b, hi: a }
        }
    }

    /// Whether the given user participates in this conversation.
    #[must_use]
    pub fn contains(&self, user: UserId) -> bool {
        self.lo == user || self.hi == user
    }

    /// Given one participant, returns the other.
    ///
    /// Returns `None` if `local` is not a participant. For a self
    /// conversation (both sides the same user) the peer is that user.
    #[must_use]
    pub fn peer_of(&self, local: UserId) -> Option<UserId> {
        if local == self.lo {
            Some(self.hi)
        } else if local == self.hi {
            Some(self.lo)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}<->{}", self.lo, self.hi)
    }
}

/// A user as returned by the search endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    /// The user's identifier.
    pub id: UserId,
    /// Display/login name.
    pub username: String,
    /// Account email address.
    pub email: String,
}
