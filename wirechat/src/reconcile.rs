//! Message reconciliation: merging history batches and live frames into
//! one ordered, deduplicated timeline.
//!
//! [`Timeline`] is a pure data structure with no I/O. Two invariants hold
//! after every operation:
//! - entries are sorted by `(created_at, id)` ascending
//! - no two confirmed entries share a message id
//!
//! Optimistic placeholders ([`DeliveryState::Pending`]) sit in the same
//! ordering but are excluded from the duplicate set; their temporary ids
//! never collide with server ids. The authoritative echo replaces the
//! placeholder exactly once, matched by sender + content + timestamp
//! proximity.

use std::collections::HashSet;
use std::time::Duration;

use chrono::TimeDelta;

use wirechat_proto::message::{Message, MessageId};

/// Delivery state of a timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Confirmed by the server (fetched, echoed, or received live).
    Confirmed,
    /// Optimistic placeholder awaiting the server echo.
    Pending,
    /// The send request failed; kept visible, never merged over.
    Failed,
}

/// One message plus its delivery state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    /// The message itself (placeholder or authoritative).
    pub message: Message,
    /// Current delivery state.
    pub state: DeliveryState,
}

impl TimelineEntry {
    fn key(&self) -> (chrono::DateTime<chrono::Utc>, MessageId) {
        self.message.ordering_key()
    }
}

/// Ordered, deduplicated sequence of messages for one conversation.
#[derive(Debug)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
    /// Ids of confirmed entries, for O(1) duplicate rejection.
    seen: HashSet<MessageId>,
    /// How far apart an echo's server timestamp may be from the local
    /// placeholder timestamp and still match it.
    echo_window: TimeDelta,
}

impl Timeline {
    /// Creates an empty timeline with the given optimistic-echo window.
    #[must_use]
    pub fn new(echo_window: Duration) -> Self {
        Self {
            entries: Vec::new(),
            seen: HashSet::new(),
            echo_window: TimeDelta::from_std(echo_window).unwrap_or(TimeDelta::seconds(30)),
        }
    }

    /// Current ordered sequence.
    #[must_use]
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Clones the current sequence for handing to the UI.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TimelineEntry> {
        self.entries.clone()
    }

    /// Whether a confirmed entry with this id exists.
    #[must_use]
    pub fn contains(&self, id: MessageId) -> bool {
        self.seen.contains(&id)
    }

    /// Inserts a single confirmed message (live frame or send echo).
    ///
    /// Returns `true` if the timeline changed. Duplicates are discarded;
    /// a message matching a pending placeholder replaces it.
    pub fn insert_confirmed(&mut self, msg: Message) -> bool {
        if self.seen.contains(&msg.id) {
            tracing::debug!(id = %msg.id, "duplicate message discarded");
            return false;
        }
        self.resolve_pending_echo(&msg);
        self.seen.insert(msg.id);
        let entry = TimelineEntry {
            message: msg,
            state: DeliveryState::Confirmed,
        };
        let at = self.entries.partition_point(|e| e.key() < entry.key());
        self.entries.insert(at, entry);
        true
    }

    /// Bulk-merges a history fetch result.
    ///
    /// The batch is sorted defensively (the fetch contract does not
    /// guarantee order), deduplicated against the timeline and within
    /// itself, then merged linearly in O(|timeline| + |batch|).
    /// Returns `true` if the timeline changed.
    pub fn merge_history(&mut self, mut batch: Vec<Message>) -> bool {
        batch.sort_by_key(Message::ordering_key);

        let mut incoming: Vec<Message> = Vec::with_capacity(batch.len());
        for msg in batch {
            if self.seen.contains(&msg.id) {
                continue;
            }
            // Intra-batch duplicate: the batch is sorted, so equal ids
            // are adjacent only if timestamps match; check the set anyway.
            self.seen.insert(msg.id);
            self.resolve_pending_echo(&msg);
            incoming.push(msg);
        }
        if incoming.is_empty() {
            return false;
        }

        let old = std::mem::take(&mut self.entries);
        let mut merged = Vec::with_capacity(old.len() + incoming.len());
        let mut old_iter = old.into_iter().peekable();
        let mut new_iter = incoming.into_iter().peekable();
        loop {
            let take_old = match (old_iter.peek(), new_iter.peek()) {
                (Some(existing), Some(fresh)) => existing.key() <= fresh.ordering_key(),
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            if take_old {
                if let Some(entry) = old_iter.next() {
                    merged.push(entry);
                }
            } else if let Some(message) = new_iter.next() {
                merged.push(TimelineEntry {
                    message,
                    state: DeliveryState::Confirmed,
                });
            }
        }
        self.entries = merged;
        true
    }

    /// Inserts an optimistic placeholder with a temporary id.
    ///
    /// The placeholder participates in ordering by its local timestamp
    /// but is excluded from the confirmed duplicate set.
    pub fn insert_pending(&mut self, msg: Message) {
        let entry = TimelineEntry {
            message: msg,
            state: DeliveryState::Pending,
        };
        let at = self.entries.partition_point(|e| e.key() < entry.key());
        self.entries.insert(at, entry);
    }

    /// Marks the pending entry with `temp_id` as failed.
    ///
    /// Returns `false` if no such pending entry exists (already
    /// confirmed by an echo, or never inserted).
    pub fn mark_failed(&mut self, temp_id: MessageId) -> bool {
        for entry in &mut self.entries {
            if entry.message.id == temp_id && entry.state == DeliveryState::Pending {
                entry.state = DeliveryState::Failed;
                return true;
            }
        }
        false
    }

    /// Removes the pending placeholder that `msg` is the authoritative
    /// echo of, if any: same sender, same content, timestamps within the
    /// echo window. At most one placeholder is removed.
    fn resolve_pending_echo(&mut self, msg: &Message) {
        let matched = self.entries.iter().position(|e| {
            e.state == DeliveryState::Pending
                && e.message.from_id == msg.from_id
                && e.message.to_id == msg.to_id
                && e.message.content == msg.content
                && (msg.created_at - e.message.created_at).abs() <= self.echo_window
        });
        if let Some(at) = matched {
            let placeholder = self.entries.remove(at);
            tracing::debug!(
                temp_id = %placeholder.message.id,
                id = %msg.id,
                "optimistic placeholder confirmed by echo"
            );
        }
    }
}
