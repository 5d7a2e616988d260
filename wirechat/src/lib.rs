//! Wirechat: resilient real-time direct-message sync client.
//!
//! The interesting part of this crate is the synchronization layer: a
//! supervised WebSocket connection ([`conn`]) that survives network loss
//! with exponential backoff, a pure reconciliation core ([`reconcile`])
//! that merges fetched history with the live stream into one ordered,
//! deduplicated timeline, and a per-conversation state container
//! ([`store`]) that the UI reads snapshots from. [`client`] wires it all
//! together behind one explicitly owned facade.

pub mod api;
pub mod auth;
pub mod backoff;
pub mod client;
pub mod config;
pub mod conn;
pub mod reconcile;
pub mod search;
pub mod store;
pub mod transport;
