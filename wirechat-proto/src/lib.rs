//! Wire types shared by the wirechat client and any conforming chat server.
//!
//! The server speaks JSON, both over REST and over the live WebSocket
//! channel, so everything here serializes with `serde_json` using the
//! server's camelCase field names.

pub mod codec;
pub mod message;
