//! REST collaborator boundary: history fetch, send, user search.
//!
//! The sync layer consumes this contract only; the full login/register
//! client lives outside this crate. Implementations:
//! - [`http::HttpChatApi`]: `reqwest` client against the real server
//! - [`memory::InMemoryApi`]: scriptable in-process fake for tests

pub mod http;
pub mod memory;

use wirechat_proto::message::{Message, UserId, UserSummary};

/// Errors reported by the REST collaborators.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// The bearer token was rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// The server rejected the request content (send only).
    #[error("request rejected: {0}")]
    Validation(String),

    /// The request itself was malformed (search only).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request never completed (connectivity, timeout, 5xx).
    #[error("network error: {0}")]
    Network(String),
}

/// The chat server's REST surface as consumed by the sync layer.
pub trait ChatApi: Send + Sync + 'static {
    /// Fetches the full message history with `peer`.
    ///
    /// The result is not guaranteed sorted; the reconciler sorts
    /// defensively before merging.
    fn fetch_history(
        &self,
        peer: UserId,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, ApiError>> + Send;

    /// Sends a message to `peer`, returning the authoritative message
    /// (server-assigned id and timestamp).
    fn send_message(
        &self,
        peer: UserId,
        content: &str,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Message, ApiError>> + Send;

    /// Searches users by username or email.
    fn search_users(
        &self,
        query: &str,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Vec<UserSummary>, ApiError>> + Send;
}
