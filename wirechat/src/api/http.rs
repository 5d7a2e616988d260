//! `reqwest`-backed implementation of [`ChatApi`].
//!
//! Talks to the server's REST endpoints:
//! - `POST {base}/chat/messages`
//! - `GET  {base}/chat/messages/{peerId}`
//! - `GET  {base}/users/search?q=...`
//!
//! with the bearer token in the `Authorization` header.

use serde::Serialize;

use wirechat_proto::message::{Message, UserId, UserSummary};

use super::{ApiError, ChatApi};

/// HTTP client for the chat server's REST surface.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    http: reqwest::Client,
    base_url: url::Url,
}

/// Body of `POST /chat/messages`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest<'a> {
    to_id: UserId,
    content: &'a str,
}

impl HttpChatApi {
    /// Creates a client against the given API base URL
    /// (e.g. `http://localhost:8080/api`).
    #[must_use]
    pub fn new(base_url: url::Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, path: &str) -> Result<url::Url, ApiError> {
        // Url::join treats the base as a directory only with a trailing
        // slash, so build the path by hand.
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| ApiError::Network("API base URL cannot be a base".into()))?;
            segments.pop_if_empty();
            for segment in path.split('/') {
                segments.push(segment);
            }
        }
        Ok(url)
    }
}

/// Maps a non-success response to the error taxonomy.
fn status_error(status: reqwest::StatusCode, context: &str) -> ApiError {
    match status {
        reqwest::StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        reqwest::StatusCode::BAD_REQUEST => ApiError::BadRequest(context.to_string()),
        other => ApiError::Network(format!("{context}: status {other}")),
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl ChatApi for HttpChatApi {
    async fn fetch_history(&self, peer: UserId, token: &str) -> Result<Vec<Message>, ApiError> {
        let url = self.endpoint(&format!("chat/messages/{peer}"))?;
        let response = self.http.get(url).bearer_auth(token).send().await?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), "history fetch"));
        }
        Ok(response.json().await?)
    }

    async fn send_message(
        &self,
        peer: UserId,
        content: &str,
        token: &str,
    ) -> Result<Message, ApiError> {
        let url = self.endpoint("chat/messages")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&SendMessageRequest {
                to_id: peer,
                content,
            })
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            reqwest::StatusCode::BAD_REQUEST => {
                Err(ApiError::Validation("message rejected by server".into()))
            }
            status => Err(status_error(status, "send")),
        }
    }

    async fn search_users(&self, query: &str, token: &str) -> Result<Vec<UserSummary>, ApiError> {
        let mut url = self.endpoint("users/search")?;
        url.query_pairs_mut().append_pair("q", query);
        let response = self.http.get(url).bearer_auth(token).send().await?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), "user search"));
        }
        Ok(response.json().await?)
    }
}
