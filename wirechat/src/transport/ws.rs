//! WebSocket transport over `tokio-tungstenite`.
//!
//! Connects to the server's live endpoint with the bearer token in the
//! `Authorization` header, then reads JSON message frames until the
//! socket closes. Pings are answered automatically by tungstenite as a
//! side effect of reading.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use wirechat_proto::codec;

use super::{ConnEvent, Connection, Dialer, TransportError};

/// Default timeout for establishing the WebSocket connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Dialer for the server's live WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct WsDialer {
    url: url::Url,
    connect_timeout: Duration,
}

impl WsDialer {
    /// Creates a dialer for the given `ws://` or `wss://` URL.
    #[must_use]
    pub const fn new(url: url::Url) -> Self {
        Self {
            url,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    /// Overrides the connect timeout (mainly for tests).
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The endpoint URL this dialer connects to.
    #[must_use]
    pub const fn url(&self) -> &url::Url {
        &self.url
    }
}

impl Dialer for WsDialer {
    type Conn = WsConnection;

    async fn dial(&self, token: &str) -> Result<WsConnection, TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Rejected(format!("invalid endpoint: {e}")))?;
        let bearer = format!("Bearer {token}")
            .parse()
            .map_err(|_| TransportError::Rejected("token is not a valid header value".into()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (stream, _response) =
            tokio::time::timeout(self.connect_timeout, connect_async(request))
                .await
                .map_err(|_| {
                    tracing::warn!(url = %self.url, "live channel connect timed out");
                    TransportError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url = %self.url, err = %e, "live channel connect failed");
                    map_connect_error(e)
                })?;

        tracing::info!(url = %self.url, "live channel connected");
        Ok(WsConnection { stream })
    }
}

/// An established WebSocket connection to the live endpoint.
#[derive(Debug)]
pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Connection for WsConnection {
    async fn next_event(&mut self) -> ConnEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    match codec::decode_frame(text.as_bytes()) {
                        Ok(msg) => return ConnEvent::Frame(msg),
                        Err(e) => {
                            // Malformed frame: log and skip, don't disconnect.
                            tracing::warn!(err = %e, "malformed live frame, skipping");
                        }
                    }
                }
                Some(Ok(WsMessage::Binary(data))) => match codec::decode_frame(&data) {
                    Ok(msg) => return ConnEvent::Frame(msg),
                    Err(e) => {
                        tracing::warn!(err = %e, "malformed binary live frame, skipping");
                    }
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code));
                    tracing::info!(?code, "live channel closed by server");
                    return ConnEvent::Closed(code);
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {
                    // Keepalive traffic; tungstenite answers pings on read.
                }
                Some(Err(e)) => {
                    tracing::warn!(err = %e, "live channel read error");
                    return ConnEvent::Failed(TransportError::ConnectionClosed);
                }
                None => return ConnEvent::Closed(None),
            }
        }
    }
}

/// Maps a tungstenite connect error to a [`TransportError`].
fn map_connect_error(err: tokio_tungstenite::tungstenite::Error) -> TransportError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => TransportError::Io(io_err),
        WsError::Http(response) => {
            TransportError::Rejected(format!("HTTP status {}", response.status()))
        }
        other => TransportError::Rejected(other.to_string()),
    }
}
