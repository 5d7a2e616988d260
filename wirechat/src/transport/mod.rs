//! Duplex transport abstraction for the live message channel.
//!
//! The connection supervisor owns the transport exclusively; everything
//! above it only ever sees decoded [`Message`] frames. Concrete
//! implementations:
//! - [`ws::WsDialer`]: WebSocket client over `tokio-tungstenite`
//! - [`loopback::LoopbackDialer`]: in-process scripted transport for tests

pub mod loopback;
pub mod ws;

use wirechat_proto::message::Message;

/// Errors that can occur while dialing or reading the transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection has been closed by the remote end.
    #[error("connection closed")]
    ConnectionClosed,

    /// Establishing the connection timed out.
    #[error("connect timed out")]
    Timeout,

    /// The server rejected the connection attempt (bad URL, refused
    /// upgrade, authentication failure at the HTTP layer).
    #[error("connection rejected: {0}")]
    Rejected(String),

    /// An underlying I/O error occurred.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A lifecycle or data event produced by an established connection.
#[derive(Debug)]
pub enum ConnEvent {
    /// An inbound frame decoded to a message.
    Frame(Message),
    /// The remote end closed the connection, with an optional close code.
    Closed(Option<u16>),
    /// The connection failed mid-stream.
    Failed(TransportError),
}

/// An established live connection, read until it dies.
///
/// The live channel is read-only from the client's perspective: sends go
/// through the REST collaborator, the socket only delivers server pushes.
pub trait Connection: Send {
    /// Waits for the next connection event.
    ///
    /// After a `Closed` or `Failed` event the connection is dead and the
    /// caller must not poll it again.
    fn next_event(&mut self) -> impl std::future::Future<Output = ConnEvent> + Send;
}

/// Establishes live connections, one per call.
///
/// The credential is passed per dial because the supervisor re-reads it
/// for every attempt.
pub trait Dialer: Send + Sync + 'static {
    /// The connection type this dialer produces.
    type Conn: Connection + 'static;

    /// Dials the server and performs any handshake.
    fn dial(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Self::Conn, TransportError>> + Send;
}
