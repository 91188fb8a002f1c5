use crate::TransportError;

/// Connection state reported to state change handlers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RpcTransportState {
    Connected,
    Disconnected,
}

/// The outbound half of a connection.
///
/// Implementations hand complete protocol messages to the network; framing
/// below the message level is their business. Incoming bytes are pushed
/// into [`ClientConnection::read_bytes`](crate::ClientConnection::read_bytes)
/// by whoever owns the receive side.
#[async_trait::async_trait]
pub trait RpcTransport: Send + Sync {
    async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError>;
}
