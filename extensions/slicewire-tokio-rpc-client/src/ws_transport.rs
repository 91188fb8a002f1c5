use bytes::Bytes;
use slicewire_rpc_caller::{RpcTransport, TransportError};
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

/// Hands encoded messages to the socket's send loop.
pub struct WsTransport {
    tx: UnboundedSender<WsMessage>,
}

impl WsTransport {
    pub fn new(tx: UnboundedSender<WsMessage>) -> Self {
        Self { tx }
    }
}

#[async_trait::async_trait]
impl RpcTransport for WsTransport {
    async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.tx
            .send(WsMessage::Binary(Bytes::from(bytes)))
            .map_err(|_| TransportError::Closed)
    }
}
