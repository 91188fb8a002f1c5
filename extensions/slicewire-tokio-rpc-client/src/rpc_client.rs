use crate::WsTransport;
use futures_util::{SinkExt, StreamExt};
use slicewire::stream::Identity;
use slicewire_rpc_caller::{ClientConnection, Proxy, RpcTransportState};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, protocol::Message as WsMessage};
use tokio_tungstenite::connect_async;

/// How long [`RpcClient::new`] waits for the server's validation message.
pub const VALIDATION_TIMEOUT: Duration = Duration::from_secs(10);

pub type RpcTransportStateChangeHandler = Box<dyn Fn(RpcTransportState) + Send + Sync>;

struct TransportStateNotifier {
    connected: AtomicBool,
    handler: Mutex<Option<RpcTransportStateChangeHandler>>,
}

impl TransportStateNotifier {
    fn set_handler(&self, handler: RpcTransportStateChangeHandler) {
        let mut slot = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        if self.connected.load(Ordering::SeqCst) {
            handler(RpcTransportState::Connected);
        }
        *slot = Some(handler);
    }

    /// Reports the disconnect at most once.
    fn disconnected(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let slot = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(handler) = slot.as_ref() {
                handler(RpcTransportState::Disconnected);
            }
        }
    }
}

/// A WebSocket connection to a slicewire server.
///
/// Proxies created with [`RpcClient::proxy`] invoke over this connection.
/// When the socket ends, every outstanding call fails with a connection
/// loss.
pub struct RpcClient {
    connection: Arc<ClientConnection>,
    state: Arc<TransportStateNotifier>,
    task_handles: Vec<JoinHandle<()>>,
}

impl RpcClient {
    /// Connects to `ws://{host}:{port}/ws` and waits until the server
    /// validates the connection.
    pub async fn new(host: &str, port: u16) -> io::Result<RpcClient> {
        let websocket_url = format!("ws://{host}:{port}/ws");
        let (ws_stream, _) = connect_async(websocket_url.as_str())
            .await
            .map_err(into_io_error)?;
        let (mut sender, mut receiver) = ws_stream.split();

        let (tx, mut rx) = unbounded_channel::<WsMessage>();
        let connection = Arc::new(
            ClientConnection::new(Arc::new(WsTransport::new(tx.clone())))
                .with_endpoint(websocket_url.clone()),
        );

        // Send loop
        let send_handle = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if sender.send(msg).await.is_err() {
                    break;
                }
            }
        });

        if let Err(error) = Self::await_validation(&connection, &mut receiver).await {
            send_handle.abort();
            return Err(error);
        }
        tracing::info!(endpoint = %websocket_url, "connection validated");

        let state = Arc::new(TransportStateNotifier {
            connected: AtomicBool::new(true),
            handler: Mutex::new(None),
        });

        // Receive loop
        let receive_handle = tokio::spawn({
            let connection = connection.clone();
            let state = state.clone();
            async move {
                while let Some(msg) = receiver.next().await {
                    match msg {
                        Ok(WsMessage::Binary(bytes)) => {
                            connection.read_bytes(&bytes);
                            if connection.is_closed() {
                                break;
                            }
                        }
                        Ok(WsMessage::Close(_)) => break,
                        Ok(_) => {}
                        Err(error) => {
                            tracing::error!(%error, "websocket receive failed");
                            break;
                        }
                    }
                }
                tracing::info!(endpoint = connection.endpoint(), "connection closed");
                connection.close();
                state.disconnected();
                let _ = tx.send(WsMessage::Close(None));
            }
        });

        Ok(RpcClient {
            connection,
            state,
            task_handles: vec![receive_handle, send_handle],
        })
    }

    async fn await_validation<S>(connection: &ClientConnection, receiver: &mut S) -> io::Result<()>
    where
        S: futures_util::Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
    {
        let wait = async {
            while let Some(msg) = receiver.next().await {
                if let WsMessage::Binary(bytes) = msg.map_err(into_io_error)? {
                    connection.read_bytes(&bytes);
                    if connection.is_validated() {
                        return Ok(());
                    }
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "server did not validate the connection",
                    ));
                }
            }
            Err(io::Error::from(io::ErrorKind::UnexpectedEof))
        };
        timeout(VALIDATION_TIMEOUT, wait)
            .await
            .map_err(|_| io::Error::from(io::ErrorKind::TimedOut))?
    }

    /// Registers a callback for transport state changes. If the client is
    /// connected, the callback immediately receives `Connected`.
    pub fn set_state_change_handler(
        &self,
        handler: impl Fn(RpcTransportState) + Send + Sync + 'static,
    ) {
        self.state.set_handler(Box::new(handler));
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    pub fn connection(&self) -> Arc<ClientConnection> {
        self.connection.clone()
    }

    /// A two-way proxy for `identity` on this connection.
    pub fn proxy(&self, identity: Identity) -> Proxy {
        Proxy::new(identity, self.connection.clone())
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        for handle in &self.task_handles {
            handle.abort();
        }
        self.connection.close();
        self.state.disconnected();
    }
}

fn into_io_error(error: tungstenite::Error) -> io::Error {
    match error {
        tungstenite::Error::Io(error) => error,
        other => io::Error::other(other),
    }
}
