//! Note: This `RpcServer` does not authenticate or authorize its peers. It
//! suits trusted, internal networks. Anything that owns an [`ObjectAdapter`]
//! can serve requests; this is one way to do so over WebSockets using axum.

use crate::ServerConfig;
use axum::{
    Router,
    extract::ConnectInfo,
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use slicewire::message::{Message, MessageCodec, MessageStreamDecoder};
use slicewire::protocol::RequestFrame;
use slicewire_rpc_endpoint::{EndpointError, ObjectAdapter};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{
    net::{TcpListener, ToSocketAddrs},
    sync::mpsc,
    time::{Instant, MissedTickBehavior, sleep_until},
};

/// Name of the adapter created by [`RpcServer::new`].
pub const DEFAULT_ADAPTER_NAME: &str = "slicewire";

/// Serves an [`ObjectAdapter`] to WebSocket clients on `/ws`.
pub struct RpcServer {
    adapter: Arc<ObjectAdapter>,
    config: ServerConfig,
}

impl Default for RpcServer {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let adapter =
            ObjectAdapter::new(DEFAULT_ADAPTER_NAME).with_stream_config(config.stream_config);
        Self::from_adapter(adapter, config)
    }

    /// Serves an adapter the caller configured (for instance with a type
    /// registry for class parameters).
    pub fn from_adapter(adapter: ObjectAdapter, config: ServerConfig) -> Self {
        RpcServer {
            adapter: Arc::new(adapter),
            config,
        }
    }

    /// The adapter servants are registered on.
    pub fn adapter(&self) -> Arc<ObjectAdapter> {
        self.adapter.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds to an address and serves until the listener fails.
    pub async fn serve<A: ToSocketAddrs>(self, addr: A) -> Result<SocketAddr, axum::BoxError> {
        let listener = TcpListener::bind(addr).await?;
        let server = Arc::new(self);
        server.serve_with_listener(listener).await
    }

    /// Convenience wrapper around [`RpcServer::serve`]; `host` may be an IP
    /// address or a hostname.
    pub async fn serve_on(self, host: &str, port: u16) -> Result<SocketAddr, axum::BoxError> {
        let addr = format!("{host}:{port}");
        self.serve(addr).await
    }

    /// Serves on a pre-bound listener, e.g. one bound to port 0.
    pub async fn serve_with_listener(
        self: Arc<Self>,
        listener: TcpListener,
    ) -> Result<SocketAddr, axum::BoxError> {
        let address = listener.local_addr()?;
        let app = Router::new().route(
            "/ws",
            get({
                let server = self.clone();
                move |ws, conn| Self::ws_handler(ws, conn, server)
            }),
        );
        tracing::info!(%address, adapter = self.adapter.name(), "server running");
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        Ok(address)
    }

    async fn ws_handler(
        ws: WebSocketUpgrade,
        ConnectInfo(addr): ConnectInfo<SocketAddr>,
        server: Arc<RpcServer>,
    ) -> impl IntoResponse {
        tracing::info!(%addr, "client connected");
        ws.on_upgrade(move |socket| server.handle_socket(socket, addr))
    }

    async fn handle_socket(self: Arc<Self>, socket: WebSocket, addr: SocketAddr) {
        if self.adapter.is_deactivated() {
            tracing::info!(%addr, adapter = self.adapter.name(), "refusing client of a deactivated adapter");
            return;
        }
        let (sender, receiver) = socket.split();
        let (tx, rx) = mpsc::unbounded_channel::<WsMessage>();

        // The client waits for this before sending requests.
        match MessageCodec::encode(&Message::ValidateConnection) {
            Ok(bytes) => {
                let _ = tx.send(WsMessage::Binary(Bytes::from(bytes)));
            }
            Err(error) => {
                tracing::error!(%error, %addr, "failed to encode connection validation");
                return;
            }
        }

        tokio::spawn(Self::sender_task(sender, rx));
        tokio::spawn(Self::receiver_task(
            self.adapter.clone(),
            self.config,
            receiver,
            tx,
            addr,
        ));
    }

    /// Forwards replies and pings to the client.
    async fn sender_task(
        mut sender: SplitSink<WebSocket, WsMessage>,
        mut rx: mpsc::UnboundedReceiver<WsMessage>,
    ) {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    }

    /// Runs one request off the receive loop, so a slow servant holds up
    /// neither heartbeats nor later requests on the same connection.
    /// Replies go out in completion order.
    fn spawn_dispatch(
        adapter: Arc<ObjectAdapter>,
        tx: mpsc::UnboundedSender<WsMessage>,
        request_id: i32,
        frame: RequestFrame,
    ) {
        tokio::spawn(async move {
            if let Some(reply) = adapter.dispatch(request_id, frame).await {
                let _ = tx.send(WsMessage::Binary(Bytes::from(reply)));
            }
        });
    }

    /// Reads requests from one client, pinging it when idle and dropping it
    /// once it stays silent past the client timeout.
    async fn receiver_task(
        adapter: Arc<ObjectAdapter>,
        config: ServerConfig,
        mut receiver: SplitStream<WebSocket>,
        tx: mpsc::UnboundedSender<WsMessage>,
        addr: SocketAddr,
    ) {
        let mut decoder =
            MessageStreamDecoder::with_max_message_size(config.stream_config.max_message_size);
        let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        heartbeat.tick().await;
        let mut idle_deadline = Instant::now() + config.client_timeout;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if tx.send(WsMessage::Ping(Bytes::new())).is_err() {
                        tracing::info!(%addr, "client disconnected (failed to send ping)");
                        break;
                    }
                }

                _ = sleep_until(idle_deadline) => {
                    tracing::warn!(%addr, "client timed out, closing connection");
                    break;
                }

                next = receiver.next() => {
                    idle_deadline = Instant::now() + config.client_timeout;
                    match next {
                        Some(Ok(WsMessage::Binary(bytes))) => {
                            let (requests, status) = adapter.decode_requests(&mut decoder, &bytes);
                            for (request_id, frame) in requests {
                                Self::spawn_dispatch(adapter.clone(), tx.clone(), request_id, frame);
                            }
                            match status {
                                Ok(()) => {}
                                Err(EndpointError::ClosedByPeer) => {
                                    tracing::info!(%addr, "client closed the connection");
                                    break;
                                }
                                Err(EndpointError::Deactivated(_)) => {
                                    tracing::info!(%addr, "adapter deactivated, closing connection");
                                    break;
                                }
                                Err(error) => {
                                    tracing::error!(%error, %addr, "dropping client");
                                    break;
                                }
                            }
                        }
                        Some(Ok(WsMessage::Pong(_))) => {
                            tracing::trace!(%addr, "received pong");
                        }
                        Some(Ok(WsMessage::Close(_))) => {
                            tracing::info!(%addr, "client initiated close");
                            break;
                        }
                        Some(Ok(_)) => {}
                        None | Some(Err(_)) => {
                            tracing::info!(%addr, "client disconnected");
                            break;
                        }
                    }
                }
            }
        }

        let _ = tx.send(WsMessage::Close(None));
        tracing::info!(%addr, "terminated connection");
    }
}
