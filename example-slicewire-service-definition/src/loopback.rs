//! An in-memory transport that connects a [`ClientConnection`] straight to
//! an [`ObjectAdapter`], for exercising both pipelines without sockets.

use futures::future::join_all;
use slicewire::message::{Message, MessageCodec};
use slicewire::protocol::RequestFrame;
use slicewire_rpc_caller::{ClientConnection, RpcTransport, TransportError};
use slicewire_rpc_endpoint::ObjectAdapter;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

pub struct LoopbackTransport {
    adapter: Arc<ObjectAdapter>,
    connection: OnceLock<Weak<ClientConnection>>,
    crash_after_send: AtomicBool,
    sent: AtomicUsize,
    requests: Mutex<Vec<RequestFrame>>,
}

impl LoopbackTransport {
    /// Creates a connection whose requests are dispatched by `adapter`. The
    /// connection is validated before it is returned.
    pub fn connect(
        adapter: Arc<ObjectAdapter>,
        endpoint: &str,
    ) -> (Arc<LoopbackTransport>, Arc<ClientConnection>) {
        let transport = Arc::new(LoopbackTransport {
            adapter,
            connection: OnceLock::new(),
            crash_after_send: AtomicBool::new(false),
            sent: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        });
        let connection = Arc::new(ClientConnection::new(transport.clone()).with_endpoint(endpoint));
        let _ = transport.connection.set(Arc::downgrade(&connection));
        if let Ok(validate) = MessageCodec::encode(&Message::ValidateConnection) {
            connection.read_bytes(&validate);
        }
        (transport, connection)
    }

    /// When set, the next request is accepted and then the connection
    /// drops without a reply, as if the server crashed mid-call.
    pub fn set_crash_after_send(&self, crash: bool) {
        self.crash_after_send.store(crash, Ordering::SeqCst);
    }

    /// Messages handed to the transport so far.
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    /// Request frames received so far, batched ones included, exactly as
    /// they were decoded off the wire.
    pub fn requests(&self) -> Vec<RequestFrame> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn connection(&self) -> Option<Arc<ClientConnection>> {
        self.connection.get().and_then(Weak::upgrade)
    }
}

#[async_trait::async_trait]
impl RpcTransport for LoopbackTransport {
    async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        let message =
            MessageCodec::decode(&bytes).map_err(|error| TransportError::Send(error.to_string()))?;
        self.sent.fetch_add(1, Ordering::SeqCst);
        {
            let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
            match &message {
                Message::Request { frame, .. } => requests.push(frame.clone()),
                Message::BatchRequest(frames) => requests.extend(frames.iter().cloned()),
                _ => {}
            }
        }

        if self.crash_after_send.swap(false, Ordering::SeqCst) {
            if let Some(connection) = self.connection() {
                tokio::spawn(async move { connection.close() });
            }
            return Ok(());
        }

        let adapter = self.adapter.clone();
        let connection = self.connection.get().cloned().unwrap_or_default();
        // Dispatch off the caller's task so slow servants do not block it.
        tokio::spawn(async move {
            let replies: Vec<Vec<u8>> = match message {
                Message::Request { request_id, frame } => {
                    adapter.dispatch(request_id, frame).await.into_iter().collect()
                }
                Message::BatchRequest(frames) => {
                    join_all(frames.into_iter().map(|frame| adapter.dispatch(0, frame))).await;
                    Vec::new()
                }
                _ => Vec::new(),
            };
            if let Some(connection) = connection.upgrade() {
                for reply in replies {
                    connection.read_bytes(&reply);
                }
            }
        });
        Ok(())
    }
}
