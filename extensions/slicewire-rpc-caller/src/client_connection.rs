use crate::{
    BatchAction, BatchRequest, BatchRequestInterceptor, InvocationError, PendingReply,
    PendingReplyTable, RpcTransport, TransportError,
};
use slicewire::message::{Message, MessageCodec, MessageStreamDecoder};
use slicewire::protocol::RequestFrame;
use slicewire::stream::{OutputStream, StreamWrite};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct BatchQueue {
    frames: Vec<RequestFrame>,
    size: usize,
}

impl BatchQueue {
    fn take(&mut self) -> Vec<RequestFrame> {
        self.size = 0;
        std::mem::take(&mut self.frames)
    }
}

/// Client-side state of one connection.
///
/// Outgoing requests go through the [`RpcTransport`]; the owner of the
/// receive side feeds incoming bytes to [`read_bytes`](Self::read_bytes),
/// which demultiplexes replies onto the pending-reply table.
pub struct ClientConnection {
    transport: Arc<dyn RpcTransport>,
    endpoint: String,
    pending: Arc<PendingReplyTable>,
    next_request_id: AtomicI32,
    decoder: Mutex<MessageStreamDecoder>,
    batch: Mutex<BatchQueue>,
    batch_interceptor: Option<Arc<dyn BatchRequestInterceptor>>,
    validated: AtomicBool,
    closed: AtomicBool,
}

impl ClientConnection {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            endpoint: String::new(),
            pending: Arc::new(PendingReplyTable::new()),
            next_request_id: AtomicI32::new(1),
            decoder: Mutex::new(MessageStreamDecoder::new()),
            batch: Mutex::new(BatchQueue::default()),
            batch_interceptor: None,
            validated: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Label used in marshaled proxies and log lines.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Consulted by [`queue_batch`](Self::queue_batch) for every batch
    /// oneway request.
    pub fn with_batch_interceptor(mut self, interceptor: Arc<dyn BatchRequestInterceptor>) -> Self {
        self.batch_interceptor = Some(interceptor);
        self
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.decoder = Mutex::new(MessageStreamDecoder::with_max_message_size(max_message_size));
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether the peer has sent its connection validation message.
    pub fn is_validated(&self) -> bool {
        self.validated.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn queued_batch_len(&self) -> usize {
        self.batch_queue().frames.len()
    }

    /// Total encoded size of the queued batch requests.
    pub fn queued_batch_size(&self) -> usize {
        self.batch_queue().size
    }

    fn batch_queue(&self) -> MutexGuard<'_, BatchQueue> {
        self.batch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Next two-way request id. Ids are positive and wrap back to 1; 0 is
    /// reserved for oneway requests.
    pub fn next_request_id(&self) -> i32 {
        let previous = self
            .next_request_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| {
                Some(if id >= i32::MAX { 1 } else { id + 1 })
            });
        match previous {
            Ok(id) | Err(id) => id,
        }
    }

    fn ensure_open(&self) -> Result<(), InvocationError> {
        if self.is_closed() {
            return Err(TransportError::Closed.into());
        }
        Ok(())
    }

    /// Sends a two-way request. The returned [`PendingReply`] is registered
    /// before any byte is written, so a fast reply cannot be missed.
    pub async fn send_request(&self, frame: RequestFrame) -> Result<PendingReply, InvocationError> {
        self.ensure_open()?;
        let request_id = self.next_request_id();
        let pending = PendingReply::register(request_id, self.pending.clone())?;
        let bytes = MessageCodec::encode(&Message::Request { request_id, frame })?;
        tracing::trace!(request_id, endpoint = %self.endpoint, "sending request");
        // On failure the dropped `pending` removes its entry.
        self.transport.send(bytes).await?;
        Ok(pending)
    }

    pub async fn send_oneway(&self, frame: RequestFrame) -> Result<(), InvocationError> {
        self.ensure_open()?;
        let bytes = MessageCodec::encode(&Message::Request {
            request_id: 0,
            frame,
        })?;
        self.transport.send(bytes).await?;
        Ok(())
    }

    /// Queues a batch oneway request until the next
    /// [`flush_batch`](Self::flush_batch), after letting the batch
    /// interceptor (if any) flush the queue first or discard the request.
    pub async fn queue_batch(&self, frame: RequestFrame) -> Result<(), InvocationError> {
        self.ensure_open()?;
        let mut os = OutputStream::new();
        frame.write_to(&mut os).map_err(InvocationError::Marshal)?;
        let size = os.len();

        if let Some(interceptor) = &self.batch_interceptor {
            let (queued_count, queued_size) = {
                let queue = self.batch_queue();
                (queue.frames.len(), queue.size)
            };
            let request = BatchRequest::new(&frame, size);
            match interceptor.intercept(&request, queued_count, queued_size) {
                BatchAction::Enqueue => {}
                BatchAction::FlushThenEnqueue => self.flush_batch().await?,
                BatchAction::Discard => {
                    tracing::debug!(operation = %frame.operation, "batch request discarded by interceptor");
                    return Ok(());
                }
            }
        }

        let mut queue = self.batch_queue();
        queue.frames.push(frame);
        queue.size += size;
        Ok(())
    }

    /// Sends every queued batch request as a single message.
    pub async fn flush_batch(&self) -> Result<(), InvocationError> {
        let frames = self.batch_queue().take();
        if frames.is_empty() {
            return Ok(());
        }
        self.ensure_open()?;
        let count = frames.len();
        let bytes = MessageCodec::encode(&Message::BatchRequest(frames))?;
        tracing::debug!(count, endpoint = %self.endpoint, "flushing batch requests");
        self.transport.send(bytes).await?;
        Ok(())
    }

    /// Feeds received bytes into the connection. Complete replies are
    /// routed to their waiting callers; replies nobody waits for are
    /// dropped.
    pub fn read_bytes(&self, bytes: &[u8]) {
        let (messages, poisoned) = {
            let mut decoder = self.decoder.lock().unwrap_or_else(PoisonError::into_inner);
            let messages: Vec<_> = decoder.read_bytes(bytes).collect();
            (messages, decoder.is_poisoned())
        };

        for message in messages {
            match message {
                Ok(Message::Reply { request_id, reply }) => {
                    if !self.pending.complete(request_id, Ok(reply)) {
                        tracing::debug!(request_id, "discarding reply nobody is waiting for");
                    }
                }
                Ok(Message::ValidateConnection) => {
                    self.validated.store(true, Ordering::Release);
                    tracing::debug!(endpoint = %self.endpoint, "connection validated");
                }
                Ok(Message::CloseConnection) => {
                    tracing::info!(endpoint = %self.endpoint, "peer closed the connection");
                    self.close();
                }
                Ok(other) => {
                    tracing::warn!(kind = ?other.kind(), "ignoring request sent to a client");
                }
                Err(error) => {
                    tracing::warn!(%error, endpoint = %self.endpoint, "malformed message");
                }
            }
        }

        if poisoned {
            self.close();
        }
    }

    /// Marks the connection closed and fails every outstanding two-way
    /// invocation with [`InvocationError::ConnectionLost`]. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let dropped = self.batch_queue().take();
        if !dropped.is_empty() {
            tracing::warn!(count = dropped.len(), "dropping unflushed batch requests");
        }
        tracing::info!(endpoint = %self.endpoint, "connection closed");
        self.pending.fail_all(|| InvocationError::ConnectionLost);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullTransport;

    #[async_trait::async_trait]
    impl RpcTransport for NullTransport {
        async fn send(&self, _bytes: Vec<u8>) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[test]
    fn request_ids_wrap_back_to_one() {
        let connection = ClientConnection::new(Arc::new(NullTransport));
        assert_eq!(connection.next_request_id(), 1);
        assert_eq!(connection.next_request_id(), 2);

        connection.next_request_id.store(i32::MAX, Ordering::Relaxed);
        assert_eq!(connection.next_request_id(), i32::MAX);
        assert_eq!(connection.next_request_id(), 1);
    }

    #[tokio::test]
    async fn closed_connections_refuse_new_requests() {
        let connection = ClientConnection::new(Arc::new(NullTransport));
        connection.close();
        let frame = RequestFrame::new(
            Default::default(),
            "op",
            Default::default(),
            Default::default(),
        );
        assert!(matches!(
            connection.queue_batch(frame.clone()).await,
            Err(InvocationError::Transport(TransportError::Closed))
        ));
        assert!(matches!(
            connection.send_request(frame).await,
            Err(InvocationError::Transport(TransportError::Closed))
        ));
    }
}
