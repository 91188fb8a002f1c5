use slicewire::protocol::RequestFrame;

/// A batch oneway request on its way into a connection's batch queue.
pub struct BatchRequest<'a> {
    frame: &'a RequestFrame,
    size: usize,
}

impl<'a> BatchRequest<'a> {
    pub(crate) fn new(frame: &'a RequestFrame, size: usize) -> Self {
        Self { frame, size }
    }

    pub fn frame(&self) -> &RequestFrame {
        self.frame
    }

    pub fn operation(&self) -> &str {
        &self.frame.operation
    }

    /// Encoded size of the request within a batch message.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// What happens to an intercepted batch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    Enqueue,
    /// Sends the requests queued so far, then queues this one.
    FlushThenEnqueue,
    Discard,
}

/// Sees every batch oneway request before it is queued, together with the
/// number and total encoded size of the requests already waiting.
pub trait BatchRequestInterceptor: Send + Sync {
    fn intercept(
        &self,
        request: &BatchRequest<'_>,
        queued_count: usize,
        queued_size: usize,
    ) -> BatchAction;
}
