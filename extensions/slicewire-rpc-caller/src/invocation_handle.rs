use crate::InvocationError;
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll};
use tokio::sync::Notify;

const PENDING: u8 = 0;
const FINISHED: u8 = 1;
const CANCELLED: u8 = 2;

#[derive(Debug, Default)]
struct CancelState {
    state: AtomicU8,
    notify: Notify,
}

impl CancelState {
    fn settle(&self, outcome: u8) -> bool {
        self.state
            .compare_exchange(PENDING, outcome, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    async fn cancelled(&self) {
        while self.state.load(Ordering::Acquire) != CANCELLED {
            self.notify.notified().await;
        }
    }
}

/// Cancels the invocation it was taken from. Cheap to clone and safe to
/// use from any thread.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    /// Returns `true` if the cancellation won; `false` if the invocation
    /// had already produced its result (or was already cancelled).
    pub fn cancel(&self) -> bool {
        let won = self.state.settle(CANCELLED);
        if won {
            self.state.notify.notify_one();
        }
        won
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.state.load(Ordering::Acquire) == CANCELLED
    }
}

/// A pending invocation.
///
/// Await it for the result. [`cancel`](Self::cancel) races the reply: the
/// first of the two to settle decides the outcome and the other becomes a
/// no-op. Cancelling drops the in-flight work, which removes the request
/// from its connection's pending-reply table.
pub struct InvocationHandle<T> {
    future: BoxFuture<'static, Result<T, InvocationError>>,
    cancel: CancelHandle,
}

impl<T: Send + 'static> InvocationHandle<T> {
    pub fn new<F>(work: F) -> Self
    where
        F: Future<Output = Result<T, InvocationError>> + Send + 'static,
    {
        let state = Arc::new(CancelState::default());
        let future = {
            let state = state.clone();
            async move {
                tokio::select! {
                    biased;
                    _ = state.cancelled() => Err(InvocationError::Cancelled),
                    result = work => {
                        if state.settle(FINISHED) {
                            result
                        } else {
                            Err(InvocationError::Cancelled)
                        }
                    }
                }
            }
            .boxed()
        };
        Self {
            future,
            cancel: CancelHandle { state },
        }
    }

    /// A handle that is already settled.
    pub fn ready(result: Result<T, InvocationError>) -> Self {
        Self::new(async move { result })
    }

    /// Post-processes the result, sharing this handle's cancellation.
    pub fn and_then<U, F>(self, f: F) -> InvocationHandle<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U, InvocationError> + Send + 'static,
    {
        let future = self.future;
        InvocationHandle {
            future: async move { f(future.await?) }.boxed(),
            cancel: self.cancel,
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    /// Blocks the current thread until the invocation settles.
    ///
    /// Must be called from outside the runtime that `runtime` refers to.
    pub fn wait_blocking(self, runtime: &tokio::runtime::Handle) -> Result<T, InvocationError> {
        runtime.block_on(self)
    }
}

impl<T> Future for InvocationHandle<T> {
    type Output = Result<T, InvocationError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().future.as_mut().poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_before_completion_wins() {
        let handle = InvocationHandle::new(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1)
        });
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(matches!(handle.await, Err(InvocationError::Cancelled)));
    }

    #[tokio::test]
    async fn cancel_after_completion_is_a_no_op() {
        let handle = InvocationHandle::ready(Ok(5));
        let canceller = handle.cancel_handle();
        assert_eq!(handle.await.unwrap(), 5);
        assert!(!canceller.cancel());
        assert!(!canceller.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_from_another_task_wakes_the_waiter() {
        let handle = InvocationHandle::<()>::new(futures::future::pending());
        let canceller = handle.cancel_handle();
        let waiter = tokio::spawn(handle);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(canceller.cancel());
        assert!(matches!(waiter.await.unwrap(), Err(InvocationError::Cancelled)));
    }

    #[tokio::test]
    async fn and_then_keeps_the_cancel_handle() {
        let handle = InvocationHandle::new(futures::future::pending::<Result<u8, _>>())
            .and_then(|value| Ok(value.to_string()));
        assert!(handle.cancel());
        assert!(matches!(handle.await, Err(InvocationError::Cancelled)));
    }
}
