use crate::{InvocationError, TransportError};
use slicewire::protocol::ReplyFrame;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

type ReplyResult = Result<ReplyFrame, InvocationError>;

#[derive(Default)]
struct Entries {
    senders: HashMap<i32, oneshot::Sender<ReplyResult>>,
    closed: bool,
}

/// Request id to waiting caller, shared by every invocation on one
/// connection.
///
/// Whoever removes an entry owns its completion: the reply demultiplexer,
/// a timeout, a cancellation, or the connection closing. Removal happens
/// under the lock, so each entry is completed at most once.
#[derive(Default)]
pub struct PendingReplyTable {
    entries: Mutex<Entries>,
}

impl PendingReplyTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, request_id: i32) -> Result<oneshot::Receiver<ReplyResult>, InvocationError> {
        let mut entries = self.lock();
        if entries.closed {
            return Err(TransportError::Closed.into());
        }
        match entries.senders.entry(request_id) {
            Entry::Occupied(_) => Err(InvocationError::RequestIdInUse(request_id)),
            Entry::Vacant(entry) => {
                let (sender, receiver) = oneshot::channel();
                entry.insert(sender);
                Ok(receiver)
            }
        }
    }

    /// Hands `result` to the caller waiting on `request_id`. Returns `false`
    /// when nobody is waiting any more (timed out, cancelled, or unknown).
    pub fn complete(&self, request_id: i32, result: ReplyResult) -> bool {
        let sender = self.lock().senders.remove(&request_id);
        match sender {
            Some(sender) => {
                // The receiver may be dropped between removal and send; the
                // result is discarded in that case.
                let _ = sender.send(result);
                true
            }
            None => false,
        }
    }

    /// Forgets `request_id`. Returns `true` if the entry was still present,
    /// meaning no reply has been delivered for it.
    pub fn remove(&self, request_id: i32) -> bool {
        self.lock().senders.remove(&request_id).is_some()
    }

    /// Completes every entry with `error()` and refuses new ones.
    pub fn fail_all(&self, error: impl Fn() -> InvocationError) {
        let senders: Vec<_> = {
            let mut entries = self.lock();
            entries.closed = true;
            entries.senders.drain().collect()
        };
        if !senders.is_empty() {
            tracing::debug!("failing {} pending invocations", senders.len());
        }
        for (_, sender) in senders {
            let _ = sender.send(Err(error()));
        }
    }

    pub fn len(&self) -> usize {
        self.lock().senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// The caller's side of one pending-reply entry.
///
/// Dropping it (after a timeout, on cancellation, or when the owning
/// future is dropped) removes the entry, so a reply arriving later is
/// discarded by the demultiplexer.
pub struct PendingReply {
    request_id: i32,
    receiver: oneshot::Receiver<ReplyResult>,
    table: Arc<PendingReplyTable>,
}

impl PendingReply {
    pub fn register(request_id: i32, table: Arc<PendingReplyTable>) -> Result<Self, InvocationError> {
        let receiver = table.insert(request_id)?;
        Ok(Self {
            request_id,
            receiver,
            table,
        })
    }

    pub fn request_id(&self) -> i32 {
        self.request_id
    }

    /// Waits for the reply, giving up after `timeout`.
    pub async fn wait(mut self, timeout: Option<Duration>) -> ReplyResult {
        let received = match timeout {
            None => (&mut self.receiver).await.ok(),
            Some(limit) => match tokio::time::timeout(limit, &mut self.receiver).await {
                Ok(received) => received.ok(),
                Err(_) => {
                    if self.table.remove(self.request_id) {
                        tracing::warn!(request_id = self.request_id, ?limit, "invocation timed out");
                        return Err(InvocationError::Timeout(limit));
                    }
                    // The demultiplexer removed the entry first. It owns the
                    // sender now and either sends or drops it.
                    (&mut self.receiver).await.ok()
                }
            },
        };
        received.unwrap_or(Err(InvocationError::ConnectionLost))
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.table.remove(self.request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slicewire::protocol::Encapsulation;

    fn ok_reply() -> ReplyResult {
        Ok(ReplyFrame::Ok(Encapsulation::empty()))
    }

    #[tokio::test]
    async fn completion_reaches_the_waiter_once() {
        let table = Arc::new(PendingReplyTable::new());
        let pending = PendingReply::register(7, table.clone()).unwrap();
        assert_eq!(table.len(), 1);

        assert!(table.complete(7, ok_reply()));
        assert!(!table.complete(7, ok_reply()));
        assert!(pending.wait(None).await.is_ok());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn timeout_removes_the_entry() {
        let table = Arc::new(PendingReplyTable::new());
        let pending = PendingReply::register(1, table.clone()).unwrap();
        let result = pending.wait(Some(Duration::from_millis(10))).await;
        assert!(matches!(result, Err(InvocationError::Timeout(_))));
        assert!(table.is_empty());
        // A late reply finds nobody waiting.
        assert!(!table.complete(1, ok_reply()));
    }

    #[tokio::test]
    async fn reply_in_flight_at_timeout_still_wins() {
        let table = Arc::new(PendingReplyTable::new());
        let pending = PendingReply::register(1, table.clone()).unwrap();
        // First half of `complete`: the entry is gone but nothing was sent.
        let sender = table.lock().senders.remove(&1).unwrap();

        let waiter = tokio::spawn(pending.wait(Some(Duration::from_millis(5))));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(sender.send(ok_reply()).is_ok());

        let result = waiter.await.unwrap();
        assert!(matches!(result, Ok(ReplyFrame::Ok(_))));
    }

    #[tokio::test]
    async fn dropping_the_waiter_forgets_the_request() {
        let table = Arc::new(PendingReplyTable::new());
        drop(PendingReply::register(3, table.clone()).unwrap());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn fail_all_closes_the_table() {
        let table = Arc::new(PendingReplyTable::new());
        let first = PendingReply::register(1, table.clone()).unwrap();
        let second = PendingReply::register(2, table.clone()).unwrap();
        table.fail_all(|| InvocationError::ConnectionLost);

        assert!(matches!(first.wait(None).await, Err(InvocationError::ConnectionLost)));
        assert!(matches!(second.wait(None).await, Err(InvocationError::ConnectionLost)));
        assert!(matches!(
            PendingReply::register(3, table.clone()),
            Err(InvocationError::Transport(TransportError::Closed))
        ));
    }

    #[test]
    fn duplicate_ids_are_refused() {
        let table = Arc::new(PendingReplyTable::new());
        let _first = PendingReply::register(5, table.clone()).unwrap();
        assert!(matches!(
            PendingReply::register(5, table.clone()),
            Err(InvocationError::RequestIdInUse(5))
        ));
    }
}
