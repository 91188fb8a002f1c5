use crate::{BaseError, DerivedError, Echo, Graph, Node, UndeclaredError};
use slicewire::slicing::ValueGraph;
use slicewire_rpc_endpoint::{Current, DispatchError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Reference implementation of [`Echo`] used by the tests and the demo.
#[derive(Debug, Default)]
pub struct EchoImpl {
    calls: AtomicUsize,
    optional_args: Mutex<Vec<(i32, Option<String>)>>,
}

impl EchoImpl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations dispatched to this servant so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Arguments `opOptional` received, in arrival order.
    pub fn optional_args(&self) -> Vec<(i32, Option<String>)> {
        self.optional_args
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, current: &Current) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(operation = %current.operation, identity = %current.identity, "echo call");
    }
}

#[async_trait::async_trait]
impl Echo for EchoImpl {
    async fn add(&self, a: i32, b: i32, current: &Current) -> Result<i32, DispatchError> {
        self.record(current);
        Ok(a.wrapping_add(b))
    }

    async fn delay(&self, millis: i32, current: &Current) -> Result<(), DispatchError> {
        self.record(current);
        let millis = u64::try_from(millis)
            .map_err(|_| DispatchError::Local(format!("negative delay {millis}")))?;
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(())
    }

    async fn echo_bytes(
        &self,
        bytes: Vec<u8>,
        current: &Current,
    ) -> Result<Vec<u8>, DispatchError> {
        self.record(current);
        Ok(bytes)
    }

    async fn get_cycle(&self, current: &Current) -> Result<Graph, DispatchError> {
        self.record(current);
        let mut graph = ValueGraph::new();
        let first = graph.insert(Node {
            value: 1,
            next: None,
        });
        let second = graph.insert(Node {
            value: 2,
            next: Some(first),
        });
        if let Some(node) = graph.downcast_mut::<Node>(first) {
            node.next = Some(second);
        }
        Ok(Graph::new(graph, Some(first)))
    }

    async fn op_optional(
        &self,
        x: i32,
        y: Option<String>,
        current: &Current,
    ) -> Result<(String, Option<i32>), DispatchError> {
        self.record(current);
        self.optional_args
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((x, y.clone()));
        let len = y.as_ref().and_then(|y| i32::try_from(y.len()).ok());
        let y = y.unwrap_or_else(|| "default".to_string());
        Ok((format!("{x}:{y}"), len))
    }

    async fn pass_value(&self, value: Graph, current: &Current) -> Result<Graph, DispatchError> {
        self.record(current);
        Ok(value)
    }

    async fn raise(&self, kind: i32, current: &Current) -> Result<(), DispatchError> {
        self.record(current);
        match kind {
            0 => Err(DispatchError::user(BaseError {
                reason: "base".into(),
            })),
            1 => Err(DispatchError::user(DerivedError {
                reason: "derived".into(),
                code: 42,
            })),
            2 => Err(DispatchError::user(UndeclaredError {
                detail: "internal detail".into(),
            })),
            3 => panic!("echo servant asked to panic"),
            _ => Ok(()),
        }
    }
}
