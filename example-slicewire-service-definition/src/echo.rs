use slicewire::protocol::{
    ICE_ID, ICE_IDS, ICE_IS_A, ICE_PING, OBJECT_TYPE_ID, OperationInfo, OperationMode,
};
use slicewire::slicing::{ValueGraph, ValueId};
use slicewire::stream::{InputStream, OutputStream, StreamError};
use slicewire_rpc_caller::{InvocationError, InvocationHandle, Proxy};
use slicewire_rpc_endpoint::{Current, DispatchError, DispatchOutput, IncomingRequest, Servant};
use std::sync::Arc;

pub const ECHO_TYPE_ID: &str = "::Test::Echo";

pub const ECHO_ADD: OperationInfo = OperationInfo::new("add", OperationMode::Idempotent);
pub const ECHO_DELAY: OperationInfo = OperationInfo::new("delay", OperationMode::Idempotent);
pub const ECHO_ECHO_BYTES: OperationInfo = OperationInfo::new("echoBytes", OperationMode::Normal);
pub const ECHO_GET_CYCLE: OperationInfo =
    OperationInfo::new("getCycle", OperationMode::Normal).with_classes();
pub const ECHO_OP_OPTIONAL: OperationInfo =
    OperationInfo::new("opOptional", OperationMode::Normal);
pub const ECHO_PASS_VALUE: OperationInfo =
    OperationInfo::new("passValue", OperationMode::Normal).with_classes();
pub const ECHO_RAISE: OperationInfo =
    OperationInfo::new("raise", OperationMode::Normal).with_throws(&["::Test::BaseError"]);

/// Dispatch table of `::Test::Echo`, sorted by name.
pub const ECHO_OPERATIONS: [OperationInfo; 11] = [
    ECHO_ADD,
    ECHO_DELAY,
    ECHO_ECHO_BYTES,
    ECHO_GET_CYCLE,
    ICE_ID,
    ICE_IDS,
    ICE_IS_A,
    ICE_PING,
    ECHO_OP_OPTIONAL,
    ECHO_PASS_VALUE,
    ECHO_RAISE,
];

/// A class-typed parameter or result: the instances plus the reference
/// that was marshaled.
#[derive(Debug, Default)]
pub struct Graph {
    pub graph: ValueGraph,
    pub root: Option<ValueId>,
}

impl Graph {
    pub fn new(graph: ValueGraph, root: Option<ValueId>) -> Self {
        Self { graph, root }
    }

    fn write(&self, os: &mut OutputStream) -> Result<(), StreamError> {
        os.write_value(self.root)?;
        os.write_pending_values(&self.graph)
    }

    fn read(is: &mut InputStream<'_>) -> Result<Self, StreamError> {
        let root = is.read_value()?;
        is.read_pending_values()?;
        Ok(Self {
            graph: is.take_graph(),
            root,
        })
    }
}

/// Server-side contract of `::Test::Echo`.
#[async_trait::async_trait]
pub trait Echo: Send + Sync + 'static {
    async fn add(&self, a: i32, b: i32, current: &Current) -> Result<i32, DispatchError>;

    async fn delay(&self, millis: i32, current: &Current) -> Result<(), DispatchError>;

    async fn echo_bytes(&self, bytes: Vec<u8>, current: &Current)
    -> Result<Vec<u8>, DispatchError>;

    /// Returns a root node whose chain leads back to itself.
    async fn get_cycle(&self, current: &Current) -> Result<Graph, DispatchError>;

    /// `string opOptional(int x, optional(1) string y, out optional(2) int len)`
    async fn op_optional(
        &self,
        x: i32,
        y: Option<String>,
        current: &Current,
    ) -> Result<(String, Option<i32>), DispatchError>;

    async fn pass_value(&self, value: Graph, current: &Current) -> Result<Graph, DispatchError>;

    /// Throws `BaseError`.
    async fn raise(&self, kind: i32, current: &Current) -> Result<(), DispatchError>;
}

/// Skeleton routing requests for `::Test::Echo` to an [`Echo`] impl.
pub struct EchoServant<T: Echo> {
    servant: Arc<T>,
}

impl<T: Echo> EchoServant<T> {
    pub fn new(servant: Arc<T>) -> Self {
        Self { servant }
    }
}

#[async_trait::async_trait]
impl<T: Echo> Servant for EchoServant<T> {
    fn type_ids(&self) -> &[&'static str] {
        &[ECHO_TYPE_ID, OBJECT_TYPE_ID]
    }

    fn operations(&self) -> &[OperationInfo] {
        &ECHO_OPERATIONS
    }

    async fn dispatch(&self, request: IncomingRequest) -> Result<DispatchOutput, DispatchError> {
        let current = &request.current;
        match current.operation.as_str() {
            "add" => {
                let (a, b) = request.read_params(|is| Ok((is.read_int()?, is.read_int()?)))?;
                let sum = self.servant.add(a, b, current).await?;
                Ok(DispatchOutput::buffered(|os| {
                    os.write_int(sum);
                    Ok(())
                })?)
            }
            "delay" => {
                let millis = request.read_params(|is| is.read_int())?;
                self.servant.delay(millis, current).await?;
                Ok(DispatchOutput::empty())
            }
            "echoBytes" => {
                let bytes = request.read_params(|is| is.read_byte_seq())?;
                let bytes = self.servant.echo_bytes(bytes, current).await?;
                // Large results go straight into the reply message.
                Ok(DispatchOutput::marshaled(move |os| os.write_byte_seq(&bytes)))
            }
            "getCycle" => {
                request.read_empty_params()?;
                let cycle = self.servant.get_cycle(current).await?;
                Ok(DispatchOutput::buffered(|os| cycle.write(os))?)
            }
            "opOptional" => {
                let (x, y) = request.read_params(|is| {
                    let x = is.read_int()?;
                    let y = is.read_optional_value::<String>(1)?;
                    Ok((x, y))
                })?;
                let (ret, len) = self.servant.op_optional(x, y, current).await?;
                Ok(DispatchOutput::marshaled(move |os| {
                    os.write_string(&ret)?;
                    os.write_optional_value(2, len.as_ref())
                }))
            }
            "passValue" => {
                let value = request.read_params(Graph::read)?;
                let value = self.servant.pass_value(value, current).await?;
                Ok(DispatchOutput::buffered(|os| value.write(os))?)
            }
            "raise" => {
                let kind = request.read_params(|is| is.read_int())?;
                self.servant.raise(kind, current).await?;
                Ok(DispatchOutput::empty())
            }
            _ => Err(DispatchError::OperationNotExist),
        }
    }
}

/// Typed proxy for `::Test::Echo`.
#[derive(Clone)]
pub struct EchoPrx {
    proxy: Proxy,
}

impl From<Proxy> for EchoPrx {
    fn from(proxy: Proxy) -> Self {
        Self { proxy }
    }
}

impl EchoPrx {
    /// Asks the target whether it implements `::Test::Echo`.
    pub async fn checked_cast(proxy: Proxy) -> Result<Option<Self>, InvocationError> {
        Ok(proxy.ice_is_a(ECHO_TYPE_ID).await?.then(|| Self::from(proxy)))
    }

    pub fn proxy(&self) -> &Proxy {
        &self.proxy
    }

    pub fn add(&self, a: i32, b: i32) -> InvocationHandle<i32> {
        self.proxy.invoke_operation(
            &ECHO_ADD,
            |os| {
                os.write_int(a);
                os.write_int(b);
                Ok(())
            },
            |is| is.read_int(),
        )
    }

    pub fn delay(&self, millis: i32) -> InvocationHandle<()> {
        self.proxy.invoke_operation(
            &ECHO_DELAY,
            |os| {
                os.write_int(millis);
                Ok(())
            },
            |_| Ok(()),
        )
    }

    pub fn echo_bytes(&self, bytes: &[u8]) -> InvocationHandle<Vec<u8>> {
        self.proxy.invoke_operation(
            &ECHO_ECHO_BYTES,
            |os| os.write_byte_seq(bytes),
            |is| is.read_byte_seq(),
        )
    }

    pub fn get_cycle(&self) -> InvocationHandle<Graph> {
        self.proxy
            .invoke_operation(&ECHO_GET_CYCLE, |_| Ok(()), Graph::read)
    }

    pub fn op_optional(&self, x: i32, y: Option<&str>) -> InvocationHandle<(String, Option<i32>)> {
        self.proxy.invoke_operation(
            &ECHO_OP_OPTIONAL,
            |os| {
                os.write_int(x);
                os.write_optional_value(1, y)
            },
            |is| {
                let ret = is.read_string()?;
                let len = is.read_optional_value::<i32>(2)?;
                Ok((ret, len))
            },
        )
    }

    pub fn pass_value(&self, value: &Graph) -> InvocationHandle<Graph> {
        self.proxy
            .invoke_operation(&ECHO_PASS_VALUE, |os| value.write(os), Graph::read)
    }

    pub fn raise(&self, kind: i32) -> InvocationHandle<()> {
        self.proxy.invoke_operation(
            &ECHO_RAISE,
            |os| {
                os.write_int(kind);
                Ok(())
            },
            |_| Ok(()),
        )
    }
}
