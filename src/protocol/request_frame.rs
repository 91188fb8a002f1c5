use crate::protocol::{Encapsulation, OperationMode};
use crate::stream::{
    Context, Identity, InputStream, OptionalFormat, OutputStream, StreamError, StreamRead,
    StreamWrite, TypeKind, WireType,
};

/// Everything a server needs to dispatch one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub identity: Identity,
    /// Empty for the default facet.
    pub facet: String,
    pub operation: String,
    pub mode: OperationMode,
    pub context: Context,
    pub params: Encapsulation,
}

impl RequestFrame {
    pub fn new(
        identity: Identity,
        operation: impl Into<String>,
        mode: OperationMode,
        params: Encapsulation,
    ) -> Self {
        Self {
            identity,
            facet: String::new(),
            operation: operation.into(),
            mode,
            context: Context::new(),
            params,
        }
    }

    pub fn with_facet(mut self, facet: impl Into<String>) -> Self {
        self.facet = facet.into();
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }
}

impl WireType for RequestFrame {
    const OPTIONAL_FORMAT: OptionalFormat = OptionalFormat::FSize;
    // Identity, facet, operation, mode, context, empty encapsulation.
    const MIN_WIRE_SIZE: usize = 2 + 1 + 1 + 1 + 1 + 6;

    fn type_kind() -> TypeKind {
        TypeKind::Struct(vec![
            Identity::type_kind(),
            TypeKind::Sequence(Box::new(TypeKind::String)),
            TypeKind::String,
            TypeKind::Byte,
            Context::type_kind(),
            Encapsulation::type_kind(),
        ])
    }
}

impl StreamWrite for RequestFrame {
    fn write_to(&self, os: &mut OutputStream) -> Result<(), StreamError> {
        self.identity.write_to(os)?;
        os.write_facet(&self.facet)?;
        os.write_string(&self.operation)?;
        os.write_byte(self.mode.into());
        self.context.write_to(os)?;
        self.params.write_to(os)
    }
}

impl StreamRead for RequestFrame {
    fn read_from(is: &mut InputStream<'_>) -> Result<Self, StreamError> {
        let identity = Identity::read_from(is)?;
        let facet = is.read_facet()?;
        let operation = is.read_string()?;
        let mode = is.read_byte()?;
        let mode = OperationMode::try_from(mode).map_err(|_| StreamError::InvalidDiscriminant {
            kind: "operation mode",
            value: mode,
        })?;
        let context = Context::read_from(is)?;
        let params = Encapsulation::read_from(is)?;
        Ok(Self {
            identity,
            facet,
            operation,
            mode,
            context,
            params,
        })
    }
}
