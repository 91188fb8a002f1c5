use crate::stream::{
    Identity, InputStream, OptionalFormat, OutputStream, StreamError, StreamRead, StreamWrite,
    TypeKind, WireType,
};

/// Marshaled form of an object reference.
///
/// A proxy whose identity name is empty is the null proxy; on the wire it
/// is just the empty identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyRef {
    pub identity: Identity,
    pub facet: String,
    /// 0 two-way, 1 oneway, 2 batch oneway.
    pub invocation_mode: u8,
    pub secure: bool,
    pub endpoints: Vec<String>,
}

impl ProxyRef {
    pub fn new(identity: Identity, endpoints: Vec<String>) -> Self {
        Self {
            identity,
            facet: String::new(),
            invocation_mode: 0,
            secure: false,
            endpoints,
        }
    }
}

impl OutputStream {
    pub fn write_proxy(&mut self, proxy: Option<&ProxyRef>) -> Result<(), StreamError> {
        let Some(proxy) = proxy else {
            return Identity::default().write_to(self);
        };
        if proxy.identity.name.is_empty() {
            return Err(StreamError::Marshal(
                "proxy identity must have a non-empty name".into(),
            ));
        }
        proxy.identity.write_to(self)?;
        self.write_facet(&proxy.facet)?;
        self.write_byte(proxy.invocation_mode);
        self.write_bool(proxy.secure);
        proxy.endpoints.write_to(self)
    }
}

impl InputStream<'_> {
    pub fn read_proxy(&mut self) -> Result<Option<ProxyRef>, StreamError> {
        let identity = Identity::read_from(self)?;
        if identity.name.is_empty() {
            return Ok(None);
        }
        let facet = self.read_facet()?;
        let invocation_mode = self.read_byte()?;
        if invocation_mode > 2 {
            return Err(StreamError::InvalidDiscriminant {
                kind: "proxy invocation mode",
                value: invocation_mode,
            });
        }
        let secure = self.read_bool()?;
        let endpoints = Vec::<String>::read_from(self)?;
        Ok(Some(ProxyRef {
            identity,
            facet,
            invocation_mode,
            secure,
            endpoints,
        }))
    }
}

impl WireType for ProxyRef {
    const OPTIONAL_FORMAT: OptionalFormat = OptionalFormat::FSize;
    const MIN_WIRE_SIZE: usize = 2;

    fn type_kind() -> TypeKind {
        TypeKind::Proxy
    }
}

impl StreamWrite for ProxyRef {
    fn write_to(&self, os: &mut OutputStream) -> Result<(), StreamError> {
        os.write_proxy(Some(self))
    }
}

impl StreamRead for ProxyRef {
    fn read_from(is: &mut InputStream<'_>) -> Result<Self, StreamError> {
        is.read_proxy()?
            .ok_or_else(|| StreamError::Marshal("unexpected null proxy".into()))
    }
}
