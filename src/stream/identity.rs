use crate::stream::{
    InputStream, OptionalFormat, OutputStream, StreamError, StreamRead, StreamWrite, TypeKind,
    WireType,
};
use std::collections::BTreeMap;
use std::fmt;

/// Per-invocation key/value pairs carried with every request.
pub type Context = BTreeMap<String, String>;

/// Name of a remote object, qualified by an optional category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    pub name: String,
    pub category: String,
}

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: String::new(),
        }
    }

    pub fn with_category(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.category.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.category, self.name)
        }
    }
}

impl WireType for Identity {
    const OPTIONAL_FORMAT: OptionalFormat = OptionalFormat::FSize;
    const MIN_WIRE_SIZE: usize = 2;

    fn type_kind() -> TypeKind {
        TypeKind::Struct(vec![TypeKind::String, TypeKind::String])
    }
}

impl StreamWrite for Identity {
    fn write_to(&self, os: &mut OutputStream) -> Result<(), StreamError> {
        os.write_string(&self.name)?;
        os.write_string(&self.category)
    }
}

impl StreamRead for Identity {
    fn read_from(is: &mut InputStream<'_>) -> Result<Self, StreamError> {
        let name = is.read_string()?;
        let category = is.read_string()?;
        Ok(Self { name, category })
    }
}
