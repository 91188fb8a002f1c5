use crate::protocol::{Encapsulation, ReplyStatus};
use crate::stream::{
    Identity, InputStream, OptionalFormat, OutputStream, StreamError, StreamRead, StreamWrite,
    TypeKind, WireType,
};

/// Target of a request that could not be dispatched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFailed {
    pub identity: Identity,
    pub facet: String,
    pub operation: String,
}

/// Body of a reply, keyed by its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyFrame {
    Ok(Encapsulation),
    UserException(Encapsulation),
    ObjectNotExist(RequestFailed),
    FacetNotExist(RequestFailed),
    OperationNotExist(RequestFailed),
    UnknownLocalException(String),
    UnknownUserException(String),
    UnknownException(String),
}

impl ReplyFrame {
    pub fn status(&self) -> ReplyStatus {
        match self {
            ReplyFrame::Ok(_) => ReplyStatus::Ok,
            ReplyFrame::UserException(_) => ReplyStatus::UserException,
            ReplyFrame::ObjectNotExist(_) => ReplyStatus::ObjectNotExist,
            ReplyFrame::FacetNotExist(_) => ReplyStatus::FacetNotExist,
            ReplyFrame::OperationNotExist(_) => ReplyStatus::OperationNotExist,
            ReplyFrame::UnknownLocalException(_) => ReplyStatus::UnknownLocalException,
            ReplyFrame::UnknownUserException(_) => ReplyStatus::UnknownUserException,
            ReplyFrame::UnknownException(_) => ReplyStatus::UnknownException,
        }
    }
}

impl WireType for ReplyFrame {
    const OPTIONAL_FORMAT: OptionalFormat = OptionalFormat::FSize;
    const MIN_WIRE_SIZE: usize = 2;

    fn type_kind() -> TypeKind {
        TypeKind::Struct(vec![TypeKind::Byte, TypeKind::Sequence(Box::new(TypeKind::Byte))])
    }
}

impl StreamWrite for ReplyFrame {
    fn write_to(&self, os: &mut OutputStream) -> Result<(), StreamError> {
        os.write_byte(self.status().into());
        match self {
            ReplyFrame::Ok(encaps) | ReplyFrame::UserException(encaps) => encaps.write_to(os),
            ReplyFrame::ObjectNotExist(failed)
            | ReplyFrame::FacetNotExist(failed)
            | ReplyFrame::OperationNotExist(failed) => {
                failed.identity.write_to(os)?;
                os.write_facet(&failed.facet)?;
                os.write_string(&failed.operation)
            }
            ReplyFrame::UnknownLocalException(message)
            | ReplyFrame::UnknownUserException(message)
            | ReplyFrame::UnknownException(message) => os.write_string(message),
        }
    }
}

impl StreamRead for ReplyFrame {
    fn read_from(is: &mut InputStream<'_>) -> Result<Self, StreamError> {
        let status = is.read_byte()?;
        let status = ReplyStatus::try_from(status).map_err(|_| StreamError::InvalidDiscriminant {
            kind: "reply status",
            value: status,
        })?;
        let reply = match status {
            ReplyStatus::Ok => ReplyFrame::Ok(Encapsulation::read_from(is)?),
            ReplyStatus::UserException => ReplyFrame::UserException(Encapsulation::read_from(is)?),
            ReplyStatus::ObjectNotExist => ReplyFrame::ObjectNotExist(read_request_failed(is)?),
            ReplyStatus::FacetNotExist => ReplyFrame::FacetNotExist(read_request_failed(is)?),
            ReplyStatus::OperationNotExist => {
                ReplyFrame::OperationNotExist(read_request_failed(is)?)
            }
            ReplyStatus::UnknownLocalException => {
                ReplyFrame::UnknownLocalException(is.read_string()?)
            }
            ReplyStatus::UnknownUserException => {
                ReplyFrame::UnknownUserException(is.read_string()?)
            }
            ReplyStatus::UnknownException => ReplyFrame::UnknownException(is.read_string()?),
        };
        Ok(reply)
    }
}

fn read_request_failed(is: &mut InputStream<'_>) -> Result<RequestFailed, StreamError> {
    Ok(RequestFailed {
        identity: Identity::read_from(is)?,
        facet: is.read_facet()?,
        operation: is.read_string()?,
    })
}
