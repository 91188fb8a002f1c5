use std::convert::TryFrom;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Request = 0,
    BatchRequest = 1,
    Reply = 2,
    ValidateConnection = 3,
    CloseConnection = 4,
}

impl TryFrom<u8> for MessageKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageKind::Request),
            1 => Ok(MessageKind::BatchRequest),
            2 => Ok(MessageKind::Reply),
            3 => Ok(MessageKind::ValidateConnection),
            4 => Ok(MessageKind::CloseConnection),
            _ => Err(()),
        }
    }
}
