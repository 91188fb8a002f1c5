use crate::message::MessageKind;
use crate::protocol::{ReplyFrame, RequestFrame};

/// One complete protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A request id of 0 marks a oneway request that expects no reply.
    Request { request_id: i32, frame: RequestFrame },
    BatchRequest(Vec<RequestFrame>),
    Reply { request_id: i32, reply: ReplyFrame },
    ValidateConnection,
    CloseConnection,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Request { .. } => MessageKind::Request,
            Message::BatchRequest(_) => MessageKind::BatchRequest,
            Message::Reply { .. } => MessageKind::Reply,
            Message::ValidateConnection => MessageKind::ValidateConnection,
            Message::CloseConnection => MessageKind::CloseConnection,
        }
    }

    pub fn is_oneway_request(&self) -> bool {
        matches!(self, Message::Request { request_id: 0, .. })
    }
}
