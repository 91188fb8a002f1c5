mod message_codec;
mod message_header;
mod message_kind;
mod message_stream_decoder;
mod message_struct;
mod protocol_error;

pub use message_codec::MessageCodec;
pub use message_header::MessageHeader;
pub use message_kind::MessageKind;
pub use message_stream_decoder::{MessageDecoderIterator, MessageStreamDecoder};
pub use message_struct::Message;
pub use protocol_error::ProtocolError;
