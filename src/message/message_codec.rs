use crate::constants::MESSAGE_HEADER_SIZE;
use crate::message::{Message, MessageHeader, MessageKind, ProtocolError};
use crate::protocol::{ReplyFrame, ReplyStatus, RequestFrame};
use crate::stream::{InputStream, OutputStream, StreamError, StreamRead, StreamWrite};

/// Serializes [`Message`]s to complete wire messages and back.
pub struct MessageCodec;

impl MessageCodec {
    pub fn encode(message: &Message) -> Result<Vec<u8>, ProtocolError> {
        Self::encode_with(message.kind(), |os| match message {
            Message::Request { request_id, frame } => {
                os.write_int(*request_id);
                frame.write_to(os)
            }
            Message::BatchRequest(frames) => {
                os.write_int(frames.len() as i32);
                frames.iter().try_for_each(|frame| frame.write_to(os))
            }
            Message::Reply { request_id, reply } => {
                os.write_int(*request_id);
                reply.write_to(os)
            }
            Message::ValidateConnection | Message::CloseConnection => Ok(()),
        })
    }

    /// Writes a header for `kind`, lets `write` append the body, then
    /// backpatches the total size.
    pub fn encode_with<F>(kind: MessageKind, write: F) -> Result<Vec<u8>, ProtocolError>
    where
        F: FnOnce(&mut OutputStream) -> Result<(), StreamError>,
    {
        let mut os = OutputStream::with_capacity(MESSAGE_HEADER_SIZE);
        let size_pos = MessageHeader::write_placeholder(&mut os, kind);
        write(&mut os)?;
        let size = os.len();
        let size = i32::try_from(size).map_err(|_| StreamError::SizeOverflow(size))?;
        os.rewrite_int(size_pos, size)?;
        Ok(os.finished())
    }

    /// Builds a successful reply by marshaling results straight into the
    /// outgoing message.
    ///
    /// The output is byte-identical to encoding a `Message::Reply` holding
    /// `ReplyFrame::Ok` with an encapsulation built from the same writer.
    pub fn encode_ok_reply_with<F>(request_id: i32, write: F) -> Result<Vec<u8>, ProtocolError>
    where
        F: FnOnce(&mut OutputStream) -> Result<(), StreamError>,
    {
        Self::encode_with(MessageKind::Reply, |os| {
            os.write_int(request_id);
            os.write_byte(ReplyStatus::Ok.into());
            os.start_encapsulation();
            write(os)?;
            os.end_encapsulation()
        })
    }

    /// Decodes exactly one message; `buf` must hold nothing else.
    pub fn decode(buf: &[u8]) -> Result<Message, ProtocolError> {
        let header = MessageHeader::parse(buf)?;
        if buf.len() != header.size {
            return Err(ProtocolError::InvalidMessageSize(buf.len() as i32));
        }

        let mut is = InputStream::new(&buf[MESSAGE_HEADER_SIZE..]);
        let message = match header.kind {
            MessageKind::Request => Message::Request {
                request_id: is.read_int()?,
                frame: RequestFrame::read_from(&mut is)?,
            },
            MessageKind::BatchRequest => {
                let count = is.read_int()?;
                if count < 0 {
                    return Err(StreamError::NegativeSize(count).into());
                }
                let mut frames = Vec::new();
                for _ in 0..count {
                    frames.push(RequestFrame::read_from(&mut is)?);
                }
                Message::BatchRequest(frames)
            }
            MessageKind::Reply => Message::Reply {
                request_id: is.read_int()?,
                reply: ReplyFrame::read_from(&mut is)?,
            },
            MessageKind::ValidateConnection => Message::ValidateConnection,
            MessageKind::CloseConnection => Message::CloseConnection,
        };

        if !is.is_at_end() {
            return Err(ProtocolError::TrailingBytes(is.remaining()));
        }
        Ok(message)
    }
}
