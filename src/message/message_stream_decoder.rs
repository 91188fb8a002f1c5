use crate::constants::{DEFAULT_MAX_MESSAGE_SIZE, MESSAGE_HEADER_SIZE};
use crate::message::{Message, MessageCodec, MessageHeader, ProtocolError};
use std::collections::VecDeque;

/// Reassembles messages from an arbitrarily chunked byte stream.
///
/// Bytes are buffered until a complete message is available, then decoded
/// and emitted in arrival order. A message whose body fails to decode is
/// reported and skipped, since its header still says where the next one
/// starts.
///
/// A malformed header is different: the message boundary is lost. The error
/// is reported once and the decoder stops consuming input; every later call
/// yields [`ProtocolError::DecoderPoisoned`]. Callers are expected to drop
/// the connection.
pub struct MessageStreamDecoder {
    buffer: Vec<u8>,
    max_message_size: usize,
    poisoned: bool,
}

pub struct MessageDecoderIterator {
    queue: VecDeque<Result<Message, ProtocolError>>,
}

impl Iterator for MessageDecoderIterator {
    type Item = Result<Message, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.queue.pop_front()
    }
}

impl Default for MessageStreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStreamDecoder {
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_message_size,
            poisoned: false,
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Number of buffered bytes that do not yet form a complete message.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn read_bytes(&mut self, data: &[u8]) -> MessageDecoderIterator {
        let mut queue = VecDeque::new();

        if self.poisoned {
            queue.push_back(Err(ProtocolError::DecoderPoisoned));
            return MessageDecoderIterator { queue };
        }

        self.buffer.extend_from_slice(data);

        while self.buffer.len() >= MESSAGE_HEADER_SIZE {
            let header = match MessageHeader::parse(&self.buffer) {
                Ok(header) => header,
                Err(e) => {
                    tracing::warn!("malformed message header: {e}");
                    self.poison();
                    queue.push_back(Err(e));
                    break;
                }
            };

            if header.size > self.max_message_size {
                tracing::warn!(
                    "message of {} bytes exceeds limit of {}",
                    header.size,
                    self.max_message_size
                );
                self.poison();
                queue.push_back(Err(ProtocolError::MessageTooLarge {
                    size: header.size,
                    max: self.max_message_size,
                }));
                break;
            }

            if self.buffer.len() < header.size {
                break;
            }

            let decoded = MessageCodec::decode(&self.buffer[..header.size]);
            self.buffer.drain(..header.size);
            if let Err(e) = &decoded {
                tracing::debug!("discarding undecodable {:?} message: {e}", header.kind);
            }
            queue.push_back(decoded);
        }

        MessageDecoderIterator { queue }
    }

    fn poison(&mut self) {
        self.poisoned = true;
        self.buffer = Vec::new();
    }
}
