use crate::stream::StreamError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("bad message magic {0:02x?}")]
    BadMagic([u8; 4]),

    #[error("unsupported protocol version {major}.{minor}")]
    UnsupportedProtocol { major: u8, minor: u8 },

    #[error("unsupported message encoding {major}.{minor}")]
    UnsupportedEncoding { major: u8, minor: u8 },

    #[error("unknown message kind {0}")]
    UnknownMessageKind(u8),

    #[error("compressed messages are not supported (compression byte {0})")]
    CompressionNotSupported(u8),

    #[error("invalid message size {0}")]
    InvalidMessageSize(i32),

    #[error("message of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge { size: usize, max: usize },

    #[error("{0} unread bytes after message body")]
    TrailingBytes(usize),

    /// The decoder hit a malformed header earlier and no longer knows where
    /// the next message starts.
    #[error("message decoder stopped after a malformed header")]
    DecoderPoisoned,

    #[error(transparent)]
    Stream(#[from] StreamError),
}
