use crate::constants::{
    ENCODING_MAJOR, ENCODING_MINOR, MESSAGE_COMPRESSION_OFFSET, MESSAGE_ENCODING_VERSION_OFFSET,
    MESSAGE_HEADER_SIZE, MESSAGE_KIND_OFFSET, MESSAGE_MAGIC, MESSAGE_MAGIC_OFFSET,
    MESSAGE_PROTOCOL_VERSION_OFFSET, MESSAGE_SIZE_OFFSET, PROTOCOL_MAJOR, PROTOCOL_MINOR,
};
use crate::message::{MessageKind, ProtocolError};
use crate::stream::OutputStream;

/// The fixed 14-byte prefix of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub kind: MessageKind,
    /// Total message size, header included.
    pub size: usize,
}

impl MessageHeader {
    /// Validates the first [`MESSAGE_HEADER_SIZE`] bytes of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self, ProtocolError> {
        let header: &[u8; MESSAGE_HEADER_SIZE] = buf
            .get(..MESSAGE_HEADER_SIZE)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(ProtocolError::InvalidMessageSize(buf.len() as i32))?;

        let magic = [
            header[MESSAGE_MAGIC_OFFSET],
            header[MESSAGE_MAGIC_OFFSET + 1],
            header[MESSAGE_MAGIC_OFFSET + 2],
            header[MESSAGE_MAGIC_OFFSET + 3],
        ];
        if magic != MESSAGE_MAGIC {
            return Err(ProtocolError::BadMagic(magic));
        }

        let (major, minor) = (
            header[MESSAGE_PROTOCOL_VERSION_OFFSET],
            header[MESSAGE_PROTOCOL_VERSION_OFFSET + 1],
        );
        if major != PROTOCOL_MAJOR || minor > PROTOCOL_MINOR {
            return Err(ProtocolError::UnsupportedProtocol { major, minor });
        }

        let (major, minor) = (
            header[MESSAGE_ENCODING_VERSION_OFFSET],
            header[MESSAGE_ENCODING_VERSION_OFFSET + 1],
        );
        if major != ENCODING_MAJOR || minor != ENCODING_MINOR {
            return Err(ProtocolError::UnsupportedEncoding { major, minor });
        }

        let kind = MessageKind::try_from(header[MESSAGE_KIND_OFFSET])
            .map_err(|_| ProtocolError::UnknownMessageKind(header[MESSAGE_KIND_OFFSET]))?;

        let compression = header[MESSAGE_COMPRESSION_OFFSET];
        if compression != 0 {
            return Err(ProtocolError::CompressionNotSupported(compression));
        }

        let size = i32::from_le_bytes([
            header[MESSAGE_SIZE_OFFSET],
            header[MESSAGE_SIZE_OFFSET + 1],
            header[MESSAGE_SIZE_OFFSET + 2],
            header[MESSAGE_SIZE_OFFSET + 3],
        ]);
        if size < MESSAGE_HEADER_SIZE as i32 {
            return Err(ProtocolError::InvalidMessageSize(size));
        }

        Ok(Self {
            kind,
            size: size as usize,
        })
    }

    /// Writes a header whose size field is backpatched by the caller.
    /// Returns the position of that field.
    pub(crate) fn write_placeholder(os: &mut OutputStream, kind: MessageKind) -> usize {
        os.write_raw(&MESSAGE_MAGIC);
        os.write_byte(PROTOCOL_MAJOR);
        os.write_byte(PROTOCOL_MINOR);
        os.write_byte(ENCODING_MAJOR);
        os.write_byte(ENCODING_MINOR);
        os.write_byte(kind as u8);
        os.write_byte(0);
        let size_pos = os.len();
        os.write_int(0);
        size_pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate_connection_header() -> Vec<u8> {
        let mut os = OutputStream::new();
        let pos = MessageHeader::write_placeholder(&mut os, MessageKind::ValidateConnection);
        os.rewrite_int(pos, MESSAGE_HEADER_SIZE as i32).unwrap();
        os.finished()
    }

    #[test]
    fn parses_a_written_header() {
        let bytes = validate_connection_header();
        assert_eq!(bytes.len(), MESSAGE_HEADER_SIZE);
        let header = MessageHeader::parse(&bytes).unwrap();
        assert_eq!(header.kind, MessageKind::ValidateConnection);
        assert_eq!(header.size, MESSAGE_HEADER_SIZE);
    }

    #[test]
    fn rejects_bad_fields() {
        let mut bad_magic = validate_connection_header();
        bad_magic[0] = b'X';
        assert!(matches!(
            MessageHeader::parse(&bad_magic),
            Err(ProtocolError::BadMagic(_))
        ));

        let mut compressed = validate_connection_header();
        compressed[MESSAGE_COMPRESSION_OFFSET] = 2;
        assert_eq!(
            MessageHeader::parse(&compressed),
            Err(ProtocolError::CompressionNotSupported(2))
        );

        let mut unknown_kind = validate_connection_header();
        unknown_kind[MESSAGE_KIND_OFFSET] = 9;
        assert_eq!(
            MessageHeader::parse(&unknown_kind),
            Err(ProtocolError::UnknownMessageKind(9))
        );

        let mut short_size = validate_connection_header();
        short_size[MESSAGE_SIZE_OFFSET..].copy_from_slice(&3i32.to_le_bytes());
        assert_eq!(
            MessageHeader::parse(&short_size),
            Err(ProtocolError::InvalidMessageSize(3))
        );
    }
}
