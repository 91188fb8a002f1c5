// Message header layout
pub const MESSAGE_MAGIC: [u8; 4] = *b"SWRP";
pub const MESSAGE_MAGIC_OFFSET: usize = 0;
pub const MESSAGE_PROTOCOL_VERSION_OFFSET: usize = 4;
pub const MESSAGE_ENCODING_VERSION_OFFSET: usize = 6;
pub const MESSAGE_KIND_OFFSET: usize = 8;
pub const MESSAGE_COMPRESSION_OFFSET: usize = 9;
pub const MESSAGE_SIZE_OFFSET: usize = 10;

/// Total size of the fixed message header. The size field counts the
/// header itself, so no valid message is shorter than this.
pub const MESSAGE_HEADER_SIZE: usize = 14;

pub const PROTOCOL_MAJOR: u8 = 1;
pub const PROTOCOL_MINOR: u8 = 0;

pub const ENCODING_MAJOR: u8 = 1;
pub const ENCODING_MINOR: u8 = 1;

/// Encapsulations start with a 4-byte size (covering the header) followed
/// by the encoding major and minor bytes.
pub const ENCAPSULATION_HEADER_SIZE: usize = 6;

/// Default upper bound for a single message, header included.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

// Compact size encoding
pub const SIZE_ESCAPE: u8 = 255;
pub const MAX_SHORT_SIZE: usize = 254;

// Optional member encoding
pub const OPTIONAL_END_MARKER: u8 = 0xFF;
pub const OPTIONAL_TAG_ESCAPE: u8 = 30;
pub const OPTIONAL_FORMAT_MASK: u8 = 0x07;

// Slice header flags
pub const SLICE_FLAG_HAS_TYPE_ID_STRING: u8 = 0x01;
pub const SLICE_FLAG_HAS_TYPE_ID_INDEX: u8 = 0x02;
pub const SLICE_FLAG_HAS_TYPE_ID_COMPACT: u8 = 0x03;
pub const SLICE_FLAG_TYPE_ID_MASK: u8 = 0x03;
pub const SLICE_FLAG_HAS_OPTIONAL_MEMBERS: u8 = 0x04;
pub const SLICE_FLAG_HAS_INDIRECTION_TABLE: u8 = 0x08;
pub const SLICE_FLAG_HAS_SLICE_SIZE: u8 = 0x10;
pub const SLICE_FLAG_IS_LAST_SLICE: u8 = 0x20;

/// Size of the slice-size field, which counts itself.
pub const SLICE_SIZE_FIELD_SIZE: usize = 4;
