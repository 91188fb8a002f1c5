use crate::constants::{ENCODING_MAJOR, ENCODING_MINOR};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodingVersion {
    pub major: u8,
    pub minor: u8,
}

impl EncodingVersion {
    /// The only encoding this runtime reads and writes.
    pub const CURRENT: EncodingVersion = EncodingVersion {
        major: ENCODING_MAJOR,
        minor: ENCODING_MINOR,
    };

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    pub fn is_supported(&self) -> bool {
        *self == Self::CURRENT
    }
}

impl Default for EncodingVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for EncodingVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
