use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Wire format code carried in the low three bits of an optional header.
///
/// The format tells a reader that does not know the tag how many bytes to
/// skip, which is what makes optional members forward compatible.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum OptionalFormat {
    /// One fixed byte (byte, bool).
    F1 = 0,
    /// Two fixed bytes (short).
    F2 = 1,
    /// Four fixed bytes (int, float).
    F4 = 2,
    /// Eight fixed bytes (long, double).
    F8 = 3,
    /// A single compact size (enumerators).
    Size = 4,
    /// A compact size followed by that many bytes.
    VSize = 5,
    /// A 4-byte size followed by that many bytes.
    FSize = 6,
    /// A class instance reference.
    Class = 7,
}

impl OptionalFormat {
    /// Fixed payload width for the `F*` formats.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            OptionalFormat::F1 => Some(1),
            OptionalFormat::F2 => Some(2),
            OptionalFormat::F4 => Some(4),
            OptionalFormat::F8 => Some(8),
            _ => None,
        }
    }
}
