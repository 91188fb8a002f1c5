use crate::slicing::ValueId;
use crate::stream::OptionalFormat;
use thiserror::Error;

/// Errors raised while encoding or decoding a stream.
///
/// Decoding never panics on malformed input; every structural problem in
/// the bytes surfaces as one of these variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("unexpected end of buffer: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },

    #[error("negative size {0}")]
    NegativeSize(i32),

    #[error("declared size {size} exceeds the {remaining} bytes remaining")]
    SizeExceedsRemaining { size: usize, remaining: usize },

    #[error("size {0} does not fit the wire format")]
    SizeOverflow(usize),

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("enumerator {value} out of range (max {max})")]
    EnumOutOfRange { value: i32, max: i32 },

    #[error("invalid {kind} discriminant {value}")]
    InvalidDiscriminant { kind: &'static str, value: u8 },

    #[error("optional tag {tag} uses format {found:?}, expected {expected:?}")]
    OptionalFormatMismatch {
        tag: i32,
        expected: OptionalFormat,
        found: OptionalFormat,
    },

    #[error("optional tags must be written in ascending order (tag {tag} after {previous})")]
    OptionalTagOrder { tag: i32, previous: i32 },

    #[error("slice state violation: {0}")]
    SliceState(&'static str),

    #[error("slice `{type_id}` overran its declared end by {overrun} bytes")]
    SliceOverrun { type_id: String, overrun: usize },

    #[error("expected slice `{expected}`, found `{found}`")]
    SliceTypeMismatch { expected: String, found: String },

    #[error("slice without a size prefix cannot be decoded")]
    MissingSliceSize,

    #[error("type-id index {0} was never defined in this encapsulation")]
    InvalidTypeIdIndex(usize),

    #[error("unexpected value type: expected `{expected}`, found `{found}`")]
    UnexpectedValueType { expected: String, found: String },

    #[error("instance {0} was decoded more than once")]
    DuplicateInstance(i32),

    #[error("reference to instance {0} was never resolved")]
    UnresolvedReference(i32),

    #[error("invalid instance id {0}")]
    InvalidInstanceId(i32),

    #[error("indirection index {index} out of range ({len} entries)")]
    InvalidIndirection { index: usize, len: usize },

    #[error("value {0:?} is not present in the graph")]
    MissingValue(ValueId),

    #[error("class instances cannot be written outside an encapsulation")]
    NoEncapsulation,

    #[error("encapsulation state violation: {0}")]
    EncapsulationState(&'static str),

    #[error("invalid encapsulation size {0}")]
    InvalidEncapsulationSize(i32),

    #[error("unsupported encoding {major}.{minor}")]
    UnsupportedEncoding { major: u8, minor: u8 },

    #[error("{0}")]
    Marshal(String),
}
