use crate::slicing::ValueId;

/// The raw contents of one slice the decoder could not interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceInfo {
    /// Type id of the slice. Empty when the slice used a compact id that
    /// the receiver did not know.
    pub type_id: String,
    pub compact_id: Option<i32>,
    /// Member bytes, including any optional members and their end marker.
    pub bytes: Vec<u8>,
    /// Instances referenced from the slice's indirection table, in order.
    pub instances: Vec<ValueId>,
    pub has_optional_members: bool,
    pub is_last_slice: bool,
}

/// Slices preserved on an instance so that re-sending it reproduces them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlicedData {
    pub slices: Vec<SliceInfo>,
}

impl SlicedData {
    pub fn new(slices: Vec<SliceInfo>) -> Self {
        Self { slices }
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn type_ids(&self) -> impl Iterator<Item = &str> {
        self.slices.iter().map(|slice| slice.type_id.as_str())
    }
}
