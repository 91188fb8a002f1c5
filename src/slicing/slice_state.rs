/// What kind of instance is currently being encoded or decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceKind {
    Value,
    Exception,
}

/// Progress of the slice currently being encoded or decoded.
///
/// Every instance starts in `AwaitingSlice`. `start_slice` moves to
/// `InSlice`; `end_slice` moves back to `AwaitingSlice`, or to `Done` once
/// the slice flagged as last has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceState {
    AwaitingSlice,
    InSlice,
    Done,
}
