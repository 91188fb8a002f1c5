use crate::protocol::OperationMode;

/// Static metadata for one operation of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationInfo {
    pub name: &'static str,
    pub mode: OperationMode,
    /// Type ids of the user exceptions the operation declares.
    pub throws: &'static [&'static str],
    /// Parameters or results carry class instances, so the encapsulation
    /// ends with an instance section.
    pub uses_classes: bool,
}

impl OperationInfo {
    pub const fn new(name: &'static str, mode: OperationMode) -> Self {
        Self {
            name,
            mode,
            throws: &[],
            uses_classes: false,
        }
    }

    pub const fn with_throws(mut self, throws: &'static [&'static str]) -> Self {
        self.throws = throws;
        self
    }

    pub const fn with_classes(mut self) -> Self {
        self.uses_classes = true;
        self
    }

    /// Whether an exception with the given type-id chain (most-derived
    /// first) is covered by the throws clause.
    pub fn declares<'t>(&self, type_ids: impl IntoIterator<Item = &'t str>) -> bool {
        type_ids
            .into_iter()
            .any(|type_id| self.throws.iter().any(|declared| *declared == type_id))
    }
}

/// Type id every servant implements, listed last in its type ids.
pub const OBJECT_TYPE_ID: &str = "::Slicewire::Object";

pub const ICE_ID: OperationInfo = OperationInfo::new("ice_id", OperationMode::Idempotent);
pub const ICE_IDS: OperationInfo = OperationInfo::new("ice_ids", OperationMode::Idempotent);
pub const ICE_IS_A: OperationInfo = OperationInfo::new("ice_isA", OperationMode::Idempotent);
pub const ICE_PING: OperationInfo = OperationInfo::new("ice_ping", OperationMode::Idempotent);

/// Operations every object answers, in name order.
pub const PSEUDO_OPERATIONS: [OperationInfo; 4] = [ICE_ID, ICE_IDS, ICE_IS_A, ICE_PING];

/// Dispatch tables are searched by name, so they must be strictly sorted.
pub fn is_sorted_by_name(operations: &[OperationInfo]) -> bool {
    operations.windows(2).all(|pair| pair[0].name < pair[1].name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_operations_are_sorted() {
        assert!(is_sorted_by_name(&PSEUDO_OPERATIONS));
    }

    #[test]
    fn declares_matches_any_type_in_the_chain() {
        const RAISE: OperationInfo = OperationInfo::new("raise", OperationMode::Normal)
            .with_throws(&["::Test::BaseError"]);
        assert!(RAISE.declares(["::Test::DerivedError", "::Test::BaseError"]));
        assert!(!RAISE.declares(["::Test::Other"]));
    }
}
