use std::fmt;

use super::SlotId;

/// Snapshot of a slot holding a token, as returned by enumeration
///
/// Recomputed on every query; nothing is cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDescriptor {
    pub slot: SlotId,
    pub label: String,
    pub serial_number: String,
}

impl fmt::Display for TokenDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Slot {}: {} (S/N: {})",
            self.slot, self.label, self.serial_number
        )
    }
}
