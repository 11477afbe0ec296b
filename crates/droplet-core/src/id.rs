use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a fluid node in the mixing graph.
    pub struct FluidId;

    /// Identifies an operation node in the mixing graph.
    pub struct OperationId;
}

/// Identifies a mixer on the chip. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MixerId(pub u32);

/// Identifies a store (bank of storage cells) on the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreId(pub u32);
