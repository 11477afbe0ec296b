//! The chip model: mixers, stores, storage locations, and the VM capability
//! trait every chip backend implements.

use crate::id::{MixerId, StoreId};
use serde::{Deserialize, Serialize};

/// A fluidic mixing unit with a fixed per-input ratio table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mixer {
    pub name: String,
    /// Declared ratio weight per input. The length is the input arity.
    pub ratio: Vec<u32>,
}

impl Mixer {
    pub fn num_inputs(&self) -> usize {
        self.ratio.len()
    }

    /// A two-input mixer with equal ratio weights.
    pub fn is_one_to_one(&self) -> bool {
        self.ratio.len() == 2 && self.ratio[0] == self.ratio[1]
    }
}

/// A bank of addressable storage cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    pub name: String,
    /// Number of cells in this store.
    pub capacity: u32,
}

/// A single storage cell: (store, cell index).
///
/// A fluid that is not resident anywhere simply has no `Location`; there is
/// no sentinel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub store: StoreId,
    pub cell: u32,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}[{}]", self.store.0, self.cell)
    }
}

/// Static description of a chip: its mixers and storage banks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipTopology {
    pub mixers: Vec<Mixer>,
    pub stores: Vec<Store>,
}

impl ChipTopology {
    pub fn mixer(&self, id: MixerId) -> Option<&Mixer> {
        self.mixers.get(id.0 as usize)
    }

    pub fn store(&self, id: StoreId) -> Option<&Store> {
        self.stores.get(id.0 as usize)
    }

    /// First mixer with exactly two inputs and equal ratio weights.
    pub fn find_one_to_one_mixer(&self) -> Option<MixerId> {
        self.mixers
            .iter()
            .position(Mixer::is_one_to_one)
            .map(|i| MixerId(i as u32))
    }
}

/// Capability surface every chip backend provides to the engine.
///
/// Implementations only ever see chip elements (mixer ids, locations), never
/// the engine's fluid handles.
pub trait ChipVm {
    /// The static mixer/store layout of the chip.
    fn topology(&self) -> &ChipTopology;

    /// Mix the fluids at `inputs` using `mixer` and store the mixture in
    /// `output`. Inputs are passed in the mixer's declared input order.
    fn mix_and_store(&mut self, mixer: MixerId, inputs: &[Location], output: Location);
}
