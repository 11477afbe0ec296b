//! Shared test helpers for unit tests, integration tests, and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available to in-crate tests and, via the `test-utils` feature, to
//! downstream test crates.

use crate::chip::{ChipTopology, ChipVm, Location, Mixer, Store};
use crate::engine::Engine;
use crate::id::MixerId;

// ===========================================================================
// Canned topologies
// ===========================================================================

/// A minimal chip: one 1:1 mixer and one store with `cells` cells.
pub fn one_to_one_chip(cells: u32) -> ChipTopology {
    ChipTopology {
        mixers: vec![Mixer {
            name: "mixer0".into(),
            ratio: vec![1, 1],
        }],
        stores: vec![Store {
            name: "bank0".into(),
            capacity: cells,
        }],
    }
}

// ===========================================================================
// Recording chip
// ===========================================================================

/// One recorded `mix_and_store` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixCall {
    pub mixer: MixerId,
    pub inputs: Vec<Location>,
    pub output: Location,
}

/// A chip backend that records every VM call and does nothing else.
///
/// For checking *what* the engine asked the chip to do; use `droplet-sim`
/// when the test needs actual mixture compositions.
#[derive(Debug)]
pub struct TraceChip {
    topology: ChipTopology,
    /// Every mix in execution order.
    pub calls: Vec<MixCall>,
    /// Cells filled by native source handlers in the tests.
    pub filled: Vec<Location>,
}

impl TraceChip {
    pub fn new(topology: ChipTopology) -> Self {
        Self {
            topology,
            calls: Vec::new(),
            filled: Vec::new(),
        }
    }
}

impl ChipVm for TraceChip {
    fn topology(&self) -> &ChipTopology {
        &self.topology
    }

    fn mix_and_store(&mut self, mixer: MixerId, inputs: &[Location], output: Location) {
        self.calls.push(MixCall {
            mixer,
            inputs: inputs.to_vec(),
            output,
        });
    }
}

// ===========================================================================
// Engine constructors
// ===========================================================================

/// An engine on a recording chip with one 1:1 mixer and `cells` cells.
pub fn trace_engine(cells: u32) -> Engine<TraceChip> {
    Engine::new(TraceChip::new(one_to_one_chip(cells))).expect("canned chip supports the engine")
}
