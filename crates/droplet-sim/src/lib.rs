//! Software chip for the Droplet engine.
//!
//! Implements the [`ChipVm`] capability against in-memory cells so protocols
//! can run without hardware. Each cell holds a [`Mixture`] -- the volume
//! fractions of every reagent that ended up in it -- which is what lets
//! tests measure the *realized* ratio of a mix tree, not just its shape.
//!
//! # Design
//!
//! - Cells back store 0 only; the engine never drives any other store.
//! - `mix_and_store` blends its input cells in equal parts (the engine only
//!   selects 1:1 mixers) and overwrites the output cell.
//! - Consume semantics belong to the engine: the sim never clears an input
//!   cell, it just gets overwritten when the cell is reused.
//! - Every VM call is recorded in [`SimChip::trace`] in execution order.

use std::collections::BTreeMap;

use droplet_core::chip::{ChipTopology, ChipVm, Location, Mixer, Store};
use droplet_core::id::MixerId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Reagents and mixtures
// ---------------------------------------------------------------------------

/// Identifies a reagent in the simulation. Cheap to copy and compare.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ReagentId(pub u32);

/// Volume-fraction composition of a cell's contents.
///
/// Fractions sum to 1 for a filled cell. BTreeMap keeps iteration (and
/// therefore floating-point accumulation order) deterministic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mixture {
    fractions: BTreeMap<ReagentId, f64>,
}

impl Mixture {
    /// A cell holding a single undiluted reagent.
    pub fn pure(reagent: ReagentId) -> Self {
        let mut fractions = BTreeMap::new();
        fractions.insert(reagent, 1.0);
        Self { fractions }
    }

    /// The volume fraction of `reagent`, zero if absent.
    pub fn fraction(&self, reagent: ReagentId) -> f64 {
        self.fractions.get(&reagent).copied().unwrap_or(0.0)
    }

    pub fn reagents(&self) -> impl Iterator<Item = (ReagentId, f64)> + '_ {
        self.fractions.iter().map(|(&r, &f)| (r, f))
    }

    /// Blend `parts` in equal volumes.
    pub fn blend(parts: &[&Mixture]) -> Mixture {
        let mut fractions = BTreeMap::new();
        if parts.is_empty() {
            return Mixture { fractions };
        }
        let share = 1.0 / parts.len() as f64;
        for part in parts {
            for (&reagent, &fraction) in &part.fractions {
                *fractions.entry(reagent).or_insert(0.0) += fraction * share;
            }
        }
        Mixture { fractions }
    }
}

// ---------------------------------------------------------------------------
// Sim chip
// ---------------------------------------------------------------------------

/// One recorded `mix_and_store` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub mixer: MixerId,
    pub inputs: Vec<Location>,
    pub output: Location,
}

/// Software chip: cells, mixing, and a call trace.
#[derive(Debug)]
pub struct SimChip {
    topology: ChipTopology,
    /// Cell contents for store 0.
    cells: Vec<Option<Mixture>>,
    /// Every mix in execution order.
    pub trace: Vec<TraceEntry>,
    /// Every device-side fill in execution order. Source-handler replays
    /// show up here.
    pub loads: Vec<Location>,
}

impl SimChip {
    pub fn new(topology: ChipTopology) -> Self {
        let capacity = topology.stores.first().map_or(0, |s| s.capacity);
        Self {
            topology,
            cells: vec![None; capacity as usize],
            trace: Vec::new(),
            loads: Vec::new(),
        }
    }

    /// A chip with one 1:1 mixer and a single store of `cells` cells.
    pub fn with_one_to_one(cells: u32) -> Self {
        Self::new(ChipTopology {
            mixers: vec![Mixer {
                name: "mixer0".into(),
                ratio: vec![1, 1],
            }],
            stores: vec![Store {
                name: "bank0".into(),
                capacity: cells,
            }],
        })
    }

    /// Device-side fill: put a pure reagent into `location`. This is what a
    /// native source handler calls when the engine asks it to produce a
    /// sample.
    pub fn load_pure(&mut self, location: Location, reagent: ReagentId) {
        self.load(location, Mixture::pure(reagent));
    }

    /// Device-side fill with an arbitrary composition.
    pub fn load(&mut self, location: Location, mixture: Mixture) {
        if let Some(cell) = self.cells.get_mut(location.cell as usize) {
            *cell = Some(mixture);
            self.loads.push(location);
        }
    }

    /// Inspect a cell's contents.
    pub fn contents(&self, location: Location) -> Option<&Mixture> {
        self.cells
            .get(location.cell as usize)
            .and_then(Option::as_ref)
    }
}

impl ChipVm for SimChip {
    fn topology(&self) -> &ChipTopology {
        &self.topology
    }

    fn mix_and_store(&mut self, mixer: MixerId, inputs: &[Location], output: Location) {
        let parts: Vec<&Mixture> = inputs
            .iter()
            .filter_map(|loc| self.cells.get(loc.cell as usize).and_then(Option::as_ref))
            .collect();
        // The engine materializes every input before running a mix.
        debug_assert_eq!(parts.len(), inputs.len(), "mix read an empty cell");
        let blended = Mixture::blend(&parts);

        if let Some(cell) = self.cells.get_mut(output.cell as usize) {
            *cell = Some(blended);
        }
        self.trace.push(TraceEntry {
            mixer,
            inputs: inputs.to_vec(),
            output,
        });
    }
}
