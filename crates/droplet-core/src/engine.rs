//! The mixing engine: owns the chip backend, the storage allocator, and the
//! mixing graph, and drives demand-driven materialization.
//!
//! # Architecture
//!
//! The `Engine` owns:
//! - A chip backend `V: ChipVm` (hardware driver or `droplet-sim` chip)
//! - The selected 1:1 mixer and store
//! - A [`CellAllocator`] sized to the selected store
//! - A [`MixGraph`] of every fluid and operation this engine created
//! - The current mixing precision
//! - A native dispatch table ([`NativeTable`])
//!
//! # Evaluation policy
//!
//! `mix` plans a symbolic tree of virtual fluids, then immediately forces
//! the root: predictable synchronous semantics at the cost of cross-call
//! batching. Materialization is demand-driven and depth-first; a node's
//! left subtree is fully resolved (and its leaves consumed) before the
//! right subtree starts, which keeps peak cell occupancy down on a
//! capacity-bounded store.
//!
//! One engine instance is a single logical thread of control: every call
//! runs to completion or fails with a typed error, and a failure leaves the
//! occupancy table consistent with exactly the cells still bound to fluids.

use crate::allocator::{CellAllocator, StorageExhausted};
use crate::chip::{ChipVm, Location};
use crate::graph::{MixGraph, OperationKind};
use crate::id::{FluidId, MixerId, OperationId, StoreId};
use crate::native::{NativeHandler, NativeKind, NativeTable, NativeValue};
use crate::planner::{self, PlanError};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Mixing precision used until `set_precision` is called.
pub const DEFAULT_PRECISION: f64 = 0.001;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors surfaced by the engine.
///
/// Setup errors (`NoOneToOneMixer`, `NoStores`) are fatal: no engine value
/// exists afterwards. Everything else is returned per call and leaves the
/// engine usable.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The chip declares no two-input mixer with equal ratio weights.
    #[error("chip has no 1:1 mixer")]
    NoOneToOneMixer,

    /// The chip declares no storage banks.
    #[error("chip has no stores")]
    NoStores,

    /// Precision must lie in [0, 1].
    #[error("precision {0} out of range; expected 0..=1")]
    PrecisionOutOfRange(f64),

    #[error(transparent)]
    Storage(#[from] StorageExhausted),

    #[error(transparent)]
    Plan(#[from] PlanError),

    /// A fluid handle does not belong to this engine's graph.
    #[error("unknown fluid {0:?}")]
    UnknownFluid(FluidId),

    /// The same fluid handle was passed more than once to a single mix.
    #[error("fluid {0:?} passed more than once to a single mix")]
    DuplicateFluid(FluidId),

    /// A single-use fluid was consumed and cannot be regenerated.
    #[error("fluid {0:?} was consumed and has no generator")]
    FluidUnavailable(FluidId),

    /// Fluid and weight lists differ in length.
    #[error("mix called with {fluids} fluids but {weights} weights")]
    ArityMismatch { fluids: usize, weights: usize },

    /// No handler is registered under this native name.
    #[error("no native handler registered for '{0}'")]
    UnknownNative(String),

    /// The named handler cannot fill a storage cell.
    #[error("native '{0}' cannot produce a fluid")]
    NotAFluidSource(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The symbolic mixing engine over one chip backend.
#[derive(Debug)]
pub struct Engine<V: ChipVm> {
    vm: V,
    mixer: MixerId,
    store: StoreId,
    allocator: CellAllocator,
    graph: MixGraph,
    precision: f64,
    natives: NativeTable<V>,
}

impl<V: ChipVm> Engine<V> {
    /// Set up an engine on `vm`: select the first 1:1 mixer and the first
    /// store, size the allocator to that store, and start at
    /// [`DEFAULT_PRECISION`].
    pub fn new(vm: V) -> Result<Self, EngineError> {
        let topology = vm.topology();
        let mixer = topology
            .find_one_to_one_mixer()
            .ok_or(EngineError::NoOneToOneMixer)?;
        if topology.stores.is_empty() {
            return Err(EngineError::NoStores);
        }
        if topology.stores.len() > 1 {
            log::warn!(
                "engine drives a single store; ignoring {} extra store(s)",
                topology.stores.len() - 1
            );
        }
        let store = StoreId(0);
        let capacity = topology.stores[0].capacity;
        Ok(Self {
            vm,
            mixer,
            store,
            allocator: CellAllocator::new(store, capacity),
            graph: MixGraph::new(),
            precision: DEFAULT_PRECISION,
            natives: NativeTable::new(),
        })
    }

    /// Set the mixing precision, an absolute deviation bound on the 0-1
    /// volume-fraction scale. Rejected before any state changes.
    pub fn set_precision(&mut self, precision: f64) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&precision) {
            return Err(EngineError::PrecisionOutOfRange(precision));
        }
        self.precision = precision;
        Ok(())
    }

    pub fn precision(&self) -> f64 {
        self.precision
    }

    // -----------------------------------------------------------------------
    // Mixing
    // -----------------------------------------------------------------------

    /// Symbolically mix `fluids` at the given relative weights, then
    /// materialize the result before returning it.
    ///
    /// Zero-weight entries are dropped; a single surviving fluid is
    /// returned unchanged. The returned fluid is resident on the chip until
    /// a later mix consumes it or [`Engine::release`] frees it.
    pub fn mix(&mut self, fluids: &[FluidId], weights: &[f64]) -> Result<FluidId, EngineError> {
        if fluids.len() != weights.len() {
            return Err(EngineError::ArityMismatch {
                fluids: fluids.len(),
                weights: weights.len(),
            });
        }
        for (i, &fluid) in fluids.iter().enumerate() {
            if !self.graph.contains_fluid(fluid) {
                return Err(EngineError::UnknownFluid(fluid));
            }
            // One handle, one slot: aliased inputs would double-consume.
            if fluids[..i].contains(&fluid) {
                return Err(EngineError::DuplicateFluid(fluid));
            }
        }

        let root = planner::plan_mix(&mut self.graph, fluids, weights, self.precision)?;
        self.ensure_available(root)?;
        Ok(root)
    }

    /// Make `fluid` resident on the chip, re-running its generator if it
    /// was consumed. Idempotent when the fluid is already available; a
    /// consumed fluid with no generator is gone for good.
    pub fn ensure_available(&mut self, fluid: FluidId) -> Result<(), EngineError> {
        let node = self
            .graph
            .fluid(fluid)
            .ok_or(EngineError::UnknownFluid(fluid))?;
        if node.available() {
            return Ok(());
        }
        match node.generator {
            Some(op) => self.regenerate(fluid, op),
            None => Err(EngineError::FluidUnavailable(fluid)),
        }
    }

    /// Re-run `op` to refill `fluid`. Inputs are materialized before the
    /// output cell is allocated so the subtree can still use that cell.
    fn regenerate(&mut self, fluid: FluidId, op: OperationId) -> Result<(), EngineError> {
        self.ensure_inputs_available(op)?;
        let location = self.allocator.allocate()?;
        self.graph.bind_location(fluid, location);
        self.execute_into(op, location)
    }

    /// Materialize every fluid input of `op`, left to right.
    fn ensure_inputs_available(&mut self, op: OperationId) -> Result<(), EngineError> {
        for input in self.operation_inputs(op) {
            self.ensure_available(input)?;
        }
        Ok(())
    }

    fn operation_inputs(&self, op: OperationId) -> Vec<FluidId> {
        match self.graph.operation(op) {
            Some(node) => node.kind.fluid_inputs(),
            None => Vec::new(),
        }
    }

    /// Run `op` into an already-bound output cell.
    fn execute_into(&mut self, op: OperationId, output: Location) -> Result<(), EngineError> {
        let kind = match self.graph.operation(op) {
            Some(node) => node.kind.clone(),
            None => return Ok(()),
        };
        match kind {
            OperationKind::Mix { inputs, .. } => {
                // Inputs were materialized before the output cell was
                // taken, but the left one may have been consumed while the
                // right subtree resolved; re-ensure both.
                let mut cells = [output; 2];
                for (slot, &input) in cells.iter_mut().zip(inputs.iter()) {
                    self.ensure_available(input)?;
                    *slot = self
                        .graph
                        .fluid(input)
                        .and_then(|f| f.location)
                        .ok_or(EngineError::FluidUnavailable(input))?;
                }

                self.vm.mix_and_store(self.mixer, &cells, output);

                // A mix consumes exactly its two inputs.
                self.consume(inputs[0]);
                self.consume(inputs[1]);
                Ok(())
            }
            OperationKind::Native { name, args } => {
                match self.natives.get_mut(&name) {
                    Some(NativeHandler::Source(handler)) => {
                        handler(&mut self.vm, &args, output);
                        Ok(())
                    }
                    Some(NativeHandler::Call(_)) => Err(EngineError::NotAFluidSource(name)),
                    None => Err(EngineError::UnknownNative(name)),
                }
            }
        }
    }

    /// Free the fluid's cell, leaving the fluid virtual.
    fn consume(&mut self, fluid: FluidId) {
        if let Some(location) = self.graph.take_location(fluid) {
            self.allocator.free(location);
        }
    }

    /// Explicitly consume `fluid`, returning its cell to the pool.
    ///
    /// This is the recovery path for [`StorageExhausted`]: release fluids
    /// the protocol no longer needs, then retry the mix.
    pub fn release(&mut self, fluid: FluidId) -> Result<(), EngineError> {
        if !self.graph.contains_fluid(fluid) {
            return Err(EngineError::UnknownFluid(fluid));
        }
        self.consume(fluid);
        Ok(())
    }

    /// Allocate a cell for the surrounding layer to fill, wrapped as a
    /// single-use fluid with no generator. The engine marks the cell
    /// occupied so no operation can claim it.
    pub fn adopt_external(&mut self) -> Result<(FluidId, Location), EngineError> {
        let location = self.allocator.allocate()?;
        let fluid = self.graph.add_external(location);
        Ok((fluid, location))
    }

    // -----------------------------------------------------------------------
    // Natives
    // -----------------------------------------------------------------------

    /// Register a device handler under `name`. The dispatch table is built
    /// at configuration time; unknown names fail at call time.
    pub fn register_native(&mut self, name: impl Into<String>, handler: NativeHandler<V>) {
        self.natives.register(name, handler);
    }

    /// Invoke a named device call. Fluid-typed args are materialized first.
    /// Synchronous, potentially slow. A `Source` handler fills a fresh cell
    /// and yields a new fluid that regenerates through the same call when
    /// consumed and needed again.
    pub fn invoke_native(
        &mut self,
        name: &str,
        args: Vec<NativeValue>,
    ) -> Result<NativeValue, EngineError> {
        let kind = self
            .natives
            .kind(name)
            .ok_or_else(|| EngineError::UnknownNative(name.to_string()))?;

        for arg in &args {
            if let NativeValue::Fluid(fluid) = arg {
                self.ensure_available(*fluid)?;
            }
        }

        match kind {
            NativeKind::Source => {
                let location = self.allocator.allocate()?;
                if let Some(NativeHandler::Source(handler)) = self.natives.get_mut(name) {
                    handler(&mut self.vm, &args, location);
                }
                let fluid = self.graph.add_native(name.to_string(), args, Some(location));
                Ok(NativeValue::Fluid(fluid))
            }
            NativeKind::Call => {
                let mut result = NativeValue::Unit;
                if let Some(NativeHandler::Call(handler)) = self.natives.get_mut(name) {
                    result = handler(&mut self.vm, &args);
                }
                Ok(result)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Introspection and lifecycle
    // -----------------------------------------------------------------------

    /// Write the dependency graph of every fluid this engine ever created
    /// (consumed ones included) as a dot document at `path`.
    pub fn dump_graph<P: AsRef<Path>>(&self, path: P) -> Result<(), EngineError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.graph.write_dot(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Drop every fluid and operation and return all cells to the pool.
    /// Session boundary: previously returned handles become unknown.
    pub fn reset(&mut self) {
        self.graph.clear();
        self.allocator = CellAllocator::new(self.store, self.allocator.capacity());
    }

    pub fn graph(&self) -> &MixGraph {
        &self.graph
    }

    pub fn vm(&self) -> &V {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut V {
        &mut self.vm
    }

    pub fn mixer(&self) -> MixerId {
        self.mixer
    }

    pub fn store(&self) -> StoreId {
        self.store
    }

    pub fn free_cells(&self) -> u32 {
        self.allocator.free_cells()
    }

    /// High-water mark of simultaneously occupied cells.
    pub fn peak_cells(&self) -> u32 {
        self.allocator.peak_occupied()
    }

    /// Number of fluids currently resident on the chip. Never exceeds the
    /// store capacity.
    pub fn available_fluids(&self) -> usize {
        self.graph.available_count()
    }

    pub fn location_of(&self, fluid: FluidId) -> Option<Location> {
        self.graph.fluid(fluid).and_then(|f| f.location)
    }
}
