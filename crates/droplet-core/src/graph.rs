//! The mixing graph: an engine-owned arena of fluid and operation nodes.
//!
//! Every fluid the engine ever creates lives here until [`MixGraph::clear`],
//! including fluids whose storage cell has long been consumed. That is what
//! makes the dependency dump complete: the graph is the engine's memory of
//! how each fluid came to be, not a picture of what is currently on the
//! chip.

use crate::chip::Location;
use crate::id::{FluidId, OperationId};
use crate::native::NativeValue;
use slotmap::SlotMap;
use std::io::{self, Write};

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// A fluid node: symbolic handle to a quantity of liquid.
#[derive(Debug, Clone)]
pub struct FluidNode {
    /// Creation order within the owning engine. Drives deterministic dumps.
    pub serial: u32,
    /// Operation that (re)generates this fluid. `None` marks a single-use
    /// fluid supplied by the surrounding layer; such a fluid keeps its cell
    /// until consumed and can never come back afterwards.
    pub generator: Option<OperationId>,
    /// Cell currently holding this fluid; `None` while virtual or consumed.
    pub location: Option<Location>,
}

impl FluidNode {
    /// Whether a unit of this fluid is resident on the chip right now.
    pub fn available(&self) -> bool {
        self.location.is_some()
    }
}

/// What an operation does and which fluids feed it.
#[derive(Debug, Clone)]
pub enum OperationKind {
    /// A mix of exactly two input fluids at equal declared weights.
    /// Consumes both inputs when it runs.
    Mix {
        inputs: [FluidId; 2],
        ratio: [u32; 2],
    },
    /// An opaque named device call. Fluid-typed args are graph edges; args
    /// are retained so the call can be replayed to regenerate its output.
    Native {
        name: String,
        args: Vec<NativeValue>,
    },
}

impl OperationKind {
    /// The fluid inputs of this operation, in declared order.
    pub fn fluid_inputs(&self) -> Vec<FluidId> {
        match self {
            OperationKind::Mix { inputs, .. } => inputs.to_vec(),
            OperationKind::Native { args, .. } => {
                args.iter().filter_map(NativeValue::as_fluid).collect()
            }
        }
    }
}

/// An operation node: produces exactly one fluid.
#[derive(Debug, Clone)]
pub struct OperationNode {
    pub serial: u32,
    pub kind: OperationKind,
    /// The fluid this operation produces.
    pub output: FluidId,
}

// ---------------------------------------------------------------------------
// MixGraph
// ---------------------------------------------------------------------------

/// Arena of every fluid and operation one engine instance has created.
///
/// Scoped to the engine, never process-wide. Nodes are only removed by
/// [`MixGraph::clear`], so slot iteration follows creation order and the
/// dot dump is deterministic for a fixed call sequence.
#[derive(Debug, Default)]
pub struct MixGraph {
    fluids: SlotMap<FluidId, FluidNode>,
    ops: SlotMap<OperationId, OperationNode>,
    next_serial: u32,
}

impl MixGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_serial(&mut self) -> u32 {
        let serial = self.next_serial;
        self.next_serial += 1;
        serial
    }

    /// Wrap an externally filled cell as a single-use fluid with no
    /// generator.
    pub fn add_external(&mut self, location: Location) -> FluidId {
        let serial = self.next_serial();
        self.fluids.insert(FluidNode {
            serial,
            generator: None,
            location: Some(location),
        })
    }

    /// Add a 1:1 mix operation over `inputs` and the virtual fluid it
    /// produces. The fluid stays virtual until the engine materializes it.
    pub fn add_mix(&mut self, inputs: [FluidId; 2]) -> FluidId {
        let op_serial = self.next_serial();
        let op = self.ops.insert(OperationNode {
            serial: op_serial,
            kind: OperationKind::Mix {
                inputs,
                ratio: [1, 1],
            },
            output: FluidId::default(),
        });
        let fluid_serial = self.next_serial();
        let fluid = self.fluids.insert(FluidNode {
            serial: fluid_serial,
            generator: Some(op),
            location: None,
        });
        self.ops[op].output = fluid;
        fluid
    }

    /// Add a native operation and its output fluid, already bound to
    /// `location` when the device call has filled a cell.
    pub fn add_native(
        &mut self,
        name: String,
        args: Vec<NativeValue>,
        location: Option<Location>,
    ) -> FluidId {
        let op_serial = self.next_serial();
        let op = self.ops.insert(OperationNode {
            serial: op_serial,
            kind: OperationKind::Native { name, args },
            output: FluidId::default(),
        });
        let fluid_serial = self.next_serial();
        let fluid = self.fluids.insert(FluidNode {
            serial: fluid_serial,
            generator: Some(op),
            location,
        });
        self.ops[op].output = fluid;
        fluid
    }

    pub fn fluid(&self, id: FluidId) -> Option<&FluidNode> {
        self.fluids.get(id)
    }

    pub fn operation(&self, id: OperationId) -> Option<&OperationNode> {
        self.ops.get(id)
    }

    pub fn contains_fluid(&self, id: FluidId) -> bool {
        self.fluids.contains_key(id)
    }

    pub fn fluid_count(&self) -> usize {
        self.fluids.len()
    }

    pub fn operation_count(&self) -> usize {
        self.ops.len()
    }

    /// Number of mix operations (native operations excluded).
    pub fn mix_operation_count(&self) -> usize {
        self.ops
            .values()
            .filter(|op| matches!(op.kind, OperationKind::Mix { .. }))
            .count()
    }

    /// Number of fluids currently resident on the chip.
    pub fn available_count(&self) -> usize {
        self.fluids.values().filter(|f| f.available()).count()
    }

    /// Bind a freshly allocated cell to a virtual fluid.
    pub fn bind_location(&mut self, id: FluidId, location: Location) {
        if let Some(fluid) = self.fluids.get_mut(id) {
            debug_assert!(fluid.location.is_none());
            fluid.location = Some(location);
        }
    }

    /// Take the fluid's cell away, leaving it virtual. Returns the cell so
    /// the caller can hand it back to the allocator.
    pub fn take_location(&mut self, id: FluidId) -> Option<Location> {
        self.fluids.get_mut(id).and_then(|f| f.location.take())
    }

    pub fn fluids(&self) -> impl Iterator<Item = (FluidId, &FluidNode)> {
        self.fluids.iter()
    }

    pub fn operations(&self) -> impl Iterator<Item = (OperationId, &OperationNode)> {
        self.ops.iter()
    }

    /// Drop every node. Session boundary: previously returned ids become
    /// unknown to this graph.
    pub fn clear(&mut self) {
        self.fluids.clear();
        self.ops.clear();
        self.next_serial = 0;
    }

    // -----------------------------------------------------------------------
    // Dot serialization
    // -----------------------------------------------------------------------

    /// Write the whole graph as a dot document.
    ///
    /// One node line per fluid ever created (consumed ones included), one
    /// node line per operation (box for mixes, diamond labelled with the
    /// native name otherwise), an edge operation -> output fluid, and an
    /// edge fluid -> operation per fluid input.
    pub fn write_dot<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "digraph G {{")?;
        writeln!(w, "size=\"6.5,9\";")?;

        let mut fluids: Vec<&FluidNode> = self.fluids.values().collect();
        fluids.sort_by_key(|f| f.serial);
        for fluid in &fluids {
            writeln!(w, "fluid{} [label=\"fluid\"];", fluid.serial)?;
        }

        let mut ops: Vec<&OperationNode> = self.ops.values().collect();
        ops.sort_by_key(|o| o.serial);
        for op in &ops {
            match &op.kind {
                OperationKind::Mix { .. } => {
                    writeln!(w, "oper{} [shape=\"box\",label=\"mix\"];", op.serial)?;
                }
                OperationKind::Native { name, .. } => {
                    writeln!(w, "oper{} [shape=\"diamond\",label=\"{}\"];", op.serial, name)?;
                }
            }
            if let Some(output) = self.fluids.get(op.output) {
                writeln!(w, "oper{} -> fluid{};", op.serial, output.serial)?;
            }
            for input in op.kind.fluid_inputs() {
                if let Some(fluid) = self.fluids.get(input) {
                    writeln!(w, "fluid{} -> oper{};", fluid.serial, op.serial)?;
                }
            }
        }

        writeln!(w, "}}")?;
        Ok(())
    }
}
