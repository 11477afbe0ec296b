//! Native device dispatch: a name-to-handler table built at configuration
//! time.
//!
//! The engine itself only knows how to mix. Everything else a chip can do
//! (sample loading, sensing, waste routing) is a named device call the
//! surrounding layer registers here before the protocol runs. Unknown names
//! fail at call time with a typed error; nothing is generated or compiled at
//! runtime.

use crate::chip::Location;
use crate::id::FluidId;
use std::collections::HashMap;

/// Argument/result values exchanged with native device calls.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Unit,
    Number(f64),
    Text(String),
    Fluid(FluidId),
}

impl NativeValue {
    pub fn as_fluid(&self) -> Option<FluidId> {
        match self {
            NativeValue::Fluid(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            NativeValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// A handler that runs for its side effect or scalar result.
pub type CallHandler<V> = Box<dyn FnMut(&mut V, &[NativeValue]) -> NativeValue>;

/// A handler that fills one storage cell with fluid.
pub type SourceHandler<V> = Box<dyn FnMut(&mut V, &[NativeValue], Location)>;

/// A registered native handler.
///
/// `Source` handlers fill a cell the engine allocates; the engine wraps the
/// cell in a generator-bearing fluid so the call can be replayed when the
/// fluid is consumed and needed again.
pub enum NativeHandler<V> {
    Call(CallHandler<V>),
    Source(SourceHandler<V>),
}

/// Whether a registered handler produces a fluid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeKind {
    Call,
    Source,
}

/// Dispatch table mapping native names to handlers.
pub struct NativeTable<V> {
    handlers: HashMap<String, NativeHandler<V>>,
}

impl<V> NativeTable<V> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` under `name`, replacing any previous handler.
    pub fn register(&mut self, name: impl Into<String>, handler: NativeHandler<V>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn kind(&self, name: &str) -> Option<NativeKind> {
        self.handlers.get(name).map(|h| match h {
            NativeHandler::Call(_) => NativeKind::Call,
            NativeHandler::Source(_) => NativeKind::Source,
        })
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut NativeHandler<V>> {
        self.handlers.get_mut(name)
    }
}

impl<V> Default for NativeTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for NativeTable<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("NativeTable").field("names", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::StoreId;

    struct DummyVm;

    #[test]
    fn register_and_classify_handlers() {
        let mut table: NativeTable<DummyVm> = NativeTable::new();
        table.register(
            "read_sensor",
            NativeHandler::Call(Box::new(|_, _| NativeValue::Number(1.0))),
        );
        table.register("sample", NativeHandler::Source(Box::new(|_, _, _| {})));

        assert_eq!(table.kind("read_sensor"), Some(NativeKind::Call));
        assert_eq!(table.kind("sample"), Some(NativeKind::Source));
        assert_eq!(table.kind("missing"), None);
    }

    #[test]
    fn re_registration_replaces_the_handler() {
        let mut table: NativeTable<DummyVm> = NativeTable::new();
        table.register(
            "port",
            NativeHandler::Call(Box::new(|_, _| NativeValue::Unit)),
        );
        table.register("port", NativeHandler::Source(Box::new(|_, _, _| {})));
        assert_eq!(table.kind("port"), Some(NativeKind::Source));
    }

    #[test]
    fn call_handler_receives_args() {
        let mut table: NativeTable<DummyVm> = NativeTable::new();
        table.register(
            "double",
            NativeHandler::Call(Box::new(|_, args| {
                let n = args.first().and_then(NativeValue::as_number).unwrap_or(0.0);
                NativeValue::Number(2.0 * n)
            })),
        );

        let mut vm = DummyVm;
        let args = vec![NativeValue::Number(21.0)];
        match table.get_mut("double") {
            Some(NativeHandler::Call(f)) => {
                assert_eq!(f(&mut vm, &args), NativeValue::Number(42.0));
            }
            _ => panic!("expected a call handler"),
        }
    }

    #[test]
    fn source_handler_receives_the_output_cell() {
        let mut table: NativeTable<Vec<u32>> = NativeTable::new();
        table.register(
            "sample",
            NativeHandler::Source(Box::new(|vm, _, location| vm.push(location.cell))),
        );

        let mut filled = Vec::new();
        let out = Location {
            store: StoreId(0),
            cell: 7,
        };
        match table.get_mut("sample") {
            Some(NativeHandler::Source(f)) => f(&mut filled, &[], out),
            _ => panic!("expected a source handler"),
        }
        assert_eq!(filled, vec![7]);
    }
}
