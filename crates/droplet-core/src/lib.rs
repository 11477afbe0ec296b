//! Droplet Core -- a symbolic mixing engine for programmable microfluidic
//! chips.
//!
//! This crate models a chip as a small virtual machine -- a fixed set of
//! storage cells and a 1:1 mixing unit behind the [`chip::ChipVm`]
//! capability trait -- and layers a symbolic engine on top of it: callers
//! request an arbitrary weighted mix of fluids, and the engine decomposes
//! the ratio into feasible 1:1 mixes, builds a dependency graph of mixing
//! operations, and allocates and frees the chip's limited cells as the
//! graph materializes.
//!
//! # Demand-Driven Materialization
//!
//! A fluid is either *materialized* (bound to a storage cell) or *virtual*
//! (defined by the operation that would produce it). [`engine::Engine::mix`]
//! plans a tree of virtual fluids, then forces the root; each operation
//! recursively materializes its inputs left-to-right, runs on the chip, and
//! consumes the cells it read. Consumed fluids with a generator can come
//! back by re-running it; single-use fluids cannot.
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- setup, precision, `mix`, native dispatch, and
//!   the dependency-graph dump.
//! - [`planner`] -- pure ratio decomposition: smallest feasible mixing-tree
//!   depth and integer numerators within a precision bound.
//! - [`graph::MixGraph`] -- per-engine arena of fluid and operation nodes.
//! - [`allocator::CellAllocator`] -- first-free storage-cell allocation.
//! - [`chip::ChipTopology`] / [`chip::ChipVm`] -- the chip model and the
//!   capability surface a backend implements.
//! - [`chip_loader`] -- JSON chip descriptions (feature `data-loader`).

pub mod allocator;
pub mod chip;
#[cfg(feature = "data-loader")]
pub mod chip_loader;
pub mod engine;
pub mod graph;
pub mod id;
pub mod native;
pub mod planner;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
