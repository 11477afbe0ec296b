//! End-to-end mixing tests against the software chip.
//!
//! These drive the full stack -- engine, planner, allocator, and the sim
//! chip's composition tracking -- and check the realized mixtures, not just
//! the shape of the call sequence.

use droplet_core::engine::{Engine, EngineError};
use droplet_core::native::NativeHandler;
use droplet_sim::{ReagentId, SimChip};

// ===========================================================================
// Reagent constructors
// ===========================================================================

fn red() -> ReagentId {
    ReagentId(0)
}
fn blue() -> ReagentId {
    ReagentId(1)
}
fn water() -> ReagentId {
    ReagentId(2)
}

// ===========================================================================
// Helpers
// ===========================================================================

/// A source handler that fills its cell with one pure reagent.
fn source_for(reagent: ReagentId) -> NativeHandler<SimChip> {
    NativeHandler::Source(Box::new(move |chip: &mut SimChip, _args, location| {
        chip.load_pure(location, reagent);
    }))
}

/// An engine on a fresh sim chip with sources for red, blue, and water.
fn sim_engine(cells: u32) -> Engine<SimChip> {
    let mut engine = Engine::new(SimChip::with_one_to_one(cells)).unwrap();
    engine.register_native("red", source_for(red()));
    engine.register_native("blue", source_for(blue()));
    engine.register_native("water", source_for(water()));
    engine
}

fn sample(engine: &mut Engine<SimChip>, name: &str) -> droplet_core::id::FluidId {
    engine
        .invoke_native(name, vec![])
        .unwrap()
        .as_fluid()
        .unwrap()
}

/// The realized volume fraction of `reagent` in `fluid`'s cell.
fn fraction_of(engine: &Engine<SimChip>, fluid: droplet_core::id::FluidId, reagent: ReagentId) -> f64 {
    let location = engine.location_of(fluid).unwrap();
    engine.vm().contents(location).unwrap().fraction(reagent)
}

// ===========================================================================
// Tests
// ===========================================================================

#[test]
fn equal_mix_realizes_fifty_fifty_with_one_operation() {
    let mut engine = sim_engine(4);
    engine.set_precision(0.5).unwrap();
    let a = sample(&mut engine, "red");
    let b = sample(&mut engine, "blue");

    let root = engine.mix(&[a, b], &[1.0, 1.0]).unwrap();

    // Depth 1: a single 1:1 mix.
    assert_eq!(engine.vm().trace.len(), 1);
    assert!((fraction_of(&engine, root, red()) - 0.5).abs() < 1e-9);
    assert!((fraction_of(&engine, root, blue()) - 0.5).abs() < 1e-9);
}

#[test]
fn three_to_one_mix_is_accurate_to_the_precision_bound() {
    // Capacity 3 is exactly the peak this tree needs: left subtrees finish
    // and release their cells before right subtrees start.
    let mut engine = sim_engine(3);
    let a = sample(&mut engine, "red");
    let b = sample(&mut engine, "blue");

    let root = engine.mix(&[a, b], &[3.0, 1.0]).unwrap();

    // Depth 2, k = [3, 1]: one leaf sits directly at level 1, saving one
    // of the three mixes of a full depth-2 tree.
    assert_eq!(engine.graph().mix_operation_count(), 2);
    assert_eq!(engine.vm().trace.len(), 2);
    assert_eq!(engine.peak_cells(), 3);

    assert!((fraction_of(&engine, root, red()) - 0.75).abs() <= 0.001);
    assert!((fraction_of(&engine, root, blue()) - 0.25).abs() <= 0.001);
}

#[test]
fn regenerable_sources_replay_when_a_leaf_is_needed_twice() {
    let mut engine = sim_engine(3);
    let a = sample(&mut engine, "red");
    let b = sample(&mut engine, "blue");
    engine.mix(&[a, b], &[3.0, 1.0]).unwrap();

    // k = [3, 1] places the red leaf at two levels: consumed by the inner
    // mix, regenerated for the root mix. Two initial fills plus one replay.
    assert_eq!(engine.vm().loads.len(), 3);
}

#[test]
fn serial_dilution_halves_the_concentration_each_step() {
    let mut engine = sim_engine(4);
    let dye = sample(&mut engine, "blue");
    let mut current = dye;

    let water_fluid = sample(&mut engine, "water");
    for step in 1..=4 {
        current = engine.mix(&[current, water_fluid], &[1.0, 1.0]).unwrap();
        let expected = 1.0 / (1u32 << step) as f64;
        assert!((fraction_of(&engine, current, blue()) - expected).abs() < 1e-9);
    }
}

#[test]
fn availability_stays_within_capacity_throughout() {
    let mut engine = sim_engine(3);
    let a = sample(&mut engine, "red");
    let b = sample(&mut engine, "blue");
    engine.mix(&[a, b], &[3.0, 1.0]).unwrap();

    assert!(engine.available_fluids() <= 3);
    assert_eq!(engine.peak_cells(), 3);
}

#[test]
fn a_mix_frees_exactly_its_two_inputs() {
    let mut engine = sim_engine(4);
    let a = sample(&mut engine, "red");
    let b = sample(&mut engine, "blue");
    let bystander = sample(&mut engine, "water");

    let root = engine.mix(&[a, b], &[1.0, 1.0]).unwrap();

    assert!(engine.location_of(a).is_none());
    assert!(engine.location_of(b).is_none());
    assert!(engine.location_of(bystander).is_some());
    assert!(engine.location_of(root).is_some());
    // bystander + root resident, two cells free again.
    assert_eq!(engine.free_cells(), 2);
}

#[test]
fn too_small_a_store_fails_cleanly_and_recovers() {
    let mut engine = sim_engine(3);
    let a = sample(&mut engine, "red");
    let b = sample(&mut engine, "blue");
    let hog = sample(&mut engine, "water");

    let err = engine.mix(&[a, b], &[1.0, 1.0]).unwrap_err();
    assert!(matches!(err, EngineError::Storage(_)));
    // The failed attempt left the inputs bound and the table consistent.
    assert!(engine.location_of(a).is_some());
    assert!(engine.location_of(b).is_some());
    assert_eq!(engine.free_cells(), 0);

    engine.release(hog).unwrap();
    let root = engine.mix(&[a, b], &[1.0, 1.0]).unwrap();
    assert!((fraction_of(&engine, root, red()) - 0.5).abs() < 1e-9);
}

#[test]
fn five_way_mix_realizes_every_target_fraction() {
    let mut engine = sim_engine(16);
    engine.set_precision(0.01).unwrap();

    let fluids = [
        sample(&mut engine, "red"),
        sample(&mut engine, "blue"),
        sample(&mut engine, "water"),
        sample(&mut engine, "red"),
        sample(&mut engine, "blue"),
    ];
    let weights = [5.0, 4.0, 3.0, 2.0, 1.0];
    let root = engine.mix(&fluids, &weights).unwrap();

    // Two red sources and two blue sources: fractions add per reagent.
    let total: f64 = weights.iter().sum();
    let location = engine.location_of(root).unwrap();
    let contents = engine.vm().contents(location).unwrap();
    assert!((contents.fraction(red()) - (5.0 + 2.0) / total).abs() <= 0.02 + 1e-9);
    assert!((contents.fraction(blue()) - (4.0 + 1.0) / total).abs() <= 0.02 + 1e-9);
    assert!((contents.fraction(water()) - 3.0 / total).abs() <= 0.01 + 1e-9);
}

#[test]
fn an_engine_tolerates_chips_with_extra_stores() {
    use droplet_core::chip::{ChipTopology, Mixer, Store};
    let topology = ChipTopology {
        mixers: vec![Mixer {
            name: "mixer0".into(),
            ratio: vec![1, 1],
        }],
        stores: vec![
            Store {
                name: "bank0".into(),
                capacity: 4,
            },
            Store {
                name: "bank1".into(),
                capacity: 16,
            },
        ],
    };
    let mut engine = Engine::new(SimChip::new(topology)).unwrap();
    engine.register_native("red", source_for(red()));
    engine.register_native("blue", source_for(blue()));

    let a = sample(&mut engine, "red");
    let b = sample(&mut engine, "blue");
    let root = engine.mix(&[a, b], &[1.0, 1.0]).unwrap();
    // Only the first store is driven.
    assert_eq!(engine.free_cells(), 3);
    assert!((fraction_of(&engine, root, red()) - 0.5).abs() < 1e-9);
}

#[test]
fn loaded_chip_descriptions_drive_the_engine() {
    let json = r#"{
        "mixers": [{"name": "even", "ratio": [1, 1]}],
        "stores": [{"name": "bank0", "capacity": 6}]
    }"#;
    let topology = droplet_core::chip_loader::load_topology_json(json).unwrap();
    let mut engine = Engine::new(SimChip::new(topology)).unwrap();
    engine.register_native("red", source_for(red()));
    engine.register_native("water", source_for(water()));

    let a = sample(&mut engine, "red");
    let w = sample(&mut engine, "water");
    let root = engine.mix(&[a, w], &[1.0, 3.0]).unwrap();
    assert!((fraction_of(&engine, root, red()) - 0.25).abs() <= 0.001);
}
