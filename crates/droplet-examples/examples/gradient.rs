//! Concentration gradient example: weighted mixes on the software chip.
//!
//! Registers two reagent sources, then asks the engine for a series of
//! dye/water ratios and prints the realized concentration next to the
//! requested one. Demonstrates how tighter precision bounds buy deeper
//! mixing trees.
//!
//! Run with: `cargo run -p droplet-examples --example gradient`

use droplet_core::engine::Engine;
use droplet_core::native::NativeHandler;
use droplet_sim::{ReagentId, SimChip};

fn main() {
    let dye = ReagentId(0);
    let water = ReagentId(1);

    let mut engine = Engine::new(SimChip::with_one_to_one(12)).expect("sim chip supports mixing");
    engine.register_native(
        "dye",
        NativeHandler::Source(Box::new(move |chip: &mut SimChip, _, location| {
            chip.load_pure(location, dye);
        })),
    );
    engine.register_native(
        "water",
        NativeHandler::Source(Box::new(move |chip: &mut SimChip, _, location| {
            chip.load_pure(location, water);
        })),
    );

    println!("=== Gradient: dye fraction 0.1 .. 0.9, precision 0.01 ===\n");
    engine.set_precision(0.01).expect("precision in range");

    for step in 1..=9 {
        let target = step as f64 / 10.0;

        let d = engine
            .invoke_native("dye", vec![])
            .expect("dye source registered")
            .as_fluid()
            .expect("source yields a fluid");
        let w = engine
            .invoke_native("water", vec![])
            .expect("water source registered")
            .as_fluid()
            .expect("source yields a fluid");

        let mixes_before = engine.vm().trace.len();
        let result = engine
            .mix(&[d, w], &[target, 1.0 - target])
            .expect("gradient ratio is achievable");

        let location = engine.location_of(result).expect("result is resident");
        let achieved = engine
            .vm()
            .contents(location)
            .expect("result cell is filled")
            .fraction(dye);
        println!(
            "target {:.2}: achieved {:.4} using {} mixes",
            target,
            achieved,
            engine.vm().trace.len() - mixes_before
        );

        // Make room for the next gradient point.
        engine.release(result).expect("result is known");
    }

    println!("\n=== Same targets at precision 0.1: shallower trees ===\n");
    engine.set_precision(0.1).expect("precision in range");

    for step in [1, 3, 5] {
        let target = step as f64 / 10.0;
        let d = engine
            .invoke_native("dye", vec![])
            .expect("dye source registered")
            .as_fluid()
            .expect("source yields a fluid");
        let w = engine
            .invoke_native("water", vec![])
            .expect("water source registered")
            .as_fluid()
            .expect("source yields a fluid");

        let mixes_before = engine.vm().trace.len();
        let result = engine
            .mix(&[d, w], &[target, 1.0 - target])
            .expect("coarse ratio is achievable");
        let location = engine.location_of(result).expect("result is resident");
        let achieved = engine
            .vm()
            .contents(location)
            .expect("result cell is filled")
            .fraction(dye);
        println!(
            "target {:.2}: achieved {:.4} using {} mixes",
            target,
            achieved,
            engine.vm().trace.len() - mixes_before
        );
        engine.release(result).expect("result is known");
    }
}
