//! Dependency-graph dump example: native sources feeding a mixing tree.
//!
//! Builds a 3:1 mix from two sampled reagents, dumps the engine's full
//! dependency graph (consumed fluids included) as dot, and prints the
//! document. Render it with `dot -Tpng` to see the tree.
//!
//! Run with: `cargo run -p droplet-examples --example graph_dump`

use droplet_core::engine::Engine;
use droplet_core::native::NativeHandler;
use droplet_sim::{ReagentId, SimChip};

fn main() {
    let sample = ReagentId(0);
    let buffer = ReagentId(1);

    let mut engine = Engine::new(SimChip::with_one_to_one(8)).expect("sim chip supports mixing");
    engine.register_native(
        "sample_port",
        NativeHandler::Source(Box::new(move |chip: &mut SimChip, _, location| {
            chip.load_pure(location, sample);
        })),
    );
    engine.register_native(
        "buffer_port",
        NativeHandler::Source(Box::new(move |chip: &mut SimChip, _, location| {
            chip.load_pure(location, buffer);
        })),
    );

    let s = engine
        .invoke_native("sample_port", vec![])
        .expect("sample port registered")
        .as_fluid()
        .expect("source yields a fluid");
    let b = engine
        .invoke_native("buffer_port", vec![])
        .expect("buffer port registered")
        .as_fluid()
        .expect("source yields a fluid");

    let result = engine
        .mix(&[s, b], &[3.0, 1.0])
        .expect("3:1 is achievable at default precision");

    let location = engine.location_of(result).expect("result is resident");
    let contents = engine.vm().contents(location).expect("result cell is filled");
    println!(
        "3:1 mix realized as sample={:.3}, buffer={:.3}\n",
        contents.fraction(sample),
        contents.fraction(buffer)
    );

    let path = std::env::temp_dir().join("droplet_graph.dot");
    engine.dump_graph(&path).expect("dot file is writable");
    println!("graph written to {}", path.display());
    println!("{}", std::fs::read_to_string(&path).expect("dot file readable"));
}
