//! Build a reservoir layout and report how it maps onto hardware.
//!
//! Reads an optional YAML parameter file (defaults otherwise), validates it,
//! builds the layout, and prints the constraint table, per-block synapse
//! summary, connection chunk statistics and the cue wiring. With a second
//! argument the masks and weights are saved as a .rsvw snapshot and reloaded
//! to check that the layout replays.
//!
//! Run: cargo run --example build_layout -- [params.yaml] [snapshot.rsvw]

use std::path::Path;
use std::process::ExitCode;

use reservoir_chunks::{NetworkLayout, NetworkParams};

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let params = match args.first() {
        Some(path) => match NetworkParams::load(path) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        },
        None => NetworkParams::default(),
    };

    println!("=== Reservoir Layout ===\n");
    println!("{}", params.constraints);

    let derived = params.constraints.derived();
    println!("Derived: {} neurons, density {:.4}, in-degree {} from E + {} from I, {}+{} cores needed\n",
        derived.reservoir_size, derived.connection_density,
        derived.in_degree.from_ex, derived.in_degree.from_in,
        derived.ex_cores, derived.in_cores);

    let start = std::time::Instant::now();
    let layout = match params.build() {
        Ok(layout) => layout,
        Err(e) => {
            eprintln!("build failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    println!("Built in {:.1?} (seed {})\n", start.elapsed(), params.seed);
    print!("{}", layout.stats());

    match params.cue_wiring(&layout) {
        Ok(cue) => println!("  cue: {} generators onto {} neurons, {} synapses in {} chunks",
            cue.generators(), cue.patch_size(), cue.n_synapses(), cue.chunks().len()),
        Err(e) => {
            eprintln!("cue wiring failed: {e}");
            return ExitCode::FAILURE;
        }
    }

    if let Some(out) = args.get(1) {
        let path = Path::new(out);
        if let Err(e) = layout.save(path) {
            eprintln!("save failed: {e}");
            return ExitCode::FAILURE;
        }
        match NetworkLayout::load(path) {
            Ok(replayed) if replayed.connection_chunks() == layout.connection_chunks() => {
                println!("\nSnapshot written to {} and replayed", path.display());
            }
            Ok(_) => {
                eprintln!("snapshot replay produced a different layout");
                return ExitCode::FAILURE;
            }
            Err(e) => {
                eprintln!("reload failed: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}
