//! Headless run: steps the default system, prints a per-epoch table, shakes it
//! once halfway, and dumps the final snapshot as JSON.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example headless_run

use tig_physics_sim::prelude::*;

fn main() {
    env_logger::init();

    let config = SimConfig::default();
    let ticks = 600;
    let mut sim = match Simulation::new(config) {
        Ok(sim) => sim,
        Err(e) => {
            eprintln!("failed to build simulation: {e}");
            std::process::exit(1);
        }
    };

    println!("tick,epoch,root,health,bonds,coherent_fraction,weak_swaps");
    for tick in 1..=ticks {
        let stats = sim.step();
        if tick == ticks / 2 {
            if let Err(e) = sim.inject_chaos(0.8) {
                eprintln!("chaos rejected: {e}");
            }
        }
        if stats.phase == 0 && stats.epoch % 5 == 0 {
            let snap = sim.snapshot();
            println!(
                "{},{},{:.4},{},{},{:.3},{}",
                snap.tick,
                snap.epoch,
                snap.root_score,
                snap.root_health,
                snap.bonds.current,
                snap.coherent_fraction(),
                stats.weak_swaps
            );
        }
    }

    println!();
    match serde_json::to_string_pretty(&sim.snapshot()) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to serialise snapshot: {e}"),
    }
}
