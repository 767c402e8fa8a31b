//! Runs the validation suite and prints the report as JSON.
//!
//!   cargo run --release --example validation
//!   cargo run --example validation -- quick

use tig_physics_sim::prelude::*;

fn main() {
    env_logger::init();

    let config = match std::env::args().nth(1).as_deref() {
        Some("quick") => ValidationConfig::quick(40),
        _ => ValidationConfig::default(),
    };
    let report = match run_validation(&config) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("validation failed: {e}");
            std::process::exit(1);
        }
    };

    let s = &report.structure;
    println!(
        "structure: {} bonds (peak {}, lifetime {}), {} growth nodes, formed = {}",
        s.bonds,
        s.peak_bonds,
        s.lifetime_bonds,
        s.growth_nodes,
        s.structure_formed()
    );
    match report.recovery.recovered_after {
        Some(t) => println!("recovery: {} ticks after chaos", t),
        None => println!("recovery: not within {} ticks", config.recovery_ticks),
    }
    println!(
        "propagation efficiency {:.3}, domain cv {:.3}, spine cv {:.4}",
        report.propagation.efficiency, report.domains.cv, report.spine.spread.cv
    );
    println!(
        "sustained chaos: engine mean {:.3} min {:.3}, baseline mean {:.3} min {:.3}",
        report.sustained.engine.mean,
        report.sustained.engine_min,
        report.sustained.baseline.mean,
        report.sustained.baseline_min
    );

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to serialise report: {e}"),
    }
}
