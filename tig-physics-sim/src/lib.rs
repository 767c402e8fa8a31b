//! # tig-physics-sim
//!
//! Headless engine for a 2-D particle toy whose dynamics are driven by a
//! single coherence score. Four pairwise force laws act on particles, a ten
//! slot phase spine modulates them tick by tick, and a tree of EMA nodes
//! rolls observed values up into one root score.
//!
//! ```text
//! PhaseSpine ──gains──▶ ForceModel ──pairs──▶ Particles ──▶ BondGraph
//!                                      │                      │
//!                                      ▼                      ▼
//!        TIG ◀── EPOCH ◀── {GRAV, EM, STRONG, WEAK} ◀── X_μ leaves
//! ```
//!
//! ## Constants
//!
//! | Symbol | Value | Role |
//! |--------|-------|------|
//! | σ      | 0.991 | EMA retention, velocity damping |
//! | T*     | 0.714 | Health threshold, initial score |
//! | σ*     | 0.009 | Gravity and repulsion scale |
//! | F      | σ(1−σ*) | Coherence ceiling |
//!
//! ## Usage
//!
//! ```no_run
//! use tig_physics_sim::prelude::*;
//!
//! let mut sim = Simulation::new(SimConfig::default()).expect("valid config");
//! sim.advance(300);
//! sim.inject_chaos(1.0).expect("finite intensity");
//! sim.advance(300);
//! let snap = sim.snapshot();
//! println!("root {:.3} ({})", snap.root_score, snap.root_health);
//! ```

pub mod bonds;
pub mod config;
pub mod constants;
pub mod error;
pub mod experiments;
pub mod field;
pub mod forces;
pub mod particle;
pub mod simulation;
pub mod snapshot;
pub mod spine;
pub mod triad;
pub mod worker;


pub mod prelude {
    pub use crate::bonds::*;
    pub use crate::config::*;
    pub use crate::constants::*;
    pub use crate::error::SimError;
    pub use crate::experiments::*;
    pub use crate::field::*;
    pub use crate::forces::*;
    pub use crate::particle::*;
    pub use crate::simulation::*;
    pub use crate::snapshot::*;
    pub use crate::spine::*;
    pub use crate::triad::*;
    pub use crate::worker::*;
}
