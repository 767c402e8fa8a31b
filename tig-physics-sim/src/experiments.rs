//! Validation experiments over the engine.
//!
//! Each experiment drives one or more seeded simulations and reduces the run
//! to a small serialisable result:
//! 1. Structure formation: bonds and growth nodes appear without input
//! 2. Chaos recovery: ticks until the root score regains 90% of its pre-chaos value
//! 3. Propagation: how much of each leaf score survives one level up, and leaf-to-root
//! 4. Spine equilibrium: spread of the ten slots after a long run
//! 5. Domain spread: how closely the four force domains agree
//! 6. Sustained chaos: periodic bursts against a fixed-recovery baseline

use std::collections::BTreeMap;

use rand::Rng;
use serde::Serialize;

use crate::config::SimConfig;
use crate::error::{ensure_finite, Result};
use crate::simulation::{node, Simulation};
use crate::snapshot::Snapshot;
use crate::spine::PhaseSpine;

/// Fraction of the pre-chaos root score that counts as recovered.
const RECOVERY_FRACTION: f64 = 0.9;
/// Baseline loss per chaos tick in the sustained-chaos comparison.
const BASELINE_CHAOS_RETAIN: f64 = 0.7;
/// Baseline pull toward T* per quiet tick.
const BASELINE_RECOVERY_RATE: f64 = 0.01;
const BASELINE_FLOOR: f64 = 0.05;

/// Run lengths for [`run_validation`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationConfig {
    /// Engine settings shared by every experiment. Each experiment offsets the seed.
    pub sim: SimConfig,
    /// Ticks run before any measurement.
    pub warmup: usize,
    /// Ticks of the structure-formation run.
    pub structure_ticks: usize,
    /// Timeline sampling interval.
    pub sample_every: usize,
    /// Upper bound on ticks waited for recovery.
    pub recovery_ticks: usize,
    /// Ticks before reading propagation and domain scores.
    pub propagation_ticks: usize,
    /// Ticks before reading the spine.
    pub spine_ticks: usize,
    /// Ticks of the sustained-chaos run.
    pub sustained_ticks: usize,
    pub sustained: SustainedChaos,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            sim: SimConfig::default(),
            warmup: 200,
            structure_ticks: 2_000,
            sample_every: 10,
            recovery_ticks: 3_000,
            propagation_ticks: 500,
            spine_ticks: 5_000,
            sustained_ticks: 2_000,
            sustained: SustainedChaos::default(),
        }
    }
}

impl ValidationConfig {
    /// Short runs for smoke tests.
    pub fn quick(particle_count: usize) -> Self {
        Self {
            sim: SimConfig::small(particle_count),
            warmup: 20,
            structure_ticks: 100,
            sample_every: 10,
            recovery_ticks: 100,
            propagation_ticks: 50,
            spine_ticks: 100,
            sustained_ticks: 120,
            sustained: SustainedChaos::default(),
        }
    }
}

/// Periodic chaos schedule: `burst` ticks of chaos at the start of every `period`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SustainedChaos {
    pub period: usize,
    pub burst: usize,
    pub intensity: f64,
}

impl Default for SustainedChaos {
    fn default() -> Self {
        Self {
            period: 40,
            burst: 10,
            intensity: 0.4,
        }
    }
}

impl SustainedChaos {
    fn is_burst(&self, tick: usize) -> bool {
        self.period > 0 && tick % self.period < self.burst
    }
}

/// Mean, sample standard deviation and coefficient of variation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Spread {
    pub mean: f64,
    pub std_dev: f64,
    /// `std_dev / mean`, 0 when the mean is not positive.
    pub cv: f64,
}

impl Spread {
    pub fn of(values: &[f64]) -> Self {
        let n = values.len();
        if n == 0 {
            return Self::default();
        }
        let mean = values.iter().sum::<f64>() / n as f64;
        let std_dev = if n > 1 {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        } else {
            0.0
        };
        let cv = if mean > 0.0 { std_dev / mean } else { 0.0 };
        Self { mean, std_dev, cv }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureReport {
    pub root_score: f64,
    pub bonds: usize,
    pub peak_bonds: usize,
    pub lifetime_bonds: u64,
    pub triad_nodes: usize,
    /// Nodes beyond the initial tree.
    pub growth_nodes: usize,
    /// Share of particles with `s ≥ T*`.
    pub above_threshold: f64,
    pub bond_timeline: Vec<usize>,
    pub node_timeline: Vec<usize>,
    pub root_timeline: Vec<f64>,
}

impl StructureReport {
    /// Bonds formed and the tree grew.
    pub fn structure_formed(&self) -> bool {
        self.lifetime_bonds > 0 && self.growth_nodes > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryReport {
    pub intensity: f64,
    pub pre_root: f64,
    pub pre_bonds: usize,
    pub post_bonds: usize,
    /// Ticks after the pulse until the root regained 90% of `pre_root`.
    pub recovered_after: Option<usize>,
    pub final_root: f64,
    pub final_bonds: usize,
    pub root_timeline: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropagationReport {
    /// Domain score over its leaf score, per domain.
    pub retention: BTreeMap<String, f64>,
    pub mean_leaf: f64,
    pub root: f64,
    /// Root score over the mean leaf score.
    pub efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpineReport {
    pub values: Vec<f64>,
    pub epoch: u64,
    pub spread: Spread,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SustainedReport {
    pub schedule: SustainedChaos,
    pub engine: Spread,
    pub engine_min: f64,
    /// Share of ticks with root `≥ T*`.
    pub engine_above: f64,
    pub mean_bonds: f64,
    pub baseline: Spread,
    pub baseline_min: f64,
    pub baseline_above: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub structure: StructureReport,
    pub recovery: RecoveryReport,
    pub propagation: PropagationReport,
    pub spine: SpineReport,
    pub domains: Spread,
    pub sustained: SustainedReport,
}

/// Run `ticks` steps after the current state, sampling every `sample_every` ticks.
pub fn structure_formation<R: Rng>(
    sim: &mut Simulation<R>,
    ticks: usize,
    sample_every: usize,
) -> StructureReport {
    let initial_nodes = sim.triads().node_count();
    let every = sample_every.max(1);
    let mut bond_timeline = Vec::with_capacity(ticks / every + 1);
    let mut node_timeline = Vec::with_capacity(ticks / every + 1);
    let mut root_timeline = Vec::with_capacity(ticks / every + 1);
    for i in 0..ticks {
        let stats = sim.step();
        if i % every == 0 {
            bond_timeline.push(sim.bonds().len());
            node_timeline.push(sim.triads().node_count());
            root_timeline.push(stats.root_score);
        }
    }
    let snap = sim.snapshot();
    StructureReport {
        root_score: snap.root_score,
        bonds: snap.bonds.current,
        peak_bonds: snap.bonds.peak,
        lifetime_bonds: snap.bonds.lifetime,
        triad_nodes: snap.triad_nodes,
        growth_nodes: snap.triad_nodes.saturating_sub(initial_nodes),
        above_threshold: snap.coherent_fraction(),
        bond_timeline,
        node_timeline,
        root_timeline,
    }
}

/// Apply one chaos pulse and watch the root score for up to `max_ticks`.
pub fn chaos_recovery<R: Rng>(
    sim: &mut Simulation<R>,
    intensity: f64,
    max_ticks: usize,
) -> Result<RecoveryReport> {
    let intensity = ensure_finite("chaos intensity", intensity)?;
    let pre_root = sim.triads().score();
    let pre_bonds = sim.bonds().len();
    sim.inject_chaos(intensity)?;
    let post_bonds = sim.bonds().len();

    let target = pre_root * RECOVERY_FRACTION;
    let mut recovered_after = None;
    let mut root_timeline = Vec::with_capacity(max_ticks);
    for i in 0..max_ticks {
        let root = sim.step().root_score;
        root_timeline.push(root);
        if recovered_after.is_none() && root >= target {
            recovered_after = Some(i + 1);
        }
    }
    log::debug!(
        "chaos {:.2}: bonds {} -> {}, recovered after {:?}",
        intensity,
        pre_bonds,
        post_bonds,
        recovered_after
    );
    Ok(RecoveryReport {
        intensity,
        pre_root,
        pre_bonds,
        post_bonds,
        recovered_after,
        final_root: sim.triads().score(),
        final_bonds: sim.bonds().len(),
        root_timeline,
    })
}

/// Leaf-to-domain retention and leaf-to-root efficiency from a snapshot.
pub fn propagation(snapshot: &Snapshot) -> PropagationReport {
    let retention: BTreeMap<String, f64> = node::DOMAINS
        .iter()
        .filter_map(|(domain, _)| Some((domain.to_string(), snapshot.retention(domain)?)))
        .collect();
    let leaves: Vec<f64> = snapshot.leaf_scores.values().copied().collect();
    let mean_leaf = Spread::of(&leaves).mean;
    let efficiency = if mean_leaf > 0.0 {
        snapshot.root_score / mean_leaf
    } else {
        0.0
    };
    PropagationReport {
        retention,
        mean_leaf,
        root: snapshot.root_score,
        efficiency,
    }
}

pub fn spine_equilibrium(spine: &PhaseSpine) -> SpineReport {
    SpineReport {
        values: spine.values().to_vec(),
        epoch: spine.epoch(),
        spread: Spread::of(spine.values()),
    }
}

/// Agreement between the four force domain scores.
pub fn domain_spread(snapshot: &Snapshot) -> Spread {
    let scores: Vec<f64> = snapshot.domain_scores.values().copied().collect();
    Spread::of(&scores)
}

/// Drive `sim` through the chaos schedule, alongside a baseline that loses a
/// fixed share per burst tick and recovers linearly toward T* otherwise.
pub fn sustained_chaos<R: Rng>(
    sim: &mut Simulation<R>,
    ticks: usize,
    schedule: SustainedChaos,
) -> Result<SustainedReport> {
    let t_star = sim.constants().t_star;
    let mut engine = Vec::with_capacity(ticks);
    let mut baseline = Vec::with_capacity(ticks);
    let mut bonds = 0usize;
    let mut base = t_star;
    for i in 0..ticks {
        if schedule.is_burst(i) {
            sim.inject_chaos(schedule.intensity)?;
            base *= BASELINE_CHAOS_RETAIN;
        } else {
            base += (t_star - base) * BASELINE_RECOVERY_RATE;
        }
        base = base.clamp(BASELINE_FLOOR, 1.0);
        engine.push(sim.step().root_score);
        baseline.push(base);
        bonds += sim.bonds().len();
    }
    let above = |xs: &[f64]| fraction(xs.iter().filter(|s| **s >= t_star).count(), xs.len());
    Ok(SustainedReport {
        schedule,
        engine: Spread::of(&engine),
        engine_min: min(&engine),
        engine_above: above(&engine),
        mean_bonds: if ticks == 0 { 0.0 } else { bonds as f64 / ticks as f64 },
        baseline: Spread::of(&baseline),
        baseline_min: min(&baseline),
        baseline_above: above(&baseline),
    })
}

/// Full suite. Each experiment runs on its own freshly seeded engine.
pub fn run_validation(config: &ValidationConfig) -> Result<ValidationReport> {
    let engine = |offset: u64| {
        Simulation::new(SimConfig {
            seed: config.sim.seed.wrapping_add(offset),
            ..config.sim.clone()
        })
    };

    let mut main = engine(0)?;
    main.advance(config.warmup);
    let structure = structure_formation(&mut main, config.structure_ticks, config.sample_every);
    log::info!(
        "structure: {} bonds formed, {} growth nodes",
        structure.lifetime_bonds,
        structure.growth_nodes
    );
    let recovery = chaos_recovery(&mut main, 1.0, config.recovery_ticks)?;

    let mut second = engine(1)?;
    second.advance(config.propagation_ticks);
    let snap = second.snapshot();
    let propagation = propagation(&snap);
    let domains = domain_spread(&snap);

    let mut third = engine(2)?;
    third.advance(config.spine_ticks);
    let spine = spine_equilibrium(third.spine());

    let mut fourth = engine(3)?;
    fourth.advance(config.warmup);
    let sustained = sustained_chaos(&mut fourth, config.sustained_ticks, config.sustained)?;

    Ok(ValidationReport {
        structure,
        recovery,
        propagation,
        spine,
        domains,
        sustained,
    })
}

fn fraction(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}
