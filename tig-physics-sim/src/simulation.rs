//! The stepper.
//!
//! One call to [`Simulation::step`] runs a full tick to completion:
//! 1. Advance the phase spine one slot
//! 2. Compute every pair interaction from a frozen view of the particles
//! 3. Apply forces, coherence blending and weak exchanges in pair order
//! 4. Integrate each particle
//! 5. Break and form bonds, spawning growth nodes under STRONG
//! 6. Sample particles into the GRAV/EM leaves
//! 7. Rebuild the coherence field
//! 8. Propagate the statistics tree leaf-to-root
//!
//! All randomness comes from the single RNG owned by the simulation.

use std::collections::{BTreeMap, VecDeque};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::bonds::{BondGraph, BondRules};
use crate::config::SimConfig;
use crate::constants::Constants;
use crate::error::{ensure_finite, Result};
use crate::field::CoherenceField;
use crate::forces::{accumulate, ForceModel, SpineGains};
use crate::particle::{Particle, MAX_OPERATOR};
use crate::snapshot::{BondCounts, Snapshot};
use crate::spine::PhaseSpine;
use crate::triad::{Health, Triad};

/// Node names of the statistics tree.
///
/// ```text
/// TIG → EPOCH → GRAV   → GRAV_μ
///             → EM     → EM_μ
///             → STRONG → STRONG_μ, bond-1, bond-2, ...
///             → WEAK   → WEAK_μ
/// ```
pub mod node {
    pub const ROOT: &str = "TIG";
    pub const EPOCH: &str = "EPOCH";
    pub const GRAV: &str = "GRAV";
    pub const EM: &str = "EM";
    pub const STRONG: &str = "STRONG";
    pub const WEAK: &str = "WEAK";

    pub const GRAV_LEAF: &str = "GRAV_μ";
    pub const EM_LEAF: &str = "EM_μ";
    pub const STRONG_LEAF: &str = "STRONG_μ";
    pub const WEAK_LEAF: &str = "WEAK_μ";

    /// Force domains paired with their observation leaf.
    pub const DOMAINS: [(&str, &str); 4] = [
        (GRAV, GRAV_LEAF),
        (EM, EM_LEAF),
        (STRONG, STRONG_LEAF),
        (WEAK, WEAK_LEAF),
    ];

    /// Parent of the nodes spawned when bonds form. They are detached and
    /// never feed its score.
    pub const GROWTH_PARENT: &str = STRONG;
}

const GROWTH_PATH: [&str; 2] = [node::EPOCH, node::GROWTH_PARENT];

/// Weight kept by a particle's `s` per pair blend.
const COHERENCE_RETAIN: f64 = 0.85;
/// Velocity kick half-width per unit intensity.
const CHAOS_KICK: f64 = 4.0;
/// Share of `s` a full-intensity chaos pulse removes.
const CHAOS_COHERENCE_LOSS: f64 = 0.5;
/// Chance per unit intensity that a particle's operator is reassigned.
const CHAOS_RETAG_RATE: f64 = 0.3;
/// Chance per unit intensity that a bond is dropped.
const CHAOS_BOND_DROP_RATE: f64 = 0.6;

/// What happened during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StepStats {
    pub tick: u64,
    pub epoch: u64,
    pub phase: usize,
    pub phase_value: f64,
    pub interactions: usize,
    pub weak_swaps: usize,
    pub bonds_formed: usize,
    pub bonds_broken: usize,
    pub growth_spawned: usize,
    pub root_score: f64,
}

pub struct Simulation<R: Rng = StdRng> {
    config: SimConfig,
    constants: Constants,
    model: ForceModel,
    rules: BondRules,
    particles: Vec<Particle>,
    bonds: BondGraph,
    spine: PhaseSpine,
    triads: Triad,
    field: CoherenceField,
    root_history: VecDeque<f64>,
    rng: R,
    tick: u64,
}

impl Simulation<StdRng> {
    /// Procedurally initialised simulation seeded from `config.seed`.
    pub fn new(config: SimConfig) -> Result<Self> {
        let rng = StdRng::seed_from_u64(config.seed);
        Self::with_rng(config, rng)
    }
}

impl<R: Rng> Simulation<R> {
    /// Procedurally initialised simulation drawing from `rng`.
    pub fn with_rng(config: SimConfig, mut rng: R) -> Result<Self> {
        config.validate()?;
        let particles = (0..config.particle_count)
            .map(|_| Particle::random(&config, &mut rng))
            .collect();
        Ok(Self::assemble(config, Constants::default(), particles, rng))
    }

    /// Simulation over caller-supplied particles. `config.particle_count` is ignored.
    pub fn from_particles(config: SimConfig, particles: Vec<Particle>, rng: R) -> Result<Self> {
        config.validate()?;
        let count = particles.len();
        for (index, p) in particles.iter().enumerate() {
            p.validate(index, count)?;
        }
        Ok(Self::assemble(config, Constants::default(), particles, rng))
    }

    /// Swap in a different constant set before the first tick.
    pub fn with_constants(mut self, constants: Constants) -> Self {
        self.model = ForceModel::new(&self.config, constants);
        self.rules = BondRules::new(&self.config, &constants);
        self.spine = PhaseSpine::new(constants);
        self.triads = build_tree(constants);
        self.constants = constants;
        self
    }

    fn assemble(
        config: SimConfig,
        constants: Constants,
        particles: Vec<Particle>,
        rng: R,
    ) -> Self {
        log::info!(
            "simulation created: {} particles on {}x{} canvas",
            particles.len(),
            config.width,
            config.height
        );
        let mut field = CoherenceField::new(config.field_cols, config.field_rows);
        field.recompute(&particles, config.width, config.height);
        Self {
            model: ForceModel::new(&config, constants),
            rules: BondRules::new(&config, &constants),
            spine: PhaseSpine::new(constants),
            triads: build_tree(constants),
            bonds: BondGraph::new(),
            root_history: VecDeque::with_capacity(config.root_history_len),
            field,
            particles,
            constants,
            config,
            rng,
            tick: 0,
        }
    }

    /// Advance exactly one tick.
    pub fn step(&mut self) -> StepStats {
        self.tick += 1;
        let phase_value = self.spine.advance(self.tick, &mut self.rng);
        let gains = SpineGains::from_spine(&self.spine);

        let pairs = self.model.pair_pass(&self.particles, &gains);
        let net = accumulate(self.particles.len(), &pairs);

        let swap_p = gains.weak_swap_probability();
        let mut strong_samples = Vec::new();
        let mut weak_samples = Vec::new();
        for pair in &pairs {
            for idx in [pair.i, pair.j] {
                let p = &mut self.particles[idx];
                p.s = (COHERENCE_RETAIN * p.s + (1.0 - COHERENCE_RETAIN) * pair.local_s)
                    .clamp(0.0, 1.0);
            }
            if pair.coherent {
                strong_samples.push(pair.local_s);
            }
            if pair.weak_candidate && self.rng.gen::<f64>() < swap_p {
                let a = self.particles[pair.i].operator;
                self.particles[pair.i].operator = self.particles[pair.j].operator;
                self.particles[pair.j].operator = a;
                weak_samples.push(pair.distance);
            }
        }
        self.observe_leaf(node::STRONG, node::STRONG_LEAF, &strong_samples);
        self.observe_leaf(node::WEAK, node::WEAK_LEAF, &weak_samples);

        for (p, force) in self.particles.iter_mut().zip(net) {
            p.integrate(force, &self.config, &self.constants);
        }

        let update = self.bonds.update(&self.particles, &self.rules, self.tick);
        let mut growth_spawned = 0;
        for bond in &update.formed {
            if self.rng.gen::<f64>() >= self.config.growth_probability {
                continue;
            }
            if self.triads.node_count() >= self.config.max_triad_nodes {
                break;
            }
            let avg = (self.particles[bond.a].s + self.particles[bond.b].s) / 2.0;
            if let Some(growth) = self.triads.path_mut(&GROWTH_PATH) {
                let name = format!("bond-{}", bond.ordinal);
                log::trace!("spawning growth node {name}");
                growth.spawn_detached(&name).observe(avg);
                growth_spawned += 1;
            }
        }
        self.bonds.mark(&mut self.particles);

        self.sample_domains();
        self.field
            .recompute(&self.particles, self.config.width, self.config.height);

        let root_score = self.triads.propagate();
        if self.root_history.len() >= self.config.root_history_len {
            self.root_history.pop_front();
        }
        if self.config.root_history_len > 0 {
            self.root_history.push_back(root_score);
        }

        StepStats {
            tick: self.tick,
            epoch: self.spine.epoch(),
            phase: self.spine.current(),
            phase_value,
            interactions: pairs.len(),
            weak_swaps: weak_samples.len(),
            bonds_formed: update.formed.len(),
            bonds_broken: update.broken,
            growth_spawned,
            root_score,
        }
    }

    /// Run `ticks` steps back to back. Returns the stats of the last one.
    pub fn advance(&mut self, ticks: usize) -> Option<StepStats> {
        (0..ticks).map(|_| self.step()).last()
    }

    /// Shake the system: kick velocities, bleed coherence, retag operators and drop bonds.
    ///
    /// `intensity` is clamped to [0, 1]; non-finite values are rejected.
    pub fn inject_chaos(&mut self, intensity: f64) -> Result<()> {
        let intensity = ensure_finite("chaos intensity", intensity)?.clamp(0.0, 1.0);
        let kick = intensity * CHAOS_KICK;
        let retain = 1.0 - intensity * CHAOS_COHERENCE_LOSS;
        for p in self.particles.iter_mut() {
            p.vx += self.rng.gen_range(-1.0..=1.0) * kick;
            p.vy += self.rng.gen_range(-1.0..=1.0) * kick;
            let speed = p.speed();
            if speed > self.config.max_speed {
                let k = self.config.max_speed / speed;
                p.vx *= k;
                p.vy *= k;
            }
            p.s = (p.s * retain).clamp(0.0, 1.0);
            if self.rng.gen::<f64>() < intensity * CHAOS_RETAG_RATE {
                p.operator = self.rng.gen_range(0..=MAX_OPERATOR);
            }
        }

        let drop_p = intensity * CHAOS_BOND_DROP_RATE;
        let rng = &mut self.rng;
        let dropped = self.bonds.retain(|_| rng.gen::<f64>() >= drop_p);
        self.bonds.mark(&mut self.particles);
        log::debug!(
            "chaos {:.2} at tick {}: {} bonds dropped",
            intensity,
            self.tick,
            dropped
        );
        Ok(())
    }

    /// Aggregate statistics for the tick just completed.
    pub fn snapshot(&self) -> Snapshot {
        let t_star = self.constants.t_star;
        let n = self.particles.len();
        let mean_s = if n == 0 {
            0.0
        } else {
            self.particles.iter().map(|p| p.s).sum::<f64>() / n as f64
        };

        let mut domain_scores = BTreeMap::new();
        let mut leaf_scores = BTreeMap::new();
        if let Some(epoch) = self.triads.child(node::EPOCH) {
            for (name, leaf_name) in node::DOMAINS {
                if let Some(domain) = epoch.child(name) {
                    domain_scores.insert(name.to_string(), domain.score());
                    if let Some(leaf) = domain.child(leaf_name) {
                        leaf_scores.insert(name.to_string(), leaf.score());
                    }
                }
            }
        }

        Snapshot {
            tick: self.tick,
            epoch: self.spine.epoch(),
            phase: self.spine.current(),
            spine: *self.spine.values(),
            root_score: self.triads.score(),
            root_health: self.triads.health(),
            epoch_score: self
                .triads
                .child(node::EPOCH)
                .map_or(t_star, Triad::score),
            domain_scores,
            leaf_scores,
            particle_count: n,
            mean_particle_coherence: mean_s,
            particles_above_threshold: self.particles.iter().filter(|p| p.s >= t_star).count(),
            bonds: BondCounts {
                current: self.bonds.len(),
                peak: self.bonds.peak(),
                lifetime: self.bonds.lifetime(),
            },
            triad_nodes: self.triads.node_count(),
            root_history: self.root_history.iter().copied().collect(),
        }
    }

    fn sample_domains(&mut self) {
        let stride = self.config.sample_stride;
        let (speeds, charges): (Vec<f64>, Vec<f64>) = self
            .particles
            .iter()
            .step_by(stride)
            .map(|p| (p.speed(), p.charge.abs()))
            .unzip();
        self.observe_leaf(node::GRAV, node::GRAV_LEAF, &speeds);
        self.observe_leaf(node::EM, node::EM_LEAF, &charges);
    }

    fn observe_leaf(&mut self, domain: &str, leaf: &str, samples: &[f64]) {
        if let Some(leaf) = self.triads.path_mut(&[node::EPOCH, domain, leaf]) {
            for v in samples {
                leaf.observe(*v);
            }
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn bonds(&self) -> &BondGraph {
        &self.bonds
    }

    pub fn spine(&self) -> &PhaseSpine {
        &self.spine
    }

    /// Root of the statistics tree.
    pub fn triads(&self) -> &Triad {
        &self.triads
    }

    pub fn field(&self) -> &CoherenceField {
        &self.field
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn constants(&self) -> &Constants {
        &self.constants
    }

    pub fn root_health(&self) -> Health {
        self.triads.health()
    }
}

fn build_tree(constants: Constants) -> Triad {
    let mut root = Triad::root(node::ROOT, constants);
    let epoch = root.spawn(node::EPOCH);
    for (domain, leaf) in node::DOMAINS {
        epoch.spawn(domain).spawn(leaf);
    }
    root
}
