//! Pairwise interaction laws.
//!
//! Every unordered pair inside the cutoff gets a local coherence score and a
//! scalar force along the line joining it. Positive magnitudes attract.
//!
//! ```text
//! localS   = F × 1/(1 + 0.3·(|Δvx| + |Δvy|)) × ½(1 − |op_i − op_j|/9 + spV)
//! strong   = spine[1] · localS · (1 − d/30) · 3            d < 30
//! gravity  = spine[5] · m_i·m_j · σ* / d² · 800
//! em       = −spine[8] · q_i·q_j / d² · 200
//! cohesion = localS·σ/(0.3d + 1)·5                         localS ≥ T*/2
//!          = −(T* − localS)·σ*·8/(0.3d + 1)                otherwise
//! ```
//!
//! The pass only reads particle state. Results are applied by the caller in
//! pair order, so the serial and `parallel` paths agree exactly.

use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::constants::Constants;
use crate::particle::{Particle, MAX_OPERATOR};
use crate::spine::{slot, PhaseSpine};

const VELOCITY_SCALE: f64 = 0.3;
const STRONG_GAIN: f64 = 3.0;
const GRAVITY_GAIN: f64 = 800.0;
const EM_GAIN: f64 = 200.0;
const COHESION_GAIN: f64 = 5.0;
const REPULSION_GAIN: f64 = 8.0;
const COHESION_FALLOFF: f64 = 0.3;
/// Per-tick swap probability is `spine[4] × WEAK_SWAP_RATE`.
pub const WEAK_SWAP_RATE: f64 = 0.02;

/// Spine values the force laws read this tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpineGains {
    pub strong: f64,
    pub weak: f64,
    pub gravity: f64,
    pub electromagnetic: f64,
    /// Value of the slot just rewritten (spV).
    pub phase_value: f64,
}

impl SpineGains {
    pub fn from_spine(spine: &PhaseSpine) -> Self {
        Self {
            strong: spine.get(slot::STRONG),
            weak: spine.get(slot::WEAK),
            gravity: spine.get(slot::GRAVITY),
            electromagnetic: spine.get(slot::ELECTROMAGNETIC),
            phase_value: spine.current_value(),
        }
    }

    /// Chance that a weak-eligible pair swaps operator tags this tick.
    pub fn weak_swap_probability(&self) -> f64 {
        (self.weak * WEAK_SWAP_RATE).clamp(0.0, 1.0)
    }
}

/// Signed magnitude of each law along i→j. Positive attracts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ForceBreakdown {
    pub strong: f64,
    pub gravity: f64,
    pub electromagnetic: f64,
    pub cohesion: f64,
}

impl ForceBreakdown {
    pub fn total(&self) -> f64 {
        self.strong + self.gravity + self.electromagnetic + self.cohesion
    }
}

/// Result of one pair, computed from a read-only view of the particles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairInteraction {
    pub i: usize,
    pub j: usize,
    /// Distance after the minimum-distance clamp.
    pub distance: f64,
    pub local_s: f64,
    /// Force on `i`. `j` receives the negation.
    pub force: (f64, f64),
    pub breakdown: ForceBreakdown,
    /// `local_s ≥ T*/2`: cohesion attracts and the STRONG leaf is fed.
    pub coherent: bool,
    /// Close and incoherent enough for a weak operator exchange.
    pub weak_candidate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceModel {
    constants: Constants,
    cutoff: f64,
    min_distance: f64,
    strong_range: f64,
    weak_range: f64,
}

impl ForceModel {
    pub fn new(config: &SimConfig, constants: Constants) -> Self {
        Self {
            constants,
            cutoff: config.interaction_cutoff,
            min_distance: config.min_distance,
            strong_range: config.strong_range,
            weak_range: config.weak_range,
        }
    }

    /// Bounded-product coherence of a pair, in [0, F].
    pub fn local_coherence(&self, a: &Particle, b: &Particle, phase_value: f64) -> f64 {
        let dv = (a.vx - b.vx).abs() + (a.vy - b.vy).abs();
        let vitality = 1.0 / (1.0 + dv * VELOCITY_SCALE);
        let op_gap = f64::from(a.operator.abs_diff(b.operator)) / f64::from(MAX_OPERATOR);
        let alignment = ((1.0 - op_gap) + phase_value) / 2.0;
        self.constants.f() * vitality.clamp(0.0, 1.0) * alignment.clamp(0.0, 1.0)
    }

    /// Interaction of particles `i < j`, or `None` beyond the cutoff.
    pub fn interact(
        &self,
        i: usize,
        j: usize,
        a: &Particle,
        b: &Particle,
        gains: &SpineGains,
    ) -> Option<PairInteraction> {
        let dx = b.x - a.x;
        let dy = b.y - a.y;
        let raw = dx.hypot(dy);
        let d = raw.max(self.min_distance);
        if d >= self.cutoff {
            return None;
        }
        let (ux, uy) = if raw > f64::EPSILON {
            (dx / raw, dy / raw)
        } else {
            (0.0, 0.0)
        };

        let c = &self.constants;
        let local_s = self.local_coherence(a, b, gains.phase_value);
        let d2 = d * d;

        let strong = if d < self.strong_range {
            gains.strong * local_s * (1.0 - d / self.strong_range) * STRONG_GAIN
        } else {
            0.0
        };
        let gravity = gains.gravity * a.mass * b.mass * c.sigma_star / d2 * GRAVITY_GAIN;
        let electromagnetic = -gains.electromagnetic * a.charge * b.charge / d2 * EM_GAIN;

        let coherent = local_s >= c.t_star / 2.0;
        let falloff = COHESION_FALLOFF * d + 1.0;
        let cohesion = if coherent {
            local_s * c.sigma / falloff * COHESION_GAIN
        } else {
            -(c.t_star - local_s) * c.sigma_star * REPULSION_GAIN / falloff
        };

        let breakdown = ForceBreakdown {
            strong,
            gravity,
            electromagnetic,
            cohesion,
        };
        let magnitude = breakdown.total();

        Some(PairInteraction {
            i,
            j,
            distance: d,
            local_s,
            force: (magnitude * ux, magnitude * uy),
            breakdown,
            coherent,
            weak_candidate: d < self.weak_range && !coherent,
        })
    }

    /// All interacting pairs, ordered by `(i, j)`.
    #[cfg(feature = "parallel")]
    pub fn pair_pass(&self, particles: &[Particle], gains: &SpineGains) -> Vec<PairInteraction> {
        use rayon::prelude::*;
        let n = particles.len();
        (0..n)
            .into_par_iter()
            .flat_map_iter(|i| {
                (i + 1..n)
                    .filter_map(move |j| self.interact(i, j, &particles[i], &particles[j], gains))
            })
            .collect()
    }

    /// All interacting pairs, ordered by `(i, j)`.
    #[cfg(not(feature = "parallel"))]
    pub fn pair_pass(&self, particles: &[Particle], gains: &SpineGains) -> Vec<PairInteraction> {
        let n = particles.len();
        (0..n)
            .flat_map(|i| {
                (i + 1..n)
                    .filter_map(move |j| self.interact(i, j, &particles[i], &particles[j], gains))
            })
            .collect()
    }
}

/// Sum pair forces into a per-particle buffer, equal and opposite per pair.
pub fn accumulate(n: usize, pairs: &[PairInteraction]) -> Vec<(f64, f64)> {
    let mut net = vec![(0.0, 0.0); n];
    for pair in pairs {
        net[pair.i].0 += pair.force.0;
        net[pair.i].1 += pair.force.1;
        net[pair.j].0 -= pair.force.0;
        net[pair.j].1 -= pair.force.1;
    }
    net
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ForceModel {
        ForceModel::new(&SimConfig::default(), Constants::default())
    }

    fn gains() -> SpineGains {
        SpineGains::from_spine(&PhaseSpine::new(Constants::default()))
    }

    #[test]
    fn close_neutral_pair_attracts() {
        let a = Particle::at(100.0, 100.0);
        let b = Particle::at(110.0, 100.0);
        let pair = model().interact(0, 1, &a, &b, &gains()).expect("inside cutoff");
        assert!(pair.breakdown.strong > 0.0);
        assert!(pair.breakdown.gravity > 0.0);
        assert_eq!(pair.breakdown.electromagnetic, 0.0);
        assert!(pair.coherent);
        assert!(pair.force.0 > 0.0, "force on i should point toward j");
        assert_eq!(pair.force.1, 0.0);
    }

    #[test]
    fn like_charges_repel_opposite_attract() {
        let g = gains();
        let a = Particle::at(0.0, 0.0).with_charge(1.0);
        let like = Particle::at(50.0, 0.0).with_charge(1.0);
        let unlike = Particle::at(50.0, 0.0).with_charge(-1.0);
        let m = model();
        let repel = m.interact(0, 1, &a, &like, &g).map(|p| p.breakdown.electromagnetic);
        let attract = m.interact(0, 1, &a, &unlike, &g).map(|p| p.breakdown.electromagnetic);
        assert!(repel.unwrap_or(0.0) < 0.0);
        assert!(attract.unwrap_or(0.0) > 0.0);
    }

    #[test]
    fn cutoff_and_strong_range() {
        let g = gains();
        let m = model();
        let a = Particle::at(0.0, 0.0);
        assert!(m.interact(0, 1, &a, &Particle::at(200.0, 0.0), &g).is_none());
        let far = m.interact(0, 1, &a, &Particle::at(45.0, 0.0), &g);
        assert_eq!(far.map(|p| p.breakdown.strong), Some(0.0));
    }

    #[test]
    fn distance_is_clamped() {
        let g = gains();
        let a = Particle::at(10.0, 10.0);
        let b = Particle::at(10.0, 10.0);
        let pair = model().interact(0, 1, &a, &b, &g).expect("coincident pair interacts");
        assert_eq!(pair.distance, 2.0);
        assert_eq!(pair.force, (0.0, 0.0));
        assert!(pair.breakdown.total().is_finite());
    }

    #[test]
    fn local_coherence_is_bounded() {
        let c = Constants::default();
        let m = model();
        for op in 0..=MAX_OPERATOR {
            for phase in [0.001, 0.5, 1.0] {
                let a = Particle::at(0.0, 0.0).with_velocity(3.0, -2.0);
                let b = Particle::at(5.0, 0.0).with_operator(op);
                let s = m.local_coherence(&a, &b, phase);
                assert!((0.0..=c.f()).contains(&s));
            }
        }
        let still = m.local_coherence(&Particle::at(0.0, 0.0), &Particle::at(1.0, 0.0), 1.0);
        assert!((still - c.f()).abs() < 1e-12);
    }

    #[test]
    fn incoherent_close_pair_repels_and_is_weak_candidate() {
        let g = SpineGains {
            phase_value: 0.001,
            ..gains()
        };
        let a = Particle::at(0.0, 0.0).with_operator(0).with_velocity(5.0, 0.0);
        let b = Particle::at(10.0, 0.0).with_operator(9).with_velocity(-5.0, 0.0);
        let pair = model().interact(0, 1, &a, &b, &g).expect("inside cutoff");
        assert!(!pair.coherent);
        assert!(pair.weak_candidate);
        assert!(pair.breakdown.cohesion < 0.0);
    }

    #[test]
    fn accumulated_forces_are_equal_and_opposite() {
        let particles = vec![
            Particle::at(100.0, 100.0).with_charge(0.5),
            Particle::at(120.0, 110.0).with_charge(-0.3).with_operator(4),
            Particle::at(90.0, 140.0).with_mass(2.0),
        ];
        let pairs = model().pair_pass(&particles, &gains());
        assert_eq!(pairs.len(), 3);
        assert_eq!((pairs[0].i, pairs[0].j), (0, 1));
        assert_eq!((pairs[2].i, pairs[2].j), (1, 2));
        for pair in &pairs {
            let on_j = (-pair.force.0, -pair.force.1);
            assert_eq!(pair.force.0 + on_j.0, 0.0);
            assert_eq!(pair.force.1 + on_j.1, 0.0);
        }
        let net = accumulate(particles.len(), &pairs);
        let sum_x: f64 = net.iter().map(|f| f.0).sum();
        let sum_y: f64 = net.iter().map(|f| f.1).sum();
        assert!(sum_x.abs() < 1e-9 && sum_y.abs() < 1e-9, "net force {} {}", sum_x, sum_y);
    }
}
