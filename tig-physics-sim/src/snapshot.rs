//! Read model handed to renderers and reporters after a completed tick.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::spine::SLOTS;
use crate::triad::Health;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BondCounts {
    pub current: usize,
    pub peak: usize,
    pub lifetime: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    pub epoch: u64,
    pub phase: usize,
    pub spine: [f64; SLOTS],
    pub root_score: f64,
    pub root_health: Health,
    pub epoch_score: f64,
    /// Force domain scores by domain name.
    pub domain_scores: BTreeMap<String, f64>,
    /// Observation leaf scores, keyed by the owning domain's name.
    pub leaf_scores: BTreeMap<String, f64>,
    pub particle_count: usize,
    pub mean_particle_coherence: f64,
    /// Particles with `s ≥ T*`.
    pub particles_above_threshold: usize,
    pub bonds: BondCounts,
    pub triad_nodes: usize,
    /// Oldest first, at most `root_history_len` entries.
    pub root_history: Vec<f64>,
}

impl Snapshot {
    pub fn domain_score(&self, name: &str) -> Option<f64> {
        self.domain_scores.get(name).copied()
    }

    /// Domain score as a fraction of its leaf score.
    pub fn retention(&self, domain: &str) -> Option<f64> {
        let leaf = self.leaf_scores.get(domain).copied()?;
        let parent = self.domain_score(domain)?;
        (leaf > 0.0).then(|| parent / leaf)
    }

    /// Fraction of particles at or above T*, 0 when there are none.
    pub fn coherent_fraction(&self) -> f64 {
        if self.particle_count == 0 {
            0.0
        } else {
            self.particles_above_threshold as f64 / self.particle_count as f64
        }
    }
}
