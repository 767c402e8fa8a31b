//! Undirected bond graph over particle indices.
//!
//! Formation and breaking use separate thresholds, so a bond that just formed
//! survives until the pair drifts to the break distance or its coherence
//! falls below the (lower) break threshold.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::constants::Constants;
use crate::particle::Particle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bond {
    /// Lower particle index.
    pub a: usize,
    /// Higher particle index.
    pub b: usize,
    /// 1-based position in the lifetime sequence of formed bonds.
    pub ordinal: u64,
    pub formed_at: u64,
}

/// Distance and coherence thresholds, already scaled by T*.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BondRules {
    pub form_distance: f64,
    pub break_distance: f64,
    pub form_coherence: f64,
    pub break_coherence: f64,
}

impl BondRules {
    pub fn new(config: &SimConfig, constants: &Constants) -> Self {
        Self {
            form_distance: config.bond_form_distance,
            break_distance: config.bond_break_distance,
            form_coherence: config.bond_form_fraction * constants.t_star,
            break_coherence: config.bond_break_fraction * constants.t_star,
        }
    }

    fn may_form(&self, p: &Particle, q: &Particle) -> bool {
        distance(p, q) < self.form_distance
            && p.s > self.form_coherence
            && q.s > self.form_coherence
    }

    fn must_break(&self, p: &Particle, q: &Particle) -> bool {
        distance(p, q) >= self.break_distance || (p.s + q.s) / 2.0 <= self.break_coherence
    }
}

/// Bond changes made by one update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BondUpdate {
    pub broken: usize,
    pub formed: Vec<Bond>,
}

#[derive(Debug, Clone, Default)]
pub struct BondGraph {
    bonds: BTreeMap<(usize, usize), Bond>,
    peak: usize,
    lifetime: u64,
}

impl BondGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a bond between `i` and `j` unless one exists. Returns the new bond.
    pub fn insert(&mut self, i: usize, j: usize, tick: u64) -> Option<Bond> {
        if i == j {
            return None;
        }
        let key = (i.min(j), i.max(j));
        if self.bonds.contains_key(&key) {
            return None;
        }
        self.lifetime += 1;
        let bond = Bond {
            a: key.0,
            b: key.1,
            ordinal: self.lifetime,
            formed_at: tick,
        };
        self.bonds.insert(key, bond);
        self.peak = self.peak.max(self.bonds.len());
        Some(bond)
    }

    pub fn contains(&self, i: usize, j: usize) -> bool {
        self.bonds.contains_key(&(i.min(j), i.max(j)))
    }

    /// Break stale bonds, then form new ones among the current positions.
    pub fn update(&mut self, particles: &[Particle], rules: &BondRules, tick: u64) -> BondUpdate {
        let before = self.bonds.len();
        self.bonds.retain(|&(a, b), _| match (particles.get(a), particles.get(b)) {
            (Some(p), Some(q)) => !rules.must_break(p, q),
            _ => false,
        });
        let broken = before - self.bonds.len();

        let mut formed = Vec::new();
        for (i, p) in particles.iter().enumerate() {
            for (j, q) in particles.iter().enumerate().skip(i + 1) {
                if rules.may_form(p, q) {
                    if let Some(bond) = self.insert(i, j, tick) {
                        log::trace!("bond {} formed between {} and {}", bond.ordinal, i, j);
                        formed.push(bond);
                    }
                }
            }
        }
        if broken > 0 {
            log::trace!("{broken} bonds broken at tick {tick}");
        }
        BondUpdate { broken, formed }
    }

    /// Keep only bonds for which `keep` returns true. Returns how many were dropped.
    pub fn retain<F: FnMut(&Bond) -> bool>(&mut self, mut keep: F) -> usize {
        let before = self.bonds.len();
        self.bonds.retain(|_, bond| keep(bond));
        before - self.bonds.len()
    }

    /// Set each particle's `bonded` flag from the current graph.
    pub fn mark(&self, particles: &mut [Particle]) {
        for p in particles.iter_mut() {
            p.bonded = false;
        }
        for bond in self.bonds.values() {
            for idx in [bond.a, bond.b] {
                if let Some(p) = particles.get_mut(idx) {
                    p.bonded = true;
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bond> {
        self.bonds.values()
    }

    pub fn len(&self) -> usize {
        self.bonds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bonds.is_empty()
    }

    /// Largest simultaneous bond count seen.
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Bonds ever formed.
    pub fn lifetime(&self) -> u64 {
        self.lifetime
    }
}

fn distance(p: &Particle, q: &Particle) -> f64 {
    (q.x - p.x).hypot(q.y - p.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> BondRules {
        BondRules::new(&SimConfig::default(), &Constants::default())
    }

    fn pair(distance: f64, s: f64) -> Vec<Particle> {
        vec![
            Particle::at(100.0, 100.0).with_coherence(s),
            Particle::at(100.0 + distance, 100.0).with_coherence(s),
        ]
    }

    #[test]
    fn forms_when_close_and_coherent() {
        let mut graph = BondGraph::new();
        let update = graph.update(&pair(20.0, 0.6), &rules(), 1);
        assert_eq!(update.formed.len(), 1);
        assert_eq!(update.formed[0].ordinal, 1);
        assert!(graph.contains(1, 0));
    }

    #[test]
    fn does_not_form_when_incoherent_or_far() {
        let mut graph = BondGraph::new();
        assert!(graph.update(&pair(20.0, 0.3), &rules(), 1).formed.is_empty());
        assert!(graph.update(&pair(35.0, 0.9), &rules(), 2).formed.is_empty());
        assert!(graph.is_empty());
    }

    #[test]
    fn hysteresis_band_keeps_existing_bond() {
        let mut graph = BondGraph::new();
        graph.insert(0, 1, 0);
        // 40 units apart and avg s 0.35: too far / too weak to form, not enough to break.
        let update = graph.update(&pair(40.0, 0.35), &rules(), 1);
        assert_eq!(update.broken, 0);
        assert_eq!(graph.len(), 1);

        let update = graph.update(&pair(50.0, 0.35), &rules(), 2);
        assert_eq!(update.broken, 1);
        assert!(graph.is_empty());
    }

    #[test]
    fn breaks_on_low_coherence() {
        let mut graph = BondGraph::new();
        graph.insert(0, 1, 0);
        let update = graph.update(&pair(10.0, 0.2), &rules(), 1);
        assert_eq!(update.broken, 1);
    }

    #[test]
    fn duplicate_insert_is_ignored() {
        let mut graph = BondGraph::new();
        assert!(graph.insert(3, 1, 0).is_some());
        assert!(graph.insert(1, 3, 0).is_none());
        assert!(graph.insert(2, 2, 0).is_none());
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.lifetime(), 1);
    }

    #[test]
    fn peak_and_lifetime_track_history() {
        let mut graph = BondGraph::new();
        graph.insert(0, 1, 0);
        graph.insert(2, 3, 0);
        graph.retain(|b| b.a != 0);
        graph.insert(4, 5, 1);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.peak(), 2);
        assert_eq!(graph.lifetime(), 3);
    }

    #[test]
    fn mark_sets_bonded_flags() {
        let mut particles = pair(5.0, 0.9);
        particles.push(Particle::at(300.0, 300.0));
        let mut graph = BondGraph::new();
        graph.insert(0, 1, 0);
        graph.mark(&mut particles);
        assert!(particles[0].bonded && particles[1].bonded);
        assert!(!particles[2].bonded);
    }
}
