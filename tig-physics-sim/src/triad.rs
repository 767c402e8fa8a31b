//! Hierarchical coherence estimator.
//!
//! A [`Triad`] turns a stream of scalar observations into a bounded score
//! using a slow exponential mean/variance and a short directional window:
//!
//! ```text
//! own = F × vitality × alignment
//! vitality  = 1 / (1 + cv),    cv = √var / mean
//! alignment = 1 when the last four samples move monotonically
//! s = (own + C·mean(child scores)) / (1 + C)
//! ```
//!
//! Nodes form an owned tree. Children never point back at their parent; the
//! driver pushes scores upward with [`Triad::receive`] or [`Triad::propagate`].
//! A pushed score is combined with the relayed own term `F × vitality × ½`,
//! re-derived from the estimator alone, rather than the buffered `own`.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::constants::Constants;

/// Observations kept per node.
pub const BUFFER_LEN: usize = 48;
/// Combined scores kept per node.
pub const HISTORY_LEN: usize = 100;
/// Below this many samples `own` stays at T*.
pub const MIN_SAMPLES: usize = 4;
const ALIGNMENT_WINDOW: usize = 4;
const MEAN_EPSILON: f64 = 0.001;

/// Display label for a coherence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Health {
    Crystalline,
    Optimal,
    Coherent,
    Stable,
    Degraded,
    Critical,
    Collapsed,
}

impl Health {
    /// Map a score onto the descending thresholds 0.95, 0.90, 0.80, T*, 0.50, 0.25.
    pub fn classify(s: f64, t_star: f64) -> Self {
        if s >= 0.95 {
            Health::Crystalline
        } else if s >= 0.90 {
            Health::Optimal
        } else if s >= 0.80 {
            Health::Coherent
        } else if s >= t_star {
            Health::Stable
        } else if s >= 0.50 {
            Health::Degraded
        } else if s >= 0.25 {
            Health::Critical
        } else {
            Health::Collapsed
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Health::Crystalline => "CRYSTALLINE",
            Health::Optimal => "OPTIMAL",
            Health::Coherent => "COHERENT",
            Health::Stable => "STABLE",
            Health::Degraded => "DEGRADED",
            Health::Critical => "CRITICAL",
            Health::Collapsed => "COLLAPSED",
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Directional consistency of a short window.
///
/// Monotonic windows (including flat ones) score 1. Otherwise the score is
/// `(agreements + 1) / differences`, where an agreement is a pair of
/// consecutive differences on the same side of zero (zero counts as rising).
pub fn alignment(window: &[f64]) -> f64 {
    let diffs: SmallVec<[f64; ALIGNMENT_WINDOW]> =
        window.windows(2).map(|w| w[1] - w[0]).collect();
    if diffs.is_empty() {
        return 1.0;
    }
    let rising = diffs.iter().all(|d| *d >= 0.0);
    let falling = diffs.iter().all(|d| *d <= 0.0);
    if rising || falling {
        return 1.0;
    }
    let agreements = diffs
        .windows(2)
        .filter(|p| (p[0] >= 0.0) == (p[1] >= 0.0))
        .count();
    ((agreements + 1) as f64 / diffs.len() as f64).clamp(0.0, 1.0)
}

/// A node of the coherence tree.
#[derive(Debug, Clone)]
pub struct Triad {
    name: String,
    depth: usize,
    constants: Constants,
    buffer: VecDeque<f64>,
    mean: f64,
    variance: f64,
    primed: bool,
    own: f64,
    s: f64,
    child_scores: BTreeMap<String, f64>,
    children: BTreeMap<String, Triad>,
    history: VecDeque<f64>,
    /// Whether `propagate` pushes this node's score into its parent.
    reports: bool,
}

impl Triad {
    /// Create a root node (depth 0).
    pub fn root(name: &str, constants: Constants) -> Self {
        Self::at_depth(name, 0, constants)
    }

    fn at_depth(name: &str, depth: usize, constants: Constants) -> Self {
        Self {
            name: name.to_string(),
            depth,
            constants,
            buffer: VecDeque::with_capacity(BUFFER_LEN),
            mean: 0.0,
            variance: 0.0,
            primed: false,
            own: constants.t_star,
            s: constants.t_star,
            child_scores: BTreeMap::new(),
            children: BTreeMap::new(),
            history: VecDeque::with_capacity(HISTORY_LEN),
            reports: true,
        }
    }

    /// Feed one sample and return the updated combined score.
    ///
    /// Non-finite samples are ignored and the current score is returned.
    pub fn observe(&mut self, value: f64) -> f64 {
        if !value.is_finite() {
            log::warn!("triad {}: ignoring non-finite observation {value}", self.name);
            return self.s;
        }
        if self.buffer.len() == BUFFER_LEN {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);

        let sigma = self.constants.sigma;
        let fresh = self.constants.fresh_weight();
        if self.primed {
            self.mean = fresh * value + sigma * self.mean;
            let dev = value - self.mean;
            self.variance = fresh * dev * dev + sigma * self.variance;
        } else {
            self.mean = value;
            self.variance = 0.0;
            self.primed = true;
        }

        self.own = self.own_score();
        self.s = self.combine();
        self.push_history(self.s);
        self.s
    }

    /// Record a child's latest score and recombine.
    pub fn receive(&mut self, child: &str, score: f64) -> f64 {
        if !score.is_finite() {
            log::warn!("triad {}: ignoring non-finite score from {child}", self.name);
            return self.s;
        }
        self.child_scores.insert(child.to_string(), score);
        self.s = self.relay();
        self.push_history(self.s);
        self.s
    }

    /// Create a child one level deeper. An existing child of the same name is replaced.
    pub fn spawn(&mut self, name: &str) -> &mut Triad {
        let child = Triad::at_depth(name, self.depth + 1, self.constants);
        self.insert_child(child)
    }

    /// Like [`spawn`](Self::spawn), but the child is never folded into this
    /// node's score by `propagate`. It still observes and can be read.
    pub fn spawn_detached(&mut self, name: &str) -> &mut Triad {
        let mut child = Triad::at_depth(name, self.depth + 1, self.constants);
        child.reports = false;
        self.child_scores.remove(name);
        self.insert_child(child)
    }

    fn insert_child(&mut self, child: Triad) -> &mut Triad {
        match self.children.entry(child.name.clone()) {
            Entry::Occupied(mut slot) => {
                log::warn!("triad {}: respawning existing child {}", self.name, child.name);
                slot.insert(child);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(child),
        }
    }

    /// Push every reporting child's score into its parent, leaves first, and
    /// return this node's score. Detached children are propagated internally
    /// but contribute nothing upward.
    pub fn propagate(&mut self) -> f64 {
        if self.children.is_empty() {
            return self.s;
        }
        for (name, child) in self.children.iter_mut() {
            let score = child.propagate();
            if !child.reports {
                continue;
            }
            match self.child_scores.get_mut(name) {
                Some(slot) => *slot = score,
                None => {
                    self.child_scores.insert(name.clone(), score);
                }
            }
        }
        self.s = self.relay();
        self.push_history(self.s);
        self.s
    }

    /// Own term used when child scores are pushed in: `F × vitality × ½`.
    pub fn relayed_own(&self) -> f64 {
        self.constants.f() * self.vitality() * 0.5
    }

    fn vitality(&self) -> f64 {
        let cv = if self.mean > MEAN_EPSILON {
            self.variance.sqrt() / self.mean
        } else {
            1.0
        };
        (1.0 / (1.0 + cv)).clamp(0.0, 1.0)
    }

    fn own_score(&self) -> f64 {
        let n = self.buffer.len();
        if n < MIN_SAMPLES {
            return self.constants.t_star;
        }
        let window: SmallVec<[f64; ALIGNMENT_WINDOW]> = self
            .buffer
            .iter()
            .skip(n.saturating_sub(ALIGNMENT_WINDOW))
            .copied()
            .collect();
        let align = alignment(&window);
        self.constants.f() * self.vitality() * align.clamp(0.0, 1.0)
    }

    fn combine(&self) -> f64 {
        self.combine_with(self.own)
    }

    fn relay(&self) -> f64 {
        self.combine_with(self.relayed_own())
    }

    fn combine_with(&self, own: f64) -> f64 {
        if self.child_scores.is_empty() {
            return own;
        }
        let c = self.constants.coupling;
        let children_mean =
            self.child_scores.values().sum::<f64>() / self.child_scores.len() as f64;
        (own + c * children_mean) / (1.0 + c)
    }

    fn push_history(&mut self, s: f64) {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(s);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// False for nodes created with [`spawn_detached`](Self::spawn_detached).
    pub fn reports(&self) -> bool {
        self.reports
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Combined score `s`.
    pub fn score(&self) -> f64 {
        self.s
    }

    /// Score derived from this node's own observations.
    pub fn own(&self) -> f64 {
        self.own
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// Number of buffered observations.
    pub fn samples(&self) -> usize {
        self.buffer.len()
    }

    pub fn history(&self) -> impl Iterator<Item = f64> + '_ {
        self.history.iter().copied()
    }

    pub fn health(&self) -> Health {
        Health::classify(self.s, self.constants.t_star)
    }

    pub fn child(&self, name: &str) -> Option<&Triad> {
        self.children.get(name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Triad> {
        self.children.get_mut(name)
    }

    pub fn children(&self) -> impl Iterator<Item = &Triad> {
        self.children.values()
    }

    /// Last score received from the named child.
    pub fn child_score(&self, name: &str) -> Option<f64> {
        self.child_scores.get(name).copied()
    }

    /// Walk down by child names.
    pub fn path(&self, path: &[&str]) -> Option<&Triad> {
        let mut node = self;
        for name in path {
            node = node.children.get(*name)?;
        }
        Some(node)
    }

    pub fn path_mut(&mut self, path: &[&str]) -> Option<&mut Triad> {
        let mut node = self;
        for name in path {
            node = node.children.get_mut(*name)?;
        }
        Some(node)
    }

    /// Nodes in this subtree, including this one.
    pub fn node_count(&self) -> usize {
        1 + self.children.values().map(Triad::node_count).sum::<usize>()
    }
}
