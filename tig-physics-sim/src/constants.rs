//! Fixed coherence constants.
//!
//! The module-level values are the canonical defaults. Components never read
//! them directly: they receive a [`Constants`] value at construction so that
//! several simulations can coexist with different settings.

use serde::{Deserialize, Serialize};

/// Coherence ceiling σ. Also the EMA smoothing factor and per-tick damping.
pub const SIGMA: f64 = 0.991;

/// Collapse threshold T*.
pub const T_STAR: f64 = 0.714;

/// Complement σ* used in the ceiling factor and the gravity law.
pub const SIGMA_STAR: f64 = 0.009;

/// Coupling weight C between a node's own score and its children's mean.
pub const COUPLING: f64 = 1.0;

/// Ceiling factor F = σ·(1−σ*).
pub const fn ceiling_factor(sigma: f64, sigma_star: f64) -> f64 {
    sigma * (1.0 - sigma_star)
}

/// Immutable constant set threaded through every component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Constants {
    /// σ
    pub sigma: f64,
    /// T*
    pub t_star: f64,
    /// σ*
    pub sigma_star: f64,
    /// C
    pub coupling: f64,
}

impl Constants {
    /// The fixed production values.
    pub const fn tig() -> Self {
        Self {
            sigma: SIGMA,
            t_star: T_STAR,
            sigma_star: SIGMA_STAR,
            coupling: COUPLING,
        }
    }

    /// F = σ·(1−σ*), the upper bound of every bounded-product score.
    #[inline]
    pub fn f(&self) -> f64 {
        ceiling_factor(self.sigma, self.sigma_star)
    }

    /// Weight given to a fresh sample by the slow EMA, 1−σ.
    #[inline]
    pub fn fresh_weight(&self) -> f64 {
        1.0 - self.sigma
    }
}

impl Default for Constants {
    fn default() -> Self {
        Self::tig()
    }
}
