//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Tunables for a simulation run. Distances are in canvas units, time in ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Canvas width.
    pub width: f64,
    /// Canvas height.
    pub height: f64,
    /// Number of particles created by the procedural initialiser.
    pub particle_count: usize,
    /// Euler step.
    pub dt: f64,
    /// Speed ceiling applied after damping.
    pub max_speed: f64,
    /// Distance from each wall where the soft push starts.
    pub boundary_margin: f64,
    /// Procedural particles are placed at least this far from every wall.
    pub spawn_margin: f64,
    /// Velocity added per tick at the wall itself; tapers to zero at the margin.
    pub boundary_push: f64,
    /// Pairs at or beyond this distance do not interact.
    pub interaction_cutoff: f64,
    /// Distances are clamped up to this value before any force law.
    pub min_distance: f64,
    /// Range of the strong term.
    pub strong_range: f64,
    /// Range of the weak operator exchange.
    pub weak_range: f64,
    /// A bond forms below this distance.
    pub bond_form_distance: f64,
    /// A bond breaks at or beyond this distance.
    pub bond_break_distance: f64,
    /// Both particles need `s > bond_form_fraction · T*` to bond.
    pub bond_form_fraction: f64,
    /// A bond breaks once the pair-average `s ≤ bond_break_fraction · T*`.
    pub bond_break_fraction: f64,
    /// Chance that a new bond also spawns a growth node.
    pub growth_probability: f64,
    /// Hard ceiling on the statistics tree size.
    pub max_triad_nodes: usize,
    /// Positions remembered per particle.
    pub trail_length: usize,
    /// Coherence field columns.
    pub field_cols: usize,
    /// Coherence field rows.
    pub field_rows: usize,
    /// Every n-th particle feeds the GRAV/EM leaves.
    pub sample_stride: usize,
    /// Root scores kept for plotting.
    pub root_history_len: usize,
    /// Seed for [`crate::simulation::Simulation::new`].
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: 400.0,
            height: 300.0,
            particle_count: 80,
            dt: 0.3,
            max_speed: 8.0,
            boundary_margin: 15.0,
            spawn_margin: 60.0,
            boundary_push: 0.5,
            interaction_cutoff: 200.0,
            min_distance: 2.0,
            strong_range: 30.0,
            weak_range: 20.0,
            bond_form_distance: 30.0,
            bond_break_distance: 50.0,
            bond_form_fraction: 0.55,
            bond_break_fraction: 0.4,
            growth_probability: 0.3,
            max_triad_nodes: 512,
            trail_length: 16,
            field_cols: 20,
            field_rows: 15,
            sample_stride: 10,
            root_history_len: 150,
            seed: 42,
        }
    }
}

impl SimConfig {
    /// Default canvas with a custom particle count.
    pub fn small(particle_count: usize) -> Self {
        Self {
            particle_count,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            (self.width, "width must be positive and finite"),
            (self.height, "height must be positive and finite"),
            (self.dt, "dt must be positive and finite"),
            (self.max_speed, "max_speed must be positive and finite"),
            (self.interaction_cutoff, "interaction_cutoff must be positive and finite"),
            (self.min_distance, "min_distance must be positive and finite"),
            (self.strong_range, "strong_range must be positive and finite"),
            (self.bond_form_distance, "bond_form_distance must be positive and finite"),
        ];
        for (value, reason) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::InvalidConfig(reason));
            }
        }
        if !(self.boundary_margin.is_finite() && self.boundary_margin >= 0.0) {
            return Err(SimError::InvalidConfig("boundary_margin must be non-negative"));
        }
        if 2.0 * self.boundary_margin >= self.width.min(self.height) {
            return Err(SimError::InvalidConfig("boundary_margin leaves no interior"));
        }
        if !(self.spawn_margin.is_finite() && self.spawn_margin >= 0.0)
            || 2.0 * self.spawn_margin >= self.width.min(self.height)
        {
            return Err(SimError::InvalidConfig("spawn_margin leaves no room to place particles"));
        }
        if !(self.boundary_push.is_finite() && self.boundary_push >= 0.0) {
            return Err(SimError::InvalidConfig("boundary_push must be non-negative"));
        }
        if !(self.weak_range.is_finite() && self.weak_range >= 0.0) {
            return Err(SimError::InvalidConfig("weak_range must be non-negative"));
        }
        if !(self.bond_break_distance.is_finite()
            && self.bond_break_distance > self.bond_form_distance)
        {
            return Err(SimError::InvalidConfig(
                "bond_break_distance must exceed bond_form_distance",
            ));
        }
        if !(0.0..=1.0).contains(&self.bond_form_fraction)
            || !(0.0..=1.0).contains(&self.bond_break_fraction)
        {
            return Err(SimError::InvalidConfig("bond fractions must lie in [0, 1]"));
        }
        if self.bond_break_fraction >= self.bond_form_fraction {
            return Err(SimError::InvalidConfig(
                "bond_break_fraction must be below bond_form_fraction",
            ));
        }
        if !(0.0..=1.0).contains(&self.growth_probability) {
            return Err(SimError::InvalidConfig("growth_probability must lie in [0, 1]"));
        }
        if self.field_cols == 0 || self.field_rows == 0 {
            return Err(SimError::InvalidConfig("field grid must have at least one cell"));
        }
        if self.sample_stride == 0 {
            return Err(SimError::InvalidConfig("sample_stride must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
        assert!(SimConfig::small(2).validate().is_ok());
    }

    #[test]
    fn hysteresis_must_be_strict() {
        let config = SimConfig {
            bond_break_distance: 30.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SimConfig {
            bond_break_fraction: 0.55,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_finite_extent() {
        let config = SimConfig {
            width: f64::NAN,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(SimError::InvalidConfig("width must be positive and finite"))
        );
    }

    #[test]
    fn rejects_empty_field() {
        let config = SimConfig {
            field_cols: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
