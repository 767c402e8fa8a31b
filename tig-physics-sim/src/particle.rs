//! Particle records, procedural initialisation and single-particle integration.

use std::collections::VecDeque;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::constants::{Constants, T_STAR};
use crate::error::{Result, SimError};

/// Operator tags run 0..=MAX_OPERATOR.
pub const MAX_OPERATOR: u8 = 9;
/// Starting coherence of every new particle.
pub const INITIAL_COHERENCE: f64 = T_STAR;
/// Half-width of the uniform initial velocity components.
const INITIAL_SPEED: f64 = 0.75;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub mass: f64,
    pub charge: f64,
    /// Discrete mode in [0, 9].
    pub operator: u8,
    /// Local coherence, smoothed across every pair interaction.
    pub s: f64,
    pub trail: VecDeque<(f64, f64)>,
    pub bonded: bool,
    /// Ticks alive.
    pub age: u64,
}

impl Particle {
    /// A particle at rest with unit mass, no charge and operator 0.
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            mass: 1.0,
            charge: 0.0,
            operator: 0,
            s: INITIAL_COHERENCE,
            trail: VecDeque::new(),
            bonded: false,
            age: 0,
        }
    }

    pub fn with_velocity(mut self, vx: f64, vy: f64) -> Self {
        self.vx = vx;
        self.vy = vy;
        self
    }

    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_charge(mut self, charge: f64) -> Self {
        self.charge = charge;
        self
    }

    pub fn with_operator(mut self, operator: u8) -> Self {
        self.operator = operator;
        self
    }

    pub fn with_coherence(mut self, s: f64) -> Self {
        self.s = s;
        self
    }

    /// Random particle inside the canvas interior.
    pub fn random<R: Rng>(config: &SimConfig, rng: &mut R) -> Self {
        let m = config.spawn_margin;
        Self {
            x: rng.gen_range(m..=config.width - m),
            y: rng.gen_range(m..=config.height - m),
            vx: rng.gen_range(-INITIAL_SPEED..=INITIAL_SPEED),
            vy: rng.gen_range(-INITIAL_SPEED..=INITIAL_SPEED),
            mass: rng.gen_range(0.5..=2.0),
            charge: rng.gen_range(-1.0..=1.0),
            operator: rng.gen_range(0..=MAX_OPERATOR),
            s: INITIAL_COHERENCE,
            trail: VecDeque::with_capacity(config.trail_length),
            bonded: false,
            age: 0,
        }
    }

    pub fn speed(&self) -> f64 {
        self.vx.hypot(self.vy)
    }

    /// Check a caller-supplied particle before it enters the engine.
    pub fn validate(&self, index: usize, count: usize) -> Result<()> {
        let invalid = |reason| SimError::InvalidParticle {
            index,
            count,
            reason,
        };
        let kinematics = [self.x, self.y, self.vx, self.vy, self.charge, self.s];
        if kinematics.iter().any(|v| !v.is_finite()) {
            return Err(invalid("non-finite state"));
        }
        if !(self.mass.is_finite() && self.mass > 0.0) {
            return Err(invalid("mass must be positive"));
        }
        if self.operator > MAX_OPERATOR {
            return Err(invalid("operator tag above 9"));
        }
        Ok(())
    }

    /// Euler step: apply force, damp by σ, cap speed, move, then push off the walls.
    pub fn integrate(&mut self, force: (f64, f64), config: &SimConfig, constants: &Constants) {
        let dt = config.dt;
        self.vx += force.0 / self.mass * dt;
        self.vy += force.1 / self.mass * dt;
        self.vx *= constants.sigma;
        self.vy *= constants.sigma;

        let speed = self.speed();
        if speed > config.max_speed {
            let k = config.max_speed / speed;
            self.vx *= k;
            self.vy *= k;
        }

        self.x += self.vx * dt;
        self.y += self.vy * dt;
        self.soft_boundary(config);

        if config.trail_length > 0 {
            if self.trail.len() >= config.trail_length {
                self.trail.pop_front();
            }
            self.trail.push_back((self.x, self.y));
        }
        self.age += 1;
    }

    fn soft_boundary(&mut self, config: &SimConfig) {
        let m = config.boundary_margin;
        let push = config.boundary_push;
        let ramp = |depth: f64| if m > 0.0 { push * (depth / m).min(1.0) } else { push };

        if self.x < m {
            self.vx += ramp(m - self.x);
        } else if self.x > config.width - m {
            self.vx -= ramp(self.x - (config.width - m));
        }
        if self.y < m {
            self.vy += ramp(m - self.y);
        } else if self.y > config.height - m {
            self.vy -= ramp(self.y - (config.height - m));
        }
        self.x = self.x.clamp(0.0, config.width);
        self.y = self.y.clamp(0.0, config.height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn random_particles_are_valid_and_inside() {
        let config = SimConfig::default();
        let mut rng = StdRng::seed_from_u64(5);
        for i in 0..200 {
            let p = Particle::random(&config, &mut rng);
            assert!(p.validate(i, 200).is_ok());
            assert!(p.x >= config.spawn_margin && p.x <= config.width - config.spawn_margin);
            assert!(p.y >= config.spawn_margin && p.y <= config.height - config.spawn_margin);
            assert_eq!(p.s, INITIAL_COHERENCE);
            assert!(p.operator <= MAX_OPERATOR);
        }
    }

    #[test]
    fn free_particle_damps_by_sigma() {
        let config = SimConfig::default();
        let c = Constants::default();
        let mut p = Particle::at(200.0, 150.0).with_velocity(2.0, -1.0);
        let mut prev = p.speed();
        for _ in 0..50 {
            p.integrate((0.0, 0.0), &config, &c);
            let speed = p.speed();
            assert!((speed - prev * c.sigma).abs() < 1e-12, "speed {} vs {}", speed, prev);
            prev = speed;
        }
        assert!(prev > 0.0);
    }

    #[test]
    fn speed_is_capped() {
        let config = SimConfig::default();
        let c = Constants::default();
        let mut p = Particle::at(200.0, 150.0);
        p.integrate((1_000.0, 1_000.0), &config, &c);
        assert!(p.speed() <= config.max_speed + 1e-9);
    }

    #[test]
    fn wall_pushes_velocity_inward() {
        let config = SimConfig::default();
        let c = Constants::default();
        let mut p = Particle::at(5.0, 150.0).with_velocity(-1.0, 0.0);
        let mut pushed = false;
        for _ in 0..100 {
            p.integrate((0.0, 0.0), &config, &c);
            assert!(p.x >= 0.0);
            pushed |= p.vx > 0.0;
        }
        assert!(pushed, "particle near the left wall should be pushed right");
    }

    #[test]
    fn trail_and_age_are_bounded() {
        let config = SimConfig {
            trail_length: 4,
            ..Default::default()
        };
        let c = Constants::default();
        let mut p = Particle::at(200.0, 150.0).with_velocity(1.0, 0.0);
        for _ in 0..10 {
            p.integrate((0.0, 0.0), &config, &c);
        }
        assert_eq!(p.trail.len(), 4);
        assert_eq!(p.age, 10);
        assert_eq!(p.trail.back().copied(), Some((p.x, p.y)));
    }

    #[test]
    fn validate_rejects_bad_particles() {
        assert!(Particle::at(f64::NAN, 0.0).validate(0, 1).is_err());
        assert!(Particle::at(0.0, 0.0).with_mass(0.0).validate(0, 1).is_err());
        assert!(Particle::at(0.0, 0.0).with_operator(10).validate(0, 1).is_err());
    }
}
