//! Ten-slot phase spine.
//!
//! One slot is rewritten per tick. The active index walks 0→9 circularly and
//! the epoch counter increments on every wrap back to 0. Slot `i` is updated
//! from its own previous value `o` and its circular predecessor `p`:
//!
//! | slot | rule                                  |
//! |------|---------------------------------------|
//! | 0    | o·(1−σ)·0.1                           |
//! | 1    | o·σ + p·(1−σ)                         |
//! | 2    | \|o−p\|·σ + o·(1−σ)                   |
//! | 3    | o + (1−o)·(1−σ)                       |
//! | 4    | o·σ                                   |
//! | 5    | (o + mean(all slots)) / 2             |
//! | 6    | o·σ + N(0, 0.002)                     |
//! | 7    | √max(0.001, o·p)                      |
//! | 8    | o·(1 + 0.008·sin(0.1·tick))           |
//! | 9    | o·σ + T*·(1−σ)                        |
//!
//! Every result is clamped to [0.001, 1].

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::constants::Constants;

pub const SLOTS: usize = 10;
pub const SLOT_MIN: f64 = 0.001;
pub const SLOT_MAX: f64 = 1.0;
/// Standard deviation of the Gaussian perturbation injected into the noise slot.
pub const NOISE_STD_DEV: f64 = 0.002;

/// Named slots read by the force model.
pub mod slot {
    pub const STRONG: usize = 1;
    pub const WEAK: usize = 4;
    pub const GRAVITY: usize = 5;
    pub const NOISE: usize = 6;
    pub const ELECTROMAGNETIC: usize = 8;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpine {
    values: [f64; SLOTS],
    current: usize,
    epoch: u64,
    #[serde(skip, default = "Constants::tig")]
    constants: Constants,
}

impl PhaseSpine {
    /// Every slot starts at T*.
    pub fn new(constants: Constants) -> Self {
        Self::with_values([constants.t_star; SLOTS], constants)
    }

    /// Start from explicit slot values (clamped into range).
    pub fn with_values(values: [f64; SLOTS], constants: Constants) -> Self {
        Self {
            values: values.map(clamp_slot),
            current: 0,
            epoch: 0,
            constants,
        }
    }

    /// Move to the next slot, rewrite it, and return its new value.
    pub fn advance<R: Rng>(&mut self, tick: u64, rng: &mut R) -> f64 {
        self.current = (self.current + 1) % SLOTS;
        if self.current == 0 {
            self.epoch += 1;
            log::debug!("spine wrapped, epoch {}", self.epoch);
        }
        let i = self.current;
        let o = self.values[i];
        let p = self.values[(i + SLOTS - 1) % SLOTS];
        let sigma = self.constants.sigma;
        let fresh = self.constants.fresh_weight();

        let next = match i {
            0 => o * fresh * 0.1,
            slot::STRONG => o * sigma + p * fresh,
            2 => (o - p).abs() * sigma + o * fresh,
            3 => o + (1.0 - o) * fresh,
            slot::WEAK => o * sigma,
            slot::GRAVITY => (o + self.mean()) / 2.0,
            slot::NOISE => o * sigma + noise(rng),
            7 => (o * p).max(0.001).sqrt(),
            slot::ELECTROMAGNETIC => o * (1.0 + 0.008 * (tick as f64 * 0.1).sin()),
            _ => o * sigma + self.constants.t_star * fresh,
        };
        self.values[i] = clamp_slot(next);
        self.values[i]
    }

    pub fn get(&self, slot: usize) -> f64 {
        self.values[slot % SLOTS]
    }

    pub fn values(&self) -> &[f64; SLOTS] {
        &self.values
    }

    /// Index of the slot rewritten by the last advance.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Value of the current slot.
    pub fn current_value(&self) -> f64 {
        self.values[self.current]
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn mean(&self) -> f64 {
        self.values.iter().sum::<f64>() / SLOTS as f64
    }
}

fn noise<R: Rng>(rng: &mut R) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    z * NOISE_STD_DEV
}

fn clamp_slot(v: f64) -> f64 {
    if v.is_nan() {
        SLOT_MIN
    } else {
        v.clamp(SLOT_MIN, SLOT_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn spine() -> PhaseSpine {
        PhaseSpine::new(Constants::default())
    }

    #[test]
    fn epoch_increments_once_per_ten_advances() {
        let mut s = spine();
        let mut rng = StdRng::seed_from_u64(1);
        for tick in 1..=95u64 {
            s.advance(tick, &mut rng);
            assert_eq!(s.epoch(), tick / 10, "epoch after {} advances", tick);
            assert_eq!(s.current(), (tick % 10) as usize);
        }
    }

    #[test]
    fn exactly_one_slot_changes_per_advance() {
        let mut s = PhaseSpine::with_values(
            [0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 0.35, 0.45],
            Constants::default(),
        );
        let mut rng = StdRng::seed_from_u64(2);
        for tick in 1..=40u64 {
            let before = *s.values();
            s.advance(tick, &mut rng);
            let changed: Vec<usize> = (0..SLOTS)
                .filter(|&i| before[i] != s.values()[i])
                .collect();
            assert!(changed.len() <= 1, "tick {} changed {:?}", tick, changed);
            if let Some(&i) = changed.first() {
                assert_eq!(i, s.current());
            }
        }
    }

    #[test]
    fn slots_stay_in_range() {
        let mut s = PhaseSpine::with_values([1.0; SLOTS], Constants::default());
        let mut rng = StdRng::seed_from_u64(3);
        for tick in 1..=5_000u64 {
            s.advance(tick, &mut rng);
            for v in s.values() {
                assert!((SLOT_MIN..=SLOT_MAX).contains(v), "slot value {} out of range", v);
            }
        }
    }

    #[test]
    fn deterministic_slot_rules() {
        let c = Constants::default();
        let mut s = PhaseSpine::with_values(
            [0.5, 0.6, 0.7, 0.2, 0.8, 0.3, 0.4, 0.25, 0.5, 0.1],
            c,
        );
        let mut rng = StdRng::seed_from_u64(4);

        // slot 1: o·σ + p·(1−σ)
        let v = s.advance(1, &mut rng);
        assert!((v - (0.6 * c.sigma + 0.5 * 0.009)).abs() < 1e-12);
        // slot 2 uses the freshly written slot 1 as predecessor
        let p = v;
        let v = s.advance(2, &mut rng);
        assert!((v - ((0.7 - p).abs() * c.sigma + 0.7 * 0.009)).abs() < 1e-12);
        // slot 3: slow approach to 1
        let v = s.advance(3, &mut rng);
        assert!((v - (0.2 + 0.8 * 0.009)).abs() < 1e-12);
        // slot 4: slow decay
        let v = s.advance(4, &mut rng);
        assert!((v - 0.8 * c.sigma).abs() < 1e-12);
        // slot 5: average with the spine mean
        let mean = s.mean();
        let v = s.advance(5, &mut rng);
        assert!((v - (0.3 + mean) / 2.0).abs() < 1e-12);
        // slot 6: decay plus small Gaussian noise
        let v = s.advance(6, &mut rng);
        assert!((v - 0.4 * c.sigma).abs() < 10.0 * NOISE_STD_DEV);
        // slot 7: geometric mean with predecessor
        let p = v;
        let v = s.advance(7, &mut rng);
        assert!((v - (0.25 * p).max(0.001).sqrt()).abs() < 1e-12);
        // slot 8: slow oscillation
        let v = s.advance(8, &mut rng);
        assert!((v - 0.5 * (1.0 + 0.008 * 0.8f64.sin())).abs() < 1e-12);
        // slot 9: pull toward T*
        let v = s.advance(9, &mut rng);
        assert!((v - (0.1 * c.sigma + c.t_star * 0.009)).abs() < 1e-12);
        // slot 0: collapse, clamped at the floor
        let v = s.advance(10, &mut rng);
        assert_eq!(v, SLOT_MIN);
        assert_eq!(s.epoch(), 1);
    }

    #[test]
    fn noise_is_gaussian_with_small_spread() {
        let mut rng = StdRng::seed_from_u64(5);
        let draws: Vec<f64> = (0..20_000).map(|_| noise(&mut rng)).collect();
        let n = draws.len() as f64;
        let mean = draws.iter().sum::<f64>() / n;
        let std = (draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
        assert!(mean.abs() < 1e-4, "noise mean {}", mean);
        assert!((std - NOISE_STD_DEV).abs() < 1e-4, "noise std {}", std);
        // Unbounded tails, unlike a uniform draw of the same spread.
        let beyond = draws.iter().filter(|d| d.abs() > 0.0035).count();
        assert!(beyond > 0);
    }

    #[test]
    fn starts_at_threshold() {
        let s = spine();
        assert!(s.values().iter().all(|v| *v == Constants::default().t_star));
        assert_eq!((s.current(), s.epoch()), (0, 0));
    }

    #[test]
    fn with_values_clamps_input() {
        let s = PhaseSpine::with_values([5.0; SLOTS], Constants::default());
        assert!(s.values().iter().all(|v| *v == SLOT_MAX));
    }
}

// ─── Kani formal verification harnesses ─────────────────────────────────────
#[cfg(kani)]
mod kani_proofs {
    use super::*;

    /// Prove the slot clamp always lands in [SLOT_MIN, SLOT_MAX].
    #[kani::proof]
    fn clamp_slot_in_range() {
        let v: f64 = kani::any();
        kani::assume(!v.is_nan());
        let c = clamp_slot(v);
        assert!(c >= SLOT_MIN && c <= SLOT_MAX);
    }
}
