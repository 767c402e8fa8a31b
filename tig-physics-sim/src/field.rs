//! Coarse coherence histogram over the canvas. Rebuilt every tick; never fed back.

use serde::Serialize;

use crate::particle::Particle;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoherenceField {
    cols: usize,
    rows: usize,
    /// Row-major, normalised by the hottest cell.
    cells: Vec<f64>,
    max_raw: f64,
}

impl CoherenceField {
    pub fn new(cols: usize, rows: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            cols,
            rows,
            cells: vec![0.0; cols * rows],
            max_raw: 0.0,
        }
    }

    /// Bin every particle's `s` by position and normalise to [0, 1].
    pub fn recompute(&mut self, particles: &[Particle], width: f64, height: f64) {
        self.cells.iter_mut().for_each(|c| *c = 0.0);
        for p in particles {
            let col = bin(p.x, width, self.cols);
            let row = bin(p.y, height, self.rows);
            self.cells[row * self.cols + col] += p.s;
        }
        self.max_raw = self.cells.iter().copied().fold(0.0, f64::max);
        if self.max_raw > f64::EPSILON {
            let max = self.max_raw;
            self.cells.iter_mut().for_each(|c| *c /= max);
        }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cell(&self, col: usize, row: usize) -> Option<f64> {
        if col < self.cols && row < self.rows {
            Some(self.cells[row * self.cols + col])
        } else {
            None
        }
    }

    pub fn cells(&self) -> &[f64] {
        &self.cells
    }

    /// Un-normalised value of the hottest cell.
    pub fn max_raw(&self) -> f64 {
        self.max_raw
    }

    pub fn mean(&self) -> f64 {
        self.cells.iter().sum::<f64>() / self.cells.len() as f64
    }
}

fn bin(pos: f64, extent: f64, bins: usize) -> usize {
    if !(pos.is_finite() && extent > 0.0) || pos <= 0.0 {
        return 0;
    }
    ((pos / extent * bins as f64) as usize).min(bins - 1)
}
