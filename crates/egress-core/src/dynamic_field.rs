//! The dynamic floor field: trail density left by moving pedestrians,
//! subject to a combined decay-and-diffusion sweep each timestep.

use crate::grid::{Coordinate, Grid, AXIAL_MODIFIERS};

/// Scalar trail density with its write buffer for the update sweep.
#[derive(Debug, Clone)]
pub struct DynamicField {
    current: Grid<f64>,
    next: Grid<f64>,
}

impl DynamicField {
    /// Builds a zeroed field.
    #[must_use]
    pub fn new(lines: usize, columns: usize) -> Self {
        Self {
            current: Grid::new(lines, columns, 0.0),
            next: Grid::new(lines, columns, 0.0),
        }
    }

    /// Zeroes the field for a fresh run.
    pub fn reset(&mut self) {
        self.current.fill(0.0);
    }

    /// Deposits one unit of density at `at`.
    pub fn deposit(&mut self, at: Coordinate) {
        self.current[at] += 1.0;
    }

    /// Current density at `at`.
    #[must_use]
    pub fn value(&self, at: Coordinate) -> f64 {
        self.current[at]
    }

    /// The current density grid.
    #[must_use]
    pub fn grid(&self) -> &Grid<f64> {
        &self.current
    }

    /// One decay-and-diffusion sweep.
    ///
    /// For every unblocked cell,
    /// `next = (1 - alpha)(1 - delta) * current + alpha (1 - delta) / 4 * sum(axial)`
    /// where blocked neighbors contribute nothing; blocked cells hold zero.
    /// The result is renormalized to unit mass when any density remains.
    pub fn apply_decay_and_diffusion(
        &mut self,
        diffusion: f64,
        decay: f64,
        blocked: impl Fn(Coordinate) -> bool,
    ) {
        let kept = (1.0 - diffusion) * (1.0 - decay);
        let spread = diffusion * (1.0 - decay) / 4.0;

        let mut total = 0.0;
        for at in self.current.coordinates() {
            if blocked(at) {
                self.next[at] = 0.0;
                continue;
            }

            let mut incoming = 0.0;
            for &modifier in &AXIAL_MODIFIERS {
                let neighbor = at.offset(modifier);
                if !self.current.in_bounds(neighbor) || blocked(neighbor) {
                    continue;
                }
                incoming += self.current[neighbor];
            }

            let value = kept * self.current[at] + spread * incoming;
            self.next[at] = value;
            total += value;
        }

        if total != 0.0 {
            for at in self.next.coordinates() {
                self.next[at] /= total;
            }
        }

        self.current.copy_from(&self.next);
    }
}
