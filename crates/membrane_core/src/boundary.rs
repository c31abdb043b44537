//! Pole and rim boundary conditions.

use crate::params::SolveContext;
use crate::shape::{L, LAMBDA, PSI, STATE_DIM, X, Y};
use crate::traits::{lift, Scalar};

pub const RESIDUAL_COUNT: usize = STATE_DIM;

/// Boundary conditions for one sweep step.
///
/// At the pole (first mesh point): `x = pole_offset` (x = 0 is singular),
/// `psi = 0` and `l = 0`. At the rim: `y = 0`, `psi = 0` and
/// `lambda = lambda0_nd`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MembraneBoundary {
    pub pole_offset: f64,
    pub tension_nd: f64,
}

impl MembraneBoundary {
    pub fn new(ctx: &SolveContext) -> Self {
        Self {
            pole_offset: ctx.params.pole_offset,
            tension_nd: ctx.tension_nd,
        }
    }

    pub fn residual<T: Scalar>(&self, pole: &[T], rim: &[T], out: &mut [T]) {
        out[0] = pole[X] - lift(self.pole_offset);
        out[1] = pole[PSI];
        out[2] = pole[L];
        out[3] = rim[Y];
        out[4] = rim[PSI];
        out[5] = rim[LAMBDA] - lift(self.tension_nd);
    }

    /// Largest absolute residual.
    pub fn max_violation(&self, pole: &[f64], rim: &[f64]) -> f64 {
        let mut out = [0.0_f64; RESIDUAL_COUNT];
        self.residual(pole, rim, &mut out[..]);
        out.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }
}
