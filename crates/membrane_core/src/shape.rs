//! Axisymmetric shape equations.
//!
//! State layout: `[x, y, psi, h, l, lambda]` = radial coordinate, axial
//! coordinate, tangent angle, mean curvature, curvature conjugate and tension
//! conjugate, all as functions of the area-like arc-length `alpha`.

use crate::params::SolveContext;
use crate::profile::MaterialProfile;
use crate::traits::{lift, ArcLengthSystem, Scalar};
use anyhow::{bail, Result};
use nalgebra::DMatrix;

pub const STATE_DIM: usize = 6;

pub const X: usize = 0;
pub const Y: usize = 1;
pub const PSI: usize = 2;
pub const H: usize = 3;
pub const L: usize = 4;
pub const LAMBDA: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeEquations {
    pub profile: MaterialProfile,
    pub min_radius: f64,
    pub min_modulus: f64,
    pub modulus_slope_limit: f64,
}

impl ShapeEquations {
    pub fn new(ctx: &SolveContext) -> Self {
        Self {
            profile: MaterialProfile::from_context(ctx),
            min_radius: ctx.params.min_radius,
            min_modulus: ctx.params.min_modulus,
            modulus_slope_limit: ctx.params.modulus_slope_limit,
        }
    }

    /// Evaluates the right-hand side at every column of `states` (6 x n).
    pub fn evaluate_on_mesh(&self, mesh: &[f64], states: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        if states.nrows() != STATE_DIM || states.ncols() != mesh.len() {
            bail!(
                "State matrix must be {} x {} (got {} x {}).",
                STATE_DIM,
                mesh.len(),
                states.nrows(),
                states.ncols()
            );
        }
        let mut out = DMatrix::zeros(STATE_DIM, mesh.len());
        let mut column = [0.0_f64; STATE_DIM];
        let mut deriv = [0.0_f64; STATE_DIM];
        for (j, &alpha) in mesh.iter().enumerate() {
            for i in 0..STATE_DIM {
                column[i] = states[(i, j)];
            }
            self.apply(alpha, &column[..], &mut deriv[..]);
            for i in 0..STATE_DIM {
                out[(i, j)] = deriv[i];
            }
        }
        Ok(out)
    }
}

impl<T: Scalar> ArcLengthSystem<T> for ShapeEquations {
    fn dimension(&self) -> usize {
        STATE_DIM
    }

    fn apply(&self, alpha: f64, state: &[T], out: &mut [T]) {
        let sample = self.profile.sample(alpha);
        let c: T = lift(sample.curvature);
        let dc: T = lift(sample.curvature_slope);
        let k = sample.modulus.max(self.min_modulus);
        let dk = sample
            .modulus_slope
            .clamp(-self.modulus_slope_limit, self.modulus_slope_limit);
        let dkg = sample.gaussian_slope;
        let d2kg = sample.gaussian_curvature;
        let p = sample.pressure;
        let fbar = sample.force;

        let x = state[X].max(lift(self.min_radius));
        let psi = state[PSI];
        let h = state[H];
        let l = state[L];
        let lam = state[LAMBDA];

        let two: T = lift(2.0);
        let (sin_psi, cos_psi) = (psi.sin(), psi.cos());
        let kt: T = lift(k);
        let dkt: T = lift(dk);
        let dk_over_k: T = lift(dk / k);

        let hc = h - c;
        let sin_over_x = sin_psi / x;
        let h_minus = h - sin_over_x;
        // Gaussian curvature from the two principal curvatures.
        let gauss = h * h - h_minus * h_minus;

        let f_normal = cos_psi * lift(fbar);
        let f_tangent = sin_psi * lift(fbar);

        out[X] = cos_psi / x;
        out[Y] = sin_psi / x;
        out[PSI] = two * h / x - sin_psi / (x * x);
        out[H] = l / (x * x) + dc - dk_over_k * hc;
        out[L] = lift::<T>(p / k) + f_normal / kt
            + two * h * (hc * hc + lam / kt)
            - two * hc * (h * h + h_minus * h_minus)
            - dk_over_k * l
            - x * lift(d2kg / k) * sin_psi
            - lift::<T>(dkg / k) * cos_psi * (two * h - sin_over_x);
        out[LAMBDA] = -dkt * hc * hc + two * kt * hc * dc - lift::<T>(dkg) * gauss - f_tangent / x;
    }
}
