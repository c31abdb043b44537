use crate::autodiff::{system_jacobian, vector_jacobian};
use crate::boundary::{MembraneBoundary, RESIDUAL_COUNT};
use crate::bvp::BoundaryValueProblem;
use crate::params::SolveContext;
use crate::shape::{ShapeEquations, STATE_DIM};
use crate::traits::ArcLengthSystem;
use nalgebra::DMatrix;

/// The membrane shape problem for one coat boundary, with exact Jacobians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MembraneProblem {
    pub equations: ShapeEquations,
    pub boundary: MembraneBoundary,
}

impl MembraneProblem {
    pub fn new(ctx: &SolveContext) -> Self {
        Self {
            equations: ShapeEquations::new(ctx),
            boundary: MembraneBoundary::new(ctx),
        }
    }
}

impl BoundaryValueProblem for MembraneProblem {
    fn dimension(&self) -> usize {
        STATE_DIM
    }

    fn rhs(&self, x: f64, y: &[f64], out: &mut [f64]) {
        self.equations.apply(x, y, out);
    }

    fn rhs_jacobian(&self, x: f64, y: &[f64], out: &mut DMatrix<f64>) {
        system_jacobian(&self.equations, x, y, out);
    }

    fn boundary_residual(&self, ya: &[f64], yb: &[f64], out: &mut [f64]) {
        self.boundary.residual(ya, yb, out);
    }

    fn boundary_jacobian(&self, ya: &[f64], yb: &[f64]) -> (DMatrix<f64>, DMatrix<f64>) {
        let mut both = Vec::with_capacity(2 * STATE_DIM);
        both.extend_from_slice(ya);
        both.extend_from_slice(yb);
        let jac = vector_jacobian(&both, RESIDUAL_COUNT, |z, out| {
            self.boundary.residual(&z[..STATE_DIM], &z[STATE_DIM..], out);
        });
        (
            jac.columns(0, STATE_DIM).into_owned(),
            jac.columns(STATE_DIM, STATE_DIM).into_owned(),
        )
    }
}
