//! Two-point boundary-value problems and the solver contract.
//!
//! The sweep controller only relies on [`BvpSolver`]: hand it a right-hand
//! side, boundary residuals, a mesh, a guess and a tolerance, and get back a
//! [`BvpOutcome`]. [`CollocationSolver`] is the backend shipped with the crate.

mod banded;
mod collocation;
mod solution;

pub use collocation::CollocationSolver;
pub use solution::BvpSolution;

use anyhow::Result;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A first-order ODE system on `[a, b]` closed by boundary residuals that
/// involve only the states at `a` and `b`.
pub trait BoundaryValueProblem {
    /// Number of state components (and of boundary residuals).
    fn dimension(&self) -> usize;

    /// Evaluates `dy/dx` at `(x, y)` into `out`.
    fn rhs(&self, x: f64, y: &[f64], out: &mut [f64]);

    /// Jacobian of the right-hand side with respect to `y`.
    /// Defaults to central differences.
    fn rhs_jacobian(&self, x: f64, y: &[f64], out: &mut DMatrix<f64>) {
        let dim = self.dimension();
        let mut shifted = y.to_vec();
        let mut plus = vec![0.0; dim];
        let mut minus = vec![0.0; dim];
        for col in 0..dim {
            let step = 1e-7 * (1.0 + y[col].abs());
            shifted[col] = y[col] + step;
            self.rhs(x, &shifted, &mut plus);
            shifted[col] = y[col] - step;
            self.rhs(x, &shifted, &mut minus);
            shifted[col] = y[col];
            for row in 0..dim {
                out[(row, col)] = (plus[row] - minus[row]) / (2.0 * step);
            }
        }
    }

    /// Boundary residuals `g(y(a), y(b))`, zero at a solution.
    fn boundary_residual(&self, ya: &[f64], yb: &[f64], out: &mut [f64]);

    /// Jacobians of the boundary residuals with respect to `y(a)` and `y(b)`.
    /// Defaults to central differences.
    fn boundary_jacobian(&self, ya: &[f64], yb: &[f64]) -> (DMatrix<f64>, DMatrix<f64>) {
        let dim = self.dimension();
        let mut da = DMatrix::zeros(dim, dim);
        let mut db = DMatrix::zeros(dim, dim);
        let mut plus = vec![0.0; dim];
        let mut minus = vec![0.0; dim];
        let mut shifted_a = ya.to_vec();
        let mut shifted_b = yb.to_vec();
        for col in 0..dim {
            let step = 1e-7 * (1.0 + ya[col].abs());
            shifted_a[col] = ya[col] + step;
            self.boundary_residual(&shifted_a, yb, &mut plus);
            shifted_a[col] = ya[col] - step;
            self.boundary_residual(&shifted_a, yb, &mut minus);
            shifted_a[col] = ya[col];
            for row in 0..dim {
                da[(row, col)] = (plus[row] - minus[row]) / (2.0 * step);
            }

            let step = 1e-7 * (1.0 + yb[col].abs());
            shifted_b[col] = yb[col] + step;
            self.boundary_residual(ya, &shifted_b, &mut plus);
            shifted_b[col] = yb[col] - step;
            self.boundary_residual(ya, &shifted_b, &mut minus);
            shifted_b[col] = yb[col];
            for row in 0..dim {
                db[(row, col)] = (plus[row] - minus[row]) / (2.0 * step);
            }
        }
        (da, db)
    }
}

/// Settings handed to a [`BvpSolver`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverSettings {
    /// Relative collocation residual accepted on every interval.
    pub tolerance: f64,
    /// Absolute boundary residual accepted.
    pub boundary_tolerance: f64,
    /// Mesh refinement never grows the mesh beyond this many nodes.
    pub max_nodes: usize,
    /// Newton iterations per mesh pass.
    pub max_newton_iterations: usize,
    /// Jacobian evaluations per mesh pass. Between evaluations the last
    /// factorisation is reused for as long as full steps are accepted.
    pub max_jacobian_evaluations: usize,
    /// Once this many passes have run, a pass that adds no nodes but leaves
    /// the boundary residual above tolerance ends the solve. Passes that
    /// refine the mesh are bounded by `max_nodes` alone.
    pub max_boundary_passes: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-3,
            boundary_tolerance: 1e-3,
            max_nodes: 200_000,
            max_newton_iterations: 8,
            max_jacobian_evaluations: 4,
            max_boundary_passes: 10,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            anyhow::bail!("Solver tolerance must be positive (got {}).", self.tolerance);
        }
        if !(self.boundary_tolerance > 0.0 && self.boundary_tolerance.is_finite()) {
            anyhow::bail!(
                "Boundary tolerance must be positive (got {}).",
                self.boundary_tolerance
            );
        }
        if self.max_nodes < 2 {
            anyhow::bail!("max_nodes must be at least 2.");
        }
        if self.max_newton_iterations == 0 {
            anyhow::bail!("max_newton_iterations must be greater than zero.");
        }
        if self.max_jacobian_evaluations == 0 {
            anyhow::bail!("max_jacobian_evaluations must be greater than zero.");
        }
        if self.max_boundary_passes == 0 {
            anyhow::bail!("max_boundary_passes must be greater than zero.");
        }
        Ok(())
    }
}

/// Why a solve did not converge.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveFailure {
    #[error("Newton iteration did not converge within {iterations} iterations")]
    NewtonNotConverged { iterations: usize },
    #[error("mesh refinement would exceed {max_nodes} nodes")]
    TooManyNodes { max_nodes: usize },
    #[error("singular collocation Jacobian")]
    SingularJacobian,
    #[error("non-finite residual encountered")]
    NonFinite,
    #[error("boundary residual {violation:.3e} above tolerance")]
    BoundaryViolation { violation: f64 },
    #[error("boundary condition row {row} couples both ends")]
    UnseparatedBoundary { row: usize },
}

/// Result of one solver call: either a converged solution or the reason it
/// failed. Callers must handle both.
#[derive(Debug, Clone)]
pub enum BvpOutcome {
    Converged(BvpSolution),
    Failed(SolveFailure),
}

impl BvpOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, BvpOutcome::Converged(_))
    }

    pub fn solution(&self) -> Option<&BvpSolution> {
        match self {
            BvpOutcome::Converged(sol) => Some(sol),
            BvpOutcome::Failed(_) => None,
        }
    }
}

/// A routine that solves [`BoundaryValueProblem`]s.
///
/// `Err` is reserved for malformed input (mesh/guess shape, settings);
/// non-convergence is reported as [`BvpOutcome::Failed`].
pub trait BvpSolver {
    fn solve<P: BoundaryValueProblem>(
        &mut self,
        problem: &P,
        mesh: &[f64],
        guess: &DMatrix<f64>,
        settings: &SolverSettings,
    ) -> Result<BvpOutcome>;
}

impl<S: BvpSolver + ?Sized> BvpSolver for &mut S {
    fn solve<P: BoundaryValueProblem>(
        &mut self,
        problem: &P,
        mesh: &[f64],
        guess: &DMatrix<f64>,
        settings: &SolverSettings,
    ) -> Result<BvpOutcome> {
        (**self).solve(problem, mesh, guess, settings)
    }
}
