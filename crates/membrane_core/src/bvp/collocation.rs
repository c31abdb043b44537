//! Fourth-order collocation solver (Lobatto IIIA / Simpson) with damped
//! Newton iterations, residual-driven mesh refinement and a banded
//! linear solve.
//!
//! Newton keeps one factorised Jacobian for as long as full steps pass the
//! Armijo test, measuring every trial by the step that factorisation would
//! take next. Mesh passes continue until every interval meets the residual
//! tolerance or the mesh would outgrow `max_nodes`.
//!
//! For interval `i` with width `h` the collocation residual is
//!
//! ```text
//! y_mid = (y_i + y_{i+1}) / 2 - h / 8 (f_{i+1} - f_i)
//! R_i   = y_{i+1} - y_i - h / 6 (f_i + 4 f(x_mid, y_mid) + f_{i+1})
//! ```
//!
//! Unknowns are ordered node by node. Boundary rows that only involve the
//! first node go on top, rows that only involve the last node at the bottom,
//! which keeps the Newton matrix banded.

use super::banded::BandedLu;
use super::solution::BvpSolution;
use super::{BoundaryValueProblem, BvpOutcome, BvpSolver, SolveFailure, SolverSettings};
use anyhow::{bail, Result};
use log::debug;
use nalgebra::DMatrix;

const ARMIJO_SIGMA: f64 = 0.2;
const BACKTRACK_FACTOR: f64 = 0.5;
const MAX_BACKTRACKS: usize = 4;
/// Newton stops once every collocation residual is this fraction of the
/// interval tolerance.
const NEWTON_RESIDUAL_FRACTION: f64 = 5e-2;

#[derive(Debug, Clone, Copy, Default)]
pub struct CollocationSolver;

impl CollocationSolver {
    pub fn new() -> Self {
        Self
    }
}

/// Which boundary residual rows constrain which end.
#[derive(Debug, Clone, PartialEq)]
struct BoundarySplit {
    start_rows: Vec<usize>,
    end_rows: Vec<usize>,
}

impl BoundarySplit {
    fn detect<P: BoundaryValueProblem>(problem: &P, ya: &[f64], yb: &[f64]) -> Result<Self, SolveFailure> {
        let (da, db) = problem.boundary_jacobian(ya, yb);
        let mut start_rows = Vec::new();
        let mut end_rows = Vec::new();
        for row in 0..problem.dimension() {
            let touches_start = da.row(row).iter().any(|v| *v != 0.0);
            let touches_end = db.row(row).iter().any(|v| *v != 0.0);
            match (touches_start, touches_end) {
                (true, true) => return Err(SolveFailure::UnseparatedBoundary { row }),
                (false, true) => end_rows.push(row),
                _ => start_rows.push(row),
            }
        }
        Ok(Self { start_rows, end_rows })
    }
}

/// Everything evaluated at the current iterate.
struct Collocation {
    node_f: DMatrix<f64>,
    mid_y: DMatrix<f64>,
    mid_f: DMatrix<f64>,
    residual: Vec<f64>,
}

struct Workspace<'a, P: BoundaryValueProblem> {
    problem: &'a P,
    mesh: &'a [f64],
    split: &'a BoundarySplit,
    dim: usize,
}

impl<'a, P: BoundaryValueProblem> Workspace<'a, P> {
    fn nodes(&self) -> usize {
        self.mesh.len()
    }

    fn node<'m>(&self, y: &'m DMatrix<f64>, j: usize) -> &'m [f64] {
        &y.as_slice()[j * self.dim..(j + 1) * self.dim]
    }

    fn collocate(&self, y: &DMatrix<f64>) -> Result<Collocation, SolveFailure> {
        let (dim, m) = (self.dim, self.nodes());
        let mut node_f = DMatrix::zeros(dim, m);
        for j in 0..m {
            let out = &mut node_f.as_mut_slice()[j * dim..(j + 1) * dim];
            self.problem.rhs(self.mesh[j], self.node(y, j), out);
        }

        let mut mid_y = DMatrix::zeros(dim, m - 1);
        let mut mid_f = DMatrix::zeros(dim, m - 1);
        let mut residual = vec![0.0; dim * m];
        let top = self.split.start_rows.len();
        for i in 0..m - 1 {
            let h = self.mesh[i + 1] - self.mesh[i];
            for k in 0..dim {
                let (y0, y1) = (y[(k, i)], y[(k, i + 1)]);
                let (f0, f1) = (node_f[(k, i)], node_f[(k, i + 1)]);
                mid_y[(k, i)] = 0.5 * (y0 + y1) - h / 8.0 * (f1 - f0);
            }
            let x_mid = self.mesh[i] + 0.5 * h;
            let mid_state = &mid_y.as_slice()[i * dim..(i + 1) * dim];
            let out = &mut mid_f.as_mut_slice()[i * dim..(i + 1) * dim];
            self.problem.rhs(x_mid, mid_state, out);
            for k in 0..dim {
                let (y0, y1) = (y[(k, i)], y[(k, i + 1)]);
                let (f0, f1) = (node_f[(k, i)], node_f[(k, i + 1)]);
                residual[top + dim * i + k] = y1 - y0 - h / 6.0 * (f0 + 4.0 * mid_f[(k, i)] + f1);
            }
        }

        let mut bc = vec![0.0; dim];
        self.problem
            .boundary_residual(self.node(y, 0), self.node(y, m - 1), &mut bc);
        for (slot, &row) in self.split.start_rows.iter().enumerate() {
            residual[slot] = bc[row];
        }
        let bottom = top + dim * (m - 1);
        for (slot, &row) in self.split.end_rows.iter().enumerate() {
            residual[bottom + slot] = bc[row];
        }

        if residual.iter().any(|v| !v.is_finite()) {
            return Err(SolveFailure::NonFinite);
        }
        Ok(Collocation {
            node_f,
            mid_y,
            mid_f,
            residual,
        })
    }

    fn jacobian(&self, y: &DMatrix<f64>, col: &Collocation) -> BandedLu {
        let (dim, m) = (self.dim, self.nodes());
        let top = self.split.start_rows.len();
        let kl = top + dim - 1;
        let ku = 2 * dim - 1 - top;
        let mut lu = BandedLu::new(dim * m, kl, ku);

        let mut jac_left = DMatrix::zeros(dim, dim);
        let mut jac_right = DMatrix::zeros(dim, dim);
        let mut jac_mid = DMatrix::zeros(dim, dim);
        let identity = DMatrix::<f64>::identity(dim, dim);
        self.problem
            .rhs_jacobian(self.mesh[0], self.node(y, 0), &mut jac_right);
        for i in 0..m - 1 {
            let h = self.mesh[i + 1] - self.mesh[i];
            std::mem::swap(&mut jac_left, &mut jac_right);
            self.problem
                .rhs_jacobian(self.mesh[i + 1], self.node(y, i + 1), &mut jac_right);
            let mid_state = &col.mid_y.as_slice()[i * dim..(i + 1) * dim];
            self.problem
                .rhs_jacobian(self.mesh[i] + 0.5 * h, mid_state, &mut jac_mid);

            let left_mid = &jac_mid * (&identity * 0.5 + &jac_left * (h / 8.0));
            let right_mid = &jac_mid * (&identity * 0.5 - &jac_right * (h / 8.0));
            let block_left = -&identity - (&jac_left + left_mid * 4.0) * (h / 6.0);
            let block_right = &identity - (&jac_right + right_mid * 4.0) * (h / 6.0);

            let row0 = top + dim * i;
            for r in 0..dim {
                for c in 0..dim {
                    lu.set(row0 + r, dim * i + c, block_left[(r, c)]);
                    lu.set(row0 + r, dim * (i + 1) + c, block_right[(r, c)]);
                }
            }
        }

        let (da, db) = self
            .problem
            .boundary_jacobian(self.node(y, 0), self.node(y, m - 1));
        for (slot, &row) in self.split.start_rows.iter().enumerate() {
            for c in 0..dim {
                lu.set(slot, c, da[(row, c)]);
            }
        }
        let bottom = top + dim * (m - 1);
        for (slot, &row) in self.split.end_rows.iter().enumerate() {
            for c in 0..dim {
                lu.set(bottom + slot, dim * (m - 1) + c, db[(row, c)]);
            }
        }
        lu
    }

    /// Factorised Jacobian at `y` with the Newton step it gives and that
    /// step's squared norm.
    fn linearise(
        &self,
        y: &DMatrix<f64>,
        col: &Collocation,
    ) -> Result<(BandedLu, Vec<f64>, f64), SolveFailure> {
        let mut lu = self.jacobian(y, col);
        lu.factor()?;
        let mut step = col.residual.clone();
        lu.solve_in_place(&mut step);
        let cost = squared_norm(&step);
        Ok((lu, step, cost))
    }

    /// Whether every collocation residual is within its share of the
    /// tolerance and every boundary residual within the boundary tolerance.
    fn meets_tolerance(&self, col: &Collocation, settings: &SolverSettings) -> bool {
        let (dim, m) = (self.dim, self.nodes());
        let top = self.split.start_rows.len();
        let bottom = top + dim * (m - 1);
        let intervals = (0..m - 1).all(|i| {
            let h = self.mesh[i + 1] - self.mesh[i];
            let scale = 2.0 / 3.0 * h * NEWTON_RESIDUAL_FRACTION * settings.tolerance;
            (0..dim).all(|k| col.residual[top + dim * i + k].abs() < scale * (1.0 + col.mid_f[(k, i)].abs()))
        });
        intervals
            && col.residual[..top]
                .iter()
                .chain(&col.residual[bottom..])
                .all(|r| r.abs() < settings.boundary_tolerance)
    }

    /// Damped Newton on the collocation equations. Returns the iterations
    /// taken and whether the residuals met [`Workspace::meets_tolerance`];
    /// running out of iterations is not an error by itself, the mesh pass
    /// after it decides.
    fn newton(
        &self,
        y: &mut DMatrix<f64>,
        settings: &SolverSettings,
    ) -> Result<(usize, bool), SolveFailure> {
        let mut col = self.collocate(y)?;
        let (mut lu, mut step, mut cost) = self.linearise(y, &col)?;
        let mut evaluations = 1;
        let mut recompute = false;
        for iteration in 1..=settings.max_newton_iterations {
            if recompute {
                (lu, step, cost) = self.linearise(y, &col)?;
                evaluations += 1;
            }

            let mut alpha = 1.0;
            let mut backtracks = 0;
            let (trial_y, trial_col, trial_step, trial_cost) = loop {
                let mut trial_y = y.clone();
                apply_step(&mut trial_y, &step, -alpha);
                let candidate = match self.collocate(&trial_y) {
                    Ok(candidate) => Some(candidate),
                    Err(failure) if backtracks == MAX_BACKTRACKS => return Err(failure),
                    Err(_) => None,
                };
                if let Some(candidate) = candidate {
                    let mut trial_step = candidate.residual.clone();
                    lu.solve_in_place(&mut trial_step);
                    let trial_cost = squared_norm(&trial_step);
                    if trial_cost < (1.0 - 2.0 * alpha * ARMIJO_SIGMA) * cost || backtracks == MAX_BACKTRACKS {
                        break (trial_y, candidate, trial_step, trial_cost);
                    }
                }
                backtracks += 1;
                alpha *= BACKTRACK_FACTOR;
            };
            *y = trial_y;
            col = trial_col;
            debug!(
                "newton iteration {}: cost {:.3e}, damping {}, jacobians {}",
                iteration, trial_cost, alpha, evaluations
            );

            let converged = self.meets_tolerance(&col, settings);
            if converged || evaluations == settings.max_jacobian_evaluations {
                return Ok((iteration, converged));
            }
            recompute = backtracks > 0;
            if !recompute {
                step = trial_step;
                cost = trial_cost;
            }
        }
        Ok((settings.max_newton_iterations, false))
    }

    /// Relative RMS residual of the Hermite interpolant on every interval,
    /// from 5-point Lobatto quadrature.
    fn rms_residuals(&self, solution: &BvpSolution) -> Vec<f64> {
        let dim = self.dim;
        let offset = 0.5 * (3.0_f64 / 7.0).sqrt();
        let mut value = vec![0.0; dim];
        let mut slope = vec![0.0; dim];
        let mut f = vec![0.0; dim];
        (0..self.nodes() - 1)
            .map(|i| {
                let h = self.mesh[i + 1] - self.mesh[i];
                let mid = self.mesh[i] + 0.5 * h;
                let mut squared = [0.0; 3];
                for (slot, x) in [mid, mid - offset * h, mid + offset * h].into_iter().enumerate() {
                    solution.interpolate(i, x, &mut value, &mut slope);
                    self.problem.rhs(x, &value, &mut f);
                    squared[slot] = slope
                        .iter()
                        .zip(&f)
                        .map(|(s, fk)| {
                            let r = (s - fk) / (1.0 + fk.abs());
                            r * r
                        })
                        .sum();
                }
                (0.5 * (32.0 / 45.0 * squared[0] + 49.0 / 90.0 * (squared[1] + squared[2]))).sqrt()
            })
            .collect()
    }

    fn boundary_violation(&self, y: &DMatrix<f64>) -> f64 {
        let mut bc = vec![0.0; self.dim];
        self.problem
            .boundary_residual(self.node(y, 0), self.node(y, self.nodes() - 1), &mut bc);
        bc.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }
}

fn squared_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}

fn apply_step(y: &mut DMatrix<f64>, step: &[f64], alpha: f64) {
    for (value, s) in y.as_mut_slice().iter_mut().zip(step) {
        *value += alpha * s;
    }
}

/// Inserts one node in intervals with a moderate residual and two in
/// intervals with a large one.
fn refine_mesh(mesh: &[f64], rms: &[f64], tolerance: f64) -> Vec<f64> {
    let mut refined = Vec::with_capacity(mesh.len() * 2);
    for (i, window) in mesh.windows(2).enumerate() {
        let (a, b) = (window[0], window[1]);
        refined.push(a);
        let h = b - a;
        if rms[i] >= 100.0 * tolerance {
            refined.push(a + h / 3.0);
            refined.push(a + 2.0 * h / 3.0);
        } else if rms[i] > tolerance {
            refined.push(a + 0.5 * h);
        }
    }
    if let Some(&last) = mesh.last() {
        refined.push(last);
    }
    refined
}

impl BvpSolver for CollocationSolver {
    fn solve<P: BoundaryValueProblem>(
        &mut self,
        problem: &P,
        mesh: &[f64],
        guess: &DMatrix<f64>,
        settings: &SolverSettings,
    ) -> Result<BvpOutcome> {
        settings.validate()?;
        let dim = problem.dimension();
        if dim == 0 {
            bail!("Problem dimension must be positive.");
        }
        if mesh.len() < 2 {
            bail!("Mesh needs at least 2 nodes (got {}).", mesh.len());
        }
        if mesh.iter().any(|x| !x.is_finite()) || mesh.windows(2).any(|w| w[0] >= w[1]) {
            bail!("Mesh must be finite and strictly increasing.");
        }
        if guess.nrows() != dim || guess.ncols() != mesh.len() {
            bail!(
                "Initial guess must be {} x {} (got {} x {}).",
                dim,
                mesh.len(),
                guess.nrows(),
                guess.ncols()
            );
        }
        if mesh.len() > settings.max_nodes {
            return Ok(BvpOutcome::Failed(SolveFailure::TooManyNodes {
                max_nodes: settings.max_nodes,
            }));
        }

        let ya: Vec<f64> = guess.column(0).iter().copied().collect();
        let yb: Vec<f64> = guess.column(mesh.len() - 1).iter().copied().collect();
        let split = match BoundarySplit::detect(problem, &ya, &yb) {
            Ok(split) => split,
            Err(failure) => return Ok(BvpOutcome::Failed(failure)),
        };

        let mut nodes = mesh.to_vec();
        let mut y = guess.clone();
        let mut total_iterations = 0;
        let mut pass = 0;
        loop {
            pass += 1;
            let work = Workspace {
                problem,
                mesh: &nodes,
                split: &split,
                dim,
            };
            let (iterations, newton_converged) = match work.newton(&mut y, settings) {
                Ok(outcome) => outcome,
                Err(failure) => return Ok(BvpOutcome::Failed(failure)),
            };
            total_iterations += iterations;
            let col = match work.collocate(&y) {
                Ok(col) => col,
                Err(failure) => return Ok(BvpOutcome::Failed(failure)),
            };

            let mut solution = BvpSolution::new(nodes.clone(), y.clone(), col.node_f)?;
            let rms = work.rms_residuals(&solution);
            if rms.iter().any(|r| !r.is_finite()) {
                return Ok(BvpOutcome::Failed(SolveFailure::NonFinite));
            }
            let worst = rms.iter().fold(0.0_f64, |acc, r| acc.max(*r));
            let violation = work.boundary_violation(&y);
            let refined = refine_mesh(&nodes, &rms, settings.tolerance);
            debug!(
                "mesh pass {}: {} nodes, worst residual {:.3e}, boundary {:.3e}, adding {}",
                pass,
                nodes.len(),
                worst,
                violation,
                refined.len() - nodes.len()
            );

            if refined.len() > settings.max_nodes {
                return Ok(BvpOutcome::Failed(SolveFailure::TooManyNodes {
                    max_nodes: settings.max_nodes,
                }));
            }
            if refined.len() > nodes.len() {
                y = solution.evaluate_on_mesh(&refined);
                nodes = refined;
                continue;
            }
            if violation <= settings.boundary_tolerance {
                solution.newton_iterations = total_iterations;
                solution.mesh_passes = pass;
                solution.max_residual = worst;
                solution.boundary_violation = violation;
                return Ok(BvpOutcome::Converged(solution));
            }
            if pass >= settings.max_boundary_passes {
                let failure = if newton_converged {
                    SolveFailure::BoundaryViolation { violation }
                } else {
                    SolveFailure::NewtonNotConverged { iterations }
                };
                return Ok(BvpOutcome::Failed(failure));
            }
        }
    }
}
