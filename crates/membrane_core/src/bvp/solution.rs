use anyhow::{bail, Result};
use nalgebra::DMatrix;

/// A converged collocation solution.
///
/// `states` and `derivatives` are `dim x nodes`; between nodes the solution
/// is the cubic Hermite interpolant of `(states, derivatives)`, which is also
/// what continuation hands to the next solve as its guess. The mesh always
/// holds at least two strictly increasing nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct BvpSolution {
    mesh: Vec<f64>,
    states: DMatrix<f64>,
    derivatives: DMatrix<f64>,
    pub newton_iterations: usize,
    pub mesh_passes: usize,
    /// Worst relative RMS collocation residual over all intervals.
    pub max_residual: f64,
    pub boundary_violation: f64,
}

impl BvpSolution {
    pub fn new(mesh: Vec<f64>, states: DMatrix<f64>, derivatives: DMatrix<f64>) -> Result<Self> {
        if mesh.len() < 2 {
            bail!("A solution needs at least 2 nodes, got {}.", mesh.len());
        }
        if !mesh.windows(2).all(|w| w[0] < w[1]) {
            bail!("Solution mesh must be strictly increasing.");
        }
        if states.ncols() != mesh.len() || states.shape() != derivatives.shape() {
            bail!(
                "States {:?} and derivatives {:?} do not match a mesh of {} nodes.",
                states.shape(),
                derivatives.shape(),
                mesh.len()
            );
        }
        Ok(Self {
            mesh,
            states,
            derivatives,
            newton_iterations: 0,
            mesh_passes: 0,
            max_residual: 0.0,
            boundary_violation: 0.0,
        })
    }

    pub fn mesh(&self) -> &[f64] {
        &self.mesh
    }

    /// Node states, `dim x nodes`.
    pub fn states(&self) -> &DMatrix<f64> {
        &self.states
    }

    pub fn derivatives(&self) -> &DMatrix<f64> {
        &self.derivatives
    }

    pub fn dimension(&self) -> usize {
        self.states.nrows()
    }

    pub fn node_count(&self) -> usize {
        self.mesh.len()
    }

    /// State at the first node.
    pub fn start(&self) -> Vec<f64> {
        self.states.column(0).iter().copied().collect()
    }

    /// State at the last node.
    pub fn end(&self) -> Vec<f64> {
        self.states
            .column(self.mesh.len() - 1)
            .iter()
            .copied()
            .collect()
    }

    /// Interpolated state at `x`. Outside the mesh the end interval's cubic
    /// is extrapolated.
    pub fn evaluate(&self, x: f64) -> Vec<f64> {
        let mut value = vec![0.0; self.dimension()];
        let mut slope = vec![0.0; self.dimension()];
        self.interpolate(self.interval_of(x), x, &mut value, &mut slope);
        value
    }

    /// Derivative of the interpolant at `x`.
    pub fn evaluate_derivative(&self, x: f64) -> Vec<f64> {
        let mut value = vec![0.0; self.dimension()];
        let mut slope = vec![0.0; self.dimension()];
        self.interpolate(self.interval_of(x), x, &mut value, &mut slope);
        slope
    }

    /// Interpolated states on another mesh, as a `dim x mesh.len()` matrix.
    pub fn evaluate_on_mesh(&self, mesh: &[f64]) -> DMatrix<f64> {
        let dim = self.dimension();
        let mut out = DMatrix::zeros(dim, mesh.len());
        let mut slope = vec![0.0; dim];
        for (j, &x) in mesh.iter().enumerate() {
            let start = j * dim;
            let column = &mut out.as_mut_slice()[start..start + dim];
            self.interpolate(self.interval_of(x), x, column, &mut slope);
        }
        out
    }

    pub(crate) fn interval_of(&self, x: f64) -> usize {
        let upper = self.mesh.partition_point(|&node| node <= x);
        upper.saturating_sub(1).min(self.mesh.len().saturating_sub(2))
    }

    /// Cubic Hermite value and slope on interval `i` at `x`.
    pub(crate) fn interpolate(&self, i: usize, x: f64, value: &mut [f64], slope: &mut [f64]) {
        let dim = self.dimension();
        let h = self.mesh[i + 1] - self.mesh[i];
        let t = (x - self.mesh[i]) / h;
        let weights = HermiteWeights::at(t);
        let y = self.states.as_slice();
        let f = self.derivatives.as_slice();
        let (left, right) = (i * dim, (i + 1) * dim);
        for k in 0..dim {
            let (y0, y1) = (y[left + k], y[right + k]);
            let (f0, f1) = (f[left + k], f[right + k]);
            value[k] = weights.h00 * y0 + weights.h10 * h * f0 + weights.h01 * y1 + weights.h11 * h * f1;
            slope[k] = (weights.d00 * y0 + weights.d01 * y1) / h + weights.d10 * f0 + weights.d11 * f1;
        }
    }
}

struct HermiteWeights {
    h00: f64,
    h10: f64,
    h01: f64,
    h11: f64,
    d00: f64,
    d10: f64,
    d01: f64,
    d11: f64,
}

impl HermiteWeights {
    fn at(t: f64) -> Self {
        let t2 = t * t;
        let t3 = t2 * t;
        Self {
            h00: 2.0 * t3 - 3.0 * t2 + 1.0,
            h10: t3 - 2.0 * t2 + t,
            h01: -2.0 * t3 + 3.0 * t2,
            h11: t3 - t2,
            d00: 6.0 * t2 - 6.0 * t,
            d10: 3.0 * t2 - 4.0 * t + 1.0,
            d01: -6.0 * t2 + 6.0 * t,
            d11: 3.0 * t2 - 2.0 * t,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y = (x^3, x^2) sampled with exact slopes is reproduced exactly.
    fn cubic_solution() -> BvpSolution {
        let mesh = vec![0.0, 0.5, 1.5, 2.0];
        let mut states = DMatrix::zeros(2, mesh.len());
        let mut derivs = DMatrix::zeros(2, mesh.len());
        for (j, &x) in mesh.iter().enumerate() {
            states[(0, j)] = x * x * x;
            states[(1, j)] = x * x;
            derivs[(0, j)] = 3.0 * x * x;
            derivs[(1, j)] = 2.0 * x;
        }
        BvpSolution::new(mesh, states, derivs).expect("cubic samples form a valid solution")
    }

    #[test]
    fn hermite_interpolant_reproduces_cubics() {
        let sol = cubic_solution();
        for &x in &[0.0, 0.2, 0.5, 0.9, 1.5, 1.99, 2.0] {
            let y = sol.evaluate(x);
            let dy = sol.evaluate_derivative(x);
            assert!((y[0] - x * x * x).abs() < 1e-12, "x = {x}");
            assert!((y[1] - x * x).abs() < 1e-12);
            assert!((dy[0] - 3.0 * x * x).abs() < 1e-12);
            assert!((dy[1] - 2.0 * x).abs() < 1e-12);
        }
    }

    #[test]
    fn evaluation_outside_mesh_extrapolates_end_intervals() {
        let sol = cubic_solution();
        assert!((sol.evaluate(-0.5)[0] + 0.125).abs() < 1e-12);
        assert!((sol.evaluate(2.5)[1] - 6.25).abs() < 1e-12);
    }

    #[test]
    fn resampling_matches_pointwise_evaluation() {
        let sol = cubic_solution();
        let mesh = [0.1, 0.7, 1.6];
        let resampled = sol.evaluate_on_mesh(&mesh);
        for (j, &x) in mesh.iter().enumerate() {
            let y = sol.evaluate(x);
            assert_eq!(resampled[(0, j)], y[0]);
            assert_eq!(resampled[(1, j)], y[1]);
        }
        assert_eq!(sol.start(), vec![0.0, 0.0]);
        assert_eq!(sol.end(), vec![8.0, 4.0]);
    }

    #[test]
    fn degenerate_solutions_are_rejected() {
        let single = BvpSolution::new(vec![0.0], DMatrix::zeros(2, 1), DMatrix::zeros(2, 1));
        assert!(single.is_err());

        let unordered = BvpSolution::new(vec![0.0, 1.0, 1.0], DMatrix::zeros(1, 3), DMatrix::zeros(1, 3));
        assert!(unordered.is_err());

        let mismatched = BvpSolution::new(vec![0.0, 1.0], DMatrix::zeros(2, 2), DMatrix::zeros(2, 3));
        assert!(mismatched.is_err());

        let smallest = BvpSolution::new(vec![0.0, 1.0], DMatrix::zeros(1, 2), DMatrix::zeros(1, 2))
            .expect("two nodes form a valid solution");
        assert_eq!(smallest.evaluate(0.5), vec![0.0]);
        assert_eq!(smallest.evaluate_derivative(3.0), vec![0.0]);
    }
}
