//! Graded arc-length mesh and the seed trajectory for the first solve of a
//! sweep.

use crate::params::SolveContext;
use crate::shape::{LAMBDA, STATE_DIM, X};
use anyhow::{bail, Result};
use nalgebra::DMatrix;

/// `count` evenly spaced points on `[start, end)`.
pub fn linspace_open(start: f64, end: f64, count: usize) -> Vec<f64> {
    let step = (end - start) / count as f64;
    (0..count).map(|i| start + step * i as f64).collect()
}

/// `count` evenly spaced points on `[start, end]`.
pub fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            let mut points: Vec<f64> = (0..count).map(|i| start + step * i as f64).collect();
            points[count - 1] = end;
            points
        }
    }
}

/// `count` geometrically spaced points on `[start, end]`, both positive.
pub fn geomspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let ratio = (end / start).ln() / (count - 1) as f64;
            let mut points: Vec<f64> = (0..count)
                .map(|i| start * (ratio * i as f64).exp())
                .collect();
            points[0] = start;
            points[count - 1] = end;
            points
        }
    }
}

/// Builds the solver mesh for one coat boundary.
///
/// Three regions: the coat `[pole, alpha_end)` and the transition band
/// `[alpha_end, alpha_end + band)` with `density` linear points each, then
/// geometric spacing with `density / 10` points out to `alpha_max`.
pub fn build_mesh(ctx: &SolveContext, density: usize) -> Result<Vec<f64>> {
    let params = &ctx.params;
    let alpha_end = ctx.coat_area;
    let band_end = alpha_end + params.transition_band_width;
    if density < 2 {
        bail!("Mesh density must be at least 2 (got {}).", density);
    }
    if alpha_end <= params.pole_offset {
        bail!(
            "Coat boundary {} must lie beyond the pole offset {}.",
            alpha_end,
            params.pole_offset
        );
    }
    if band_end >= params.alpha_max {
        bail!(
            "Coat boundary {} plus transition band {} reaches past alpha_max {}.",
            alpha_end,
            params.transition_band_width,
            params.alpha_max
        );
    }

    let outer_count = (density / 10).max(2);
    let mut mesh = linspace_open(params.pole_offset, alpha_end, density);
    mesh.extend(linspace_open(alpha_end, band_end, density));
    mesh.extend(geomspace(band_end, params.alpha_max, outer_count));

    mesh.sort_by(|a, b| a.total_cmp(b));
    mesh.dedup_by(|a, b| (*a - *b).abs() <= f64::EPSILON * b.abs().max(1.0));
    Ok(mesh)
}

/// Seed state for a sweep without a prior solution: `x ≈ alpha` (offset from
/// zero), `lambda = lambda0_nd`, every other component zero.
pub fn initial_guess(ctx: &SolveContext, mesh: &[f64]) -> DMatrix<f64> {
    let mut guess = DMatrix::zeros(STATE_DIM, mesh.len());
    for (j, &alpha) in mesh.iter().enumerate() {
        guess[(X, j)] = alpha + ctx.params.pole_offset;
        guess[(LAMBDA, j)] = ctx.tension_nd;
    }
    guess
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::PhysicalParameters;

    fn context(coat: f64) -> SolveContext {
        SolveContext::new(&PhysicalParameters::default(), 0.02, coat).expect("context should build")
    }

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn spacing_helpers_hit_their_endpoints() {
        let open = linspace_open(0.0, 1.0, 4);
        assert_eq!(open, vec![0.0, 0.25, 0.5, 0.75]);
        let closed = linspace(1.0, 12.0, 100);
        assert_eq!(closed.len(), 100);
        assert_eq!(closed[0], 1.0);
        assert_eq!(closed[99], 12.0);
        let geo = geomspace(4.0, 100.0, 5);
        assert_eq!(geo[0], 4.0);
        assert_eq!(geo[4], 100.0);
        let ratios: Vec<f64> = geo.windows(2).map(|w| w[1] / w[0]).collect();
        for r in &ratios {
            assert!((r - ratios[0]).abs() < 1e-12);
        }
        assert_eq!(linspace(2.0, 3.0, 1), vec![2.0]);
        assert!(linspace(2.0, 3.0, 0).is_empty());
    }

    #[test]
    fn mesh_is_strictly_increasing_and_spans_domain() {
        for &coat in &[1.0, 3.7, 12.0] {
            let ctx = context(coat);
            let mesh = build_mesh(&ctx, 200).expect("mesh should build");
            assert!(mesh.windows(2).all(|w| w[0] < w[1]));
            assert_eq!(mesh[0], ctx.params.pole_offset);
            assert_eq!(*mesh.last().expect("mesh is non-empty"), ctx.params.alpha_max);
            assert!(mesh.contains(&coat));
            assert!(mesh.contains(&(coat + 3.0)));
            assert_eq!(mesh.len(), 200 + 200 + 20);
        }
    }

    #[test]
    fn mesh_is_denser_inside_than_towards_rim() {
        let mesh = build_mesh(&context(2.0), 100).expect("mesh should build");
        let inner = mesh[1] - mesh[0];
        let outer = mesh[mesh.len() - 1] - mesh[mesh.len() - 2];
        assert!(outer > 10.0 * inner);
    }

    #[test]
    fn mesh_rejects_degenerate_inputs() {
        assert_err_contains(build_mesh(&context(2.0), 1), "density");
        assert_err_contains(build_mesh(&context(97.5), 100), "alpha_max");
    }

    #[test]
    fn seed_guess_offsets_radius_and_sets_tension() {
        let ctx = context(2.0);
        let mesh = build_mesh(&ctx, 50).expect("mesh should build");
        let guess = initial_guess(&ctx, &mesh);
        assert_eq!(guess.nrows(), STATE_DIM);
        assert_eq!(guess.ncols(), mesh.len());
        for (j, &a) in mesh.iter().enumerate() {
            assert_eq!(guess[(X, j)], a + 1e-4);
            assert_eq!(guess[(LAMBDA, j)], ctx.tension_nd);
            for i in 1..LAMBDA {
                assert_eq!(guess[(i, j)], 0.0);
            }
        }
    }
}
