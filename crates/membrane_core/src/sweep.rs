//! Continuation over the coat area at fixed tension.
//!
//! Each step builds a fresh [`SolveContext`] and mesh for its coat area,
//! seeds the solver from the last converged solution (or the seed guess
//! before the first success), and records the mirrored physical shape on
//! success. A step that fails from its seed is retried by halving the
//! coat-area step toward it (`substep_depth` times at most); the
//! intermediate solutions only carry the seed forward. A step that still
//! fails is logged and skipped; it never aborts the sweep and never
//! replaces the continuation seed.

pub mod types;

pub use types::{
    AreaRange, ContinuationSeed, SweepFailure, SweepFrame, SweepProgress, SweepSettings,
    SweepTrajectory,
};

use crate::bvp::{BvpOutcome, BvpSolution, BvpSolver};
use crate::mesh::{build_mesh, initial_guess};
use crate::params::{PhysicalParameters, SolveContext};
use crate::problem::MembraneProblem;
use crate::shape::{X, Y};
use anyhow::{bail, Result};
use log::{debug, info, warn};

/// Runs one sweep step by step so callers can report progress between
/// batches.
pub struct SweepRunner<S: BvpSolver> {
    solver: S,
    params: PhysicalParameters,
    settings: SweepSettings,
    areas: Vec<f64>,
    next_step: usize,
    seed: ContinuationSeed,
    /// Coat area the seed was solved at.
    seed_area: f64,
    trajectory: SweepTrajectory,
}

impl<S: BvpSolver> SweepRunner<S> {
    /// Validates everything up front; no solver call happens for an invalid
    /// configuration.
    pub fn new(solver: S, params: &PhysicalParameters, settings: &SweepSettings) -> Result<Self> {
        params.validate()?;
        settings.validate(params)?;
        Ok(Self {
            solver,
            params: params.clone(),
            settings: *settings,
            areas: settings.areas.values(),
            next_step: 0,
            seed: ContinuationSeed::NoPriorSolution,
            seed_area: settings.areas.start,
            trajectory: SweepTrajectory::new(settings.tension),
        })
    }

    pub fn is_done(&self) -> bool {
        self.next_step >= self.areas.len()
    }

    pub fn progress(&self) -> SweepProgress {
        SweepProgress {
            done: self.is_done(),
            current_step: self.next_step,
            max_steps: self.areas.len(),
            frames: self.trajectory.frames.len(),
            failures: self.trajectory.failures.len(),
        }
    }

    pub fn seed(&self) -> &ContinuationSeed {
        &self.seed
    }

    pub fn trajectory(&self) -> &SweepTrajectory {
        &self.trajectory
    }

    /// Runs up to `batch_size` steps.
    pub fn run_steps(&mut self, batch_size: usize) -> Result<SweepProgress> {
        for _ in 0..batch_size {
            if self.is_done() {
                break;
            }
            self.step()?;
        }
        Ok(self.progress())
    }

    fn step(&mut self) -> Result<()> {
        let coat_area = self.areas[self.next_step];
        let mut steps = StepSolver {
            solver: &mut self.solver,
            params: &self.params,
            settings: &self.settings,
        };
        let outcome = match &self.seed {
            ContinuationSeed::NoPriorSolution => steps.solve_at(coat_area, None)?,
            ContinuationSeed::HasPriorSolution(previous) => {
                steps.continue_to(self.seed_area, previous, coat_area, self.settings.substep_depth)?
            }
        };
        match outcome {
            BvpOutcome::Converged(solution) => {
                debug!(
                    "alpha_end = {:.2}: converged on {} nodes after {} Newton iterations",
                    coat_area,
                    solution.node_count(),
                    solution.newton_iterations
                );
                let x: Vec<f64> = solution.states().row(X).iter().copied().collect();
                let y: Vec<f64> = solution.states().row(Y).iter().copied().collect();
                self.trajectory.frames.push(SweepFrame::mirrored(
                    coat_area,
                    &x,
                    &y,
                    self.params.reference_length,
                ));
                self.seed = ContinuationSeed::HasPriorSolution(solution);
                self.seed_area = coat_area;
            }
            BvpOutcome::Failed(reason) => {
                warn!("Solver failed for alpha_end = {:.2}: {}", coat_area, reason);
                self.trajectory.failures.push(SweepFailure { coat_area, reason });
            }
        }

        self.next_step += 1;
        self.trajectory.attempted += 1;
        if self.is_done() {
            info!(
                "lambda0 = {}: {} successful frames out of {}",
                self.settings.tension,
                self.trajectory.success_count(),
                self.trajectory.attempted
            );
        }
        Ok(())
    }

    pub fn into_trajectory(self) -> SweepTrajectory {
        self.trajectory
    }
}

/// Solves single coat areas for a runner.
struct StepSolver<'a, S: BvpSolver> {
    solver: &'a mut S,
    params: &'a PhysicalParameters,
    settings: &'a SweepSettings,
}

impl<S: BvpSolver> StepSolver<'_, S> {
    /// Solves at `coat_area`, seeded from `seed` resampled on the new mesh or
    /// from the seed guess.
    fn solve_at(&mut self, coat_area: f64, seed: Option<&BvpSolution>) -> Result<BvpOutcome> {
        let ctx = SolveContext::new(self.params, self.settings.tension, coat_area)?;
        let mesh = build_mesh(&ctx, self.settings.mesh_density)?;
        let guess = match seed {
            None => initial_guess(&ctx, &mesh),
            Some(previous) => previous.evaluate_on_mesh(&mesh),
        };
        let problem = MembraneProblem::new(&ctx);
        self.solver.solve(&problem, &mesh, &guess, &self.settings.solver)
    }

    /// Continues from `seed`, solved at `seed_area`, to `coat_area`. On
    /// failure both halves of the step are tried in turn, each with one less
    /// level of `depth`. If that also fails the direct attempt's failure is
    /// returned.
    fn continue_to(
        &mut self,
        seed_area: f64,
        seed: &BvpSolution,
        coat_area: f64,
        depth: usize,
    ) -> Result<BvpOutcome> {
        let direct = self.solve_at(coat_area, Some(seed))?;
        if direct.is_converged() || depth == 0 {
            return Ok(direct);
        }
        let midpoint = 0.5 * (seed_area + coat_area);
        debug!("alpha_end = {:.4}: retrying through {:.4}", coat_area, midpoint);
        let BvpOutcome::Converged(halfway) = self.continue_to(seed_area, seed, midpoint, depth - 1)? else {
            return Ok(direct);
        };
        match self.continue_to(midpoint, &halfway, coat_area, depth - 1)? {
            converged @ BvpOutcome::Converged(_) => Ok(converged),
            BvpOutcome::Failed(_) => Ok(direct),
        }
    }
}

/// Runs a whole sweep.
pub fn run_sweep<S: BvpSolver>(
    solver: S,
    params: &PhysicalParameters,
    settings: &SweepSettings,
) -> Result<SweepTrajectory> {
    let mut runner = SweepRunner::new(solver, params, settings)?;
    while !runner.is_done() {
        runner.run_steps(settings.areas.count)?;
    }
    Ok(runner.into_trajectory())
}

/// Runs one sweep per tension, in order. Every tension starts without a
/// prior solution. All tensions are validated before the first solve.
pub fn run_tension_series<S: BvpSolver>(
    solver: &mut S,
    params: &PhysicalParameters,
    settings: &SweepSettings,
    tensions: &[f64],
) -> Result<Vec<SweepTrajectory>> {
    if tensions.is_empty() {
        bail!("At least one tension value is required.");
    }
    let per_tension: Vec<SweepSettings> = tensions
        .iter()
        .map(|&tension| SweepSettings {
            tension,
            ..*settings
        })
        .collect();
    params.validate()?;
    for sweep in &per_tension {
        sweep.validate(params)?;
    }

    let mut trajectories = Vec::with_capacity(per_tension.len());
    for sweep in &per_tension {
        info!(
            "Sweeping lambda0 = {} over alpha_end {} to {} ({} steps)",
            sweep.tension, sweep.areas.start, sweep.areas.end, sweep.areas.count
        );
        trajectories.push(run_sweep(&mut *solver, params, sweep)?);
    }
    Ok(trajectories)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bvp::{BoundaryValueProblem, BvpSolution, SolveFailure, SolverSettings};
    use crate::shape::LAMBDA;
    use nalgebra::DMatrix;

    /// Returns scripted outcomes and records every guess it is handed.
    /// A converged solution has `x = alpha` and the axial row set to
    /// `-coat_area`, so frames only depend on the step itself.
    struct ScriptedSolver {
        script: Vec<bool>,
        areas: Vec<f64>,
        guesses: Vec<DMatrix<f64>>,
    }

    impl ScriptedSolver {
        fn new(script: Vec<bool>, areas: Vec<f64>) -> Self {
            Self {
                script,
                areas,
                guesses: Vec::new(),
            }
        }
    }

    impl BvpSolver for ScriptedSolver {
        fn solve<P: BoundaryValueProblem>(
            &mut self,
            _problem: &P,
            mesh: &[f64],
            guess: &DMatrix<f64>,
            _settings: &SolverSettings,
        ) -> Result<BvpOutcome> {
            let call = self.guesses.len();
            self.guesses.push(guess.clone());
            let step = call % self.script.len();
            if !self.script[step] {
                return Ok(BvpOutcome::Failed(SolveFailure::NewtonNotConverged { iterations: 3 }));
            }
            let mut states = guess.clone();
            for (j, &alpha) in mesh.iter().enumerate() {
                states[(X, j)] = alpha;
                states[(Y, j)] = -self.areas[step];
            }
            let derivatives = DMatrix::zeros(guess.nrows(), mesh.len());
            Ok(BvpOutcome::Converged(BvpSolution::new(mesh.to_vec(), states, derivatives)?))
        }
    }

    fn settings(count: usize) -> SweepSettings {
        SweepSettings {
            areas: AreaRange {
                start: 1.0,
                end: 1.0 + (count - 1) as f64,
                count,
            },
            mesh_density: 20,
            substep_depth: 0,
            ..SweepSettings::default()
        }
    }

    /// Converges only when the seed's coat area is within `max_jump` of the
    /// target. The target is read off the mesh, where the coat boundary sits
    /// at index `density`; the seed's area is the axial marker of the guess.
    struct ReachLimitedSolver {
        density: usize,
        max_jump: f64,
        targets: Vec<f64>,
    }

    impl BvpSolver for ReachLimitedSolver {
        fn solve<P: BoundaryValueProblem>(
            &mut self,
            _problem: &P,
            mesh: &[f64],
            guess: &DMatrix<f64>,
            _settings: &SolverSettings,
        ) -> Result<BvpOutcome> {
            let target = mesh[self.density];
            self.targets.push(target);
            let seed_area = -guess[(Y, 0)];
            if seed_area != 0.0 && (target - seed_area).abs() > self.max_jump {
                return Ok(BvpOutcome::Failed(SolveFailure::SingularJacobian));
            }
            let mut states = guess.clone();
            for (j, &alpha) in mesh.iter().enumerate() {
                states[(X, j)] = alpha;
                states[(Y, j)] = -target;
            }
            let derivatives = DMatrix::zeros(guess.nrows(), mesh.len());
            Ok(BvpOutcome::Converged(BvpSolution::new(mesh.to_vec(), states, derivatives)?))
        }
    }

    #[test]
    fn failed_step_is_reached_through_substeps() {
        let params = PhysicalParameters::default();
        let settings = SweepSettings {
            substep_depth: 2,
            ..settings(3)
        };
        let mut solver = ReachLimitedSolver {
            density: settings.mesh_density,
            max_jump: 0.3,
            targets: Vec::new(),
        };
        let trajectory = run_sweep(&mut solver, &params, &settings).expect("sweep should run");

        assert_eq!(trajectory.attempted, 3);
        assert!(trajectory.failures.is_empty());
        let frame_areas: Vec<f64> = trajectory.frames.iter().map(|f| f.coat_area).collect();
        assert_eq!(frame_areas, vec![1.0, 2.0, 3.0]);
        // The frame at 2.0 comes from the solve at 2.0, not from a midpoint.
        assert!(trajectory.frames[1].axial.iter().all(|v| *v == -2.0 * params.reference_length));
        assert_eq!(
            solver.targets[..8],
            [1.0, 2.0, 1.5, 1.25, 1.5, 2.0, 1.75, 2.0]
        );
    }

    #[test]
    fn substeps_stop_at_their_depth() {
        let params = PhysicalParameters::default();
        let settings = SweepSettings {
            substep_depth: 1,
            ..settings(3)
        };
        let mut solver = ReachLimitedSolver {
            density: settings.mesh_density,
            max_jump: 0.3,
            targets: Vec::new(),
        };
        let trajectory = run_sweep(&mut solver, &params, &settings).expect("sweep should run");

        assert_eq!(trajectory.frames.len(), 1);
        let failed: Vec<f64> = trajectory.failures.iter().map(|f| f.coat_area).collect();
        assert_eq!(failed, vec![2.0, 3.0]);
        assert_eq!(trajectory.failures[0].reason, SolveFailure::SingularJacobian);
        // Each failed step tries the target, then its midpoint from the seed at 1.0.
        assert_eq!(solver.targets, vec![1.0, 2.0, 1.5, 3.0, 2.0]);
    }

    #[test]
    fn failed_step_is_skipped_and_keeps_seed() {
        let params = PhysicalParameters::default();
        let settings = settings(5);
        let areas = settings.areas.values();
        let mut solver = ScriptedSolver::new(vec![true, true, false, true, true], areas.clone());
        let trajectory = run_sweep(&mut solver, &params, &settings).expect("sweep should run");

        assert_eq!(trajectory.attempted, 5);
        let frame_areas: Vec<f64> = trajectory.frames.iter().map(|f| f.coat_area).collect();
        assert_eq!(frame_areas, vec![areas[0], areas[1], areas[3], areas[4]]);
        assert_eq!(trajectory.failures.len(), 1);
        assert_eq!(trajectory.failures[0].coat_area, areas[2]);

        // First guess is the seed guess; later guesses carry the axial marker
        // of the last success, which the failure at step 2 does not change.
        assert!(solver.guesses[0].row(Y).iter().all(|v| *v == 0.0));
        let marker = |step: usize| solver.guesses[step][(Y, 0)];
        assert!((marker(1) + areas[0]).abs() < 1e-12);
        assert!((marker(2) + areas[1]).abs() < 1e-12);
        assert!((marker(3) + areas[1]).abs() < 1e-12);
        assert!((marker(4) + areas[3]).abs() < 1e-12);
    }

    #[test]
    fn injected_failure_leaves_other_frames_unchanged() {
        let params = PhysicalParameters::default();
        let settings = settings(5);
        let areas = settings.areas.values();
        let clean = run_sweep(
            ScriptedSolver::new(vec![true; 5], areas.clone()),
            &params,
            &settings,
        )
        .expect("sweep should run");
        let faulty = run_sweep(
            ScriptedSolver::new(vec![true, true, false, true, true], areas),
            &params,
            &settings,
        )
        .expect("sweep should run");

        assert_eq!(clean.frames.len(), 5);
        assert_eq!(faulty.frames.len(), 4);
        for frame in &faulty.frames {
            let twin = clean
                .frames
                .iter()
                .find(|f| f.coat_area == frame.coat_area)
                .expect("clean run has every frame");
            assert_eq!(frame.axial, twin.axial);
            assert_eq!(frame.radial, twin.radial);
        }
    }

    #[test]
    fn frames_are_mirrored_physical_coordinates() {
        let params = PhysicalParameters::default();
        let settings = settings(1);
        let trajectory = run_sweep(
            ScriptedSolver::new(vec![true], settings.areas.values()),
            &params,
            &settings,
        )
        .expect("sweep should run");
        let frame = &trajectory.frames[0];
        let n = frame.radial.len();
        assert_eq!(n % 2, 0);
        for i in 0..n / 2 {
            assert_eq!(frame.radial[i], -frame.radial[n - 1 - i]);
            assert_eq!(frame.axial[i], frame.axial[n - 1 - i]);
        }
        assert!(frame.radial.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(frame.axial[0], -20.0);
    }

    #[test]
    fn runner_reports_progress_in_batches() {
        let params = PhysicalParameters::default();
        let settings = settings(5);
        let solver = ScriptedSolver::new(vec![true, false, true, true, true], settings.areas.values());
        let mut runner = SweepRunner::new(solver, &params, &settings).expect("runner should build");
        assert!(!runner.seed().has_prior_solution());

        let progress = runner.run_steps(2).expect("steps should run");
        assert_eq!(progress.current_step, 2);
        assert_eq!(progress.frames, 1);
        assert_eq!(progress.failures, 1);
        assert!(!progress.done);
        assert!(runner.seed().has_prior_solution());

        let progress = runner.run_steps(10).expect("steps should run");
        assert!(progress.done);
        assert_eq!(progress.current_step, 5);
        assert!(runner.is_done());
        assert_eq!(runner.into_trajectory().frames.len(), 4);
    }

    #[test]
    fn invalid_range_fails_before_any_solve() {
        let params = PhysicalParameters::default();
        let mut settings = settings(5);
        settings.areas.start = 12.0;
        settings.areas.end = 1.0;
        let mut solver = ScriptedSolver::new(vec![true], vec![1.0]);
        assert!(run_sweep(&mut solver, &params, &settings).is_err());
        assert!(run_tension_series(&mut solver, &params, &settings, &[0.02]).is_err());
        assert!(solver.guesses.is_empty());
    }

    #[test]
    fn each_tension_restarts_from_the_seed_guess() {
        let params = PhysicalParameters::default();
        let settings = settings(3);
        let mut solver = ScriptedSolver::new(vec![true; 3], settings.areas.values());
        let tensions = [0.02, 0.002];
        let trajectories = run_tension_series(&mut solver, &params, &settings, &tensions)
            .expect("series should run");

        assert_eq!(trajectories.len(), 2);
        assert_eq!(trajectories[0].tension, 0.02);
        assert_eq!(trajectories[1].tension, 0.002);
        assert_eq!(solver.guesses.len(), 6);
        for (first_call, &tension) in [0, 3].iter().zip(&tensions) {
            let guess = &solver.guesses[*first_call];
            assert!(guess.row(Y).iter().all(|v| *v == 0.0));
            assert!((guess[(LAMBDA, 0)] - params.tension_nd(tension)).abs() < 1e-15);
        }
        assert!(run_tension_series(&mut solver, &params, &settings, &[]).is_err());
    }

    #[test]
    fn solver_errors_propagate() {
        struct Broken;
        impl BvpSolver for Broken {
            fn solve<P: BoundaryValueProblem>(
                &mut self,
                _problem: &P,
                _mesh: &[f64],
                _guess: &DMatrix<f64>,
                _settings: &SolverSettings,
            ) -> Result<BvpOutcome> {
                bail!("malformed input")
            }
        }
        let params = PhysicalParameters::default();
        assert!(run_sweep(Broken, &params, &settings(2)).is_err());
    }

    #[test]
    fn frames_use_the_converged_mesh() {
        let params = PhysicalParameters::default();
        let settings = settings(1);
        let ctx = SolveContext::new(&params, settings.tension, 1.0).expect("context should build");
        let mesh = build_mesh(&ctx, settings.mesh_density).expect("mesh should build");
        let trajectory = run_sweep(
            ScriptedSolver::new(vec![true], settings.areas.values()),
            &params,
            &settings,
        )
        .expect("sweep should run");
        let frame = &trajectory.frames[0];
        let n = mesh.len();
        assert_eq!(frame.radial.len(), 2 * n);
        for (j, &alpha) in mesh.iter().enumerate() {
            assert_eq!(frame.radial[n + j], alpha * params.reference_length);
            assert_eq!(frame.radial[n - 1 - j], -alpha * params.reference_length);
        }
    }
}
