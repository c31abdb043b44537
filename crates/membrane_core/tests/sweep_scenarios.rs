//! End-to-end coat-area sweeps with the collocation backend.
//!
//! The full-scale sweeps take minutes; run them with
//! `cargo test --release -- --ignored`.

use membrane_core::boundary::MembraneBoundary;
use membrane_core::bvp::{BvpOutcome, BvpSolver};
use membrane_core::mesh::{build_mesh, initial_guess};
use membrane_core::problem::MembraneProblem;
use membrane_core::sweep::ContinuationSeed;
use membrane_core::{
    run_sweep, run_tension_series, AreaRange, CollocationSolver, PhysicalParameters, SolveContext,
    SweepRunner, SweepSettings, SweepTrajectory,
};

fn reference_sweep(tension: f64) -> SweepSettings {
    SweepSettings {
        tension,
        ..SweepSettings::default()
    }
}

fn first_failure_area(trajectory: &SweepTrajectory) -> f64 {
    trajectory
        .failures
        .first()
        .map_or(f64::INFINITY, |failure| failure.coat_area)
}

#[test]
fn reversed_range_is_rejected_before_solving() {
    let params = PhysicalParameters::default();
    let settings = SweepSettings {
        areas: AreaRange {
            start: 12.0,
            end: 1.0,
            count: 100,
        },
        ..SweepSettings::default()
    };
    let err = run_sweep(CollocationSolver::new(), &params, &settings)
        .expect_err("reversed range must be rejected");
    assert!(format!("{err}").contains("alpha_start"));

    let mut solver = CollocationSolver::new();
    assert!(run_tension_series(&mut solver, &params, &settings, &[0.02, 0.002]).is_err());
}

#[test]
fn empty_range_is_rejected_before_solving() {
    let settings = SweepSettings {
        areas: AreaRange {
            count: 0,
            ..AreaRange::default()
        },
        ..SweepSettings::default()
    };
    assert!(SweepRunner::new(CollocationSolver::new(), &PhysicalParameters::default(), &settings).is_err());
}

/// A few reference-sized coat-area steps on a coarse mesh.
fn reduced_sweep() -> SweepSettings {
    SweepSettings {
        areas: AreaRange {
            start: 1.0,
            end: 1.0 + 3.0 * 11.0 / 99.0,
            count: 4,
        },
        mesh_density: 400,
        ..SweepSettings::default()
    }
}

#[test]
fn reduced_continuation_converges_and_resolves_to_itself() {
    let params = PhysicalParameters::default();
    let settings = reduced_sweep();
    let ctx = SolveContext::new(&params, settings.tension, settings.areas.start)
        .expect("context should build");
    let boundary = MembraneBoundary::new(&ctx);
    let mut runner =
        SweepRunner::new(CollocationSolver::new(), &params, &settings).expect("runner should build");

    while !runner.is_done() {
        runner.run_steps(1).expect("step should run");
        assert!(
            runner.trajectory().failures.is_empty(),
            "failed at {:?}",
            runner.trajectory().failures.first()
        );
        let ContinuationSeed::HasPriorSolution(solution) = runner.seed() else {
            panic!("a converged step must leave a seed");
        };
        let violation = boundary.max_violation(&solution.start(), &solution.end());
        assert!(violation <= settings.solver.boundary_tolerance, "violation {violation:.3e}");
    }
    let ContinuationSeed::HasPriorSolution(last) = runner.seed().clone() else {
        panic!("sweep left no seed");
    };
    assert_eq!(runner.trajectory().frames.len(), 4);

    let end_ctx = SolveContext::new(&params, settings.tension, settings.areas.end)
        .expect("context should build");
    let problem = MembraneProblem::new(&end_ctx);
    let again = match CollocationSolver::new()
        .solve(&problem, last.mesh(), last.states(), &settings.solver)
        .expect("inputs are valid")
    {
        BvpOutcome::Converged(solution) => solution,
        BvpOutcome::Failed(failure) => panic!("re-solve failed: {failure}"),
    };
    assert_eq!(again.node_count(), last.node_count());
    for (a, b) in last.states().iter().zip(again.states().iter()) {
        assert!((a - b).abs() <= 1e-3 * (1.0 + a.abs()), "{a} vs {b}");
    }
}

#[test]
#[ignore]
fn reference_tension_sweep_converges_across_the_range() {
    let params = PhysicalParameters::default();
    let settings = reference_sweep(0.02);
    let mut runner =
        SweepRunner::new(CollocationSolver::new(), &params, &settings).expect("runner should build");
    // Boundary conditions depend on the tension only, not on the coat area.
    let ctx = SolveContext::new(&params, settings.tension, settings.areas.start)
        .expect("context should build");
    let boundary = MembraneBoundary::new(&ctx);

    while !runner.is_done() {
        let before = runner.trajectory().frames.len();
        runner.run_steps(1).expect("step should run");
        if runner.trajectory().frames.len() > before {
            if let ContinuationSeed::HasPriorSolution(solution) = runner.seed() {
                let violation = boundary.max_violation(&solution.start(), &solution.end());
                assert!(violation <= settings.solver.boundary_tolerance);
            }
        }
    }

    let trajectory = runner.into_trajectory();
    assert_eq!(trajectory.attempted, 100);
    assert!(trajectory.success_count() >= 90, "{} frames", trajectory.success_count());
    let coated: Vec<f64> = trajectory
        .frames
        .iter()
        .map(|f| params.coated_area(f.coat_area))
        .collect();
    assert!(coated.windows(2).all(|w| w[0] < w[1]));
}

#[test]
#[ignore]
fn lower_tension_fails_no_earlier() {
    let params = PhysicalParameters::default();
    let settings = reference_sweep(0.02);
    let mut solver = CollocationSolver::new();
    let trajectories = run_tension_series(&mut solver, &params, &settings, &[0.02, 0.002])
        .expect("series should run");
    assert_eq!(trajectories.len(), 2);
    assert!(first_failure_area(&trajectories[1]) >= first_failure_area(&trajectories[0]));
    assert!(trajectories[1].success_count() > 0);
}

#[test]
#[ignore]
fn resolving_with_converged_seed_reproduces_shape() {
    let params = PhysicalParameters::default();
    let settings = SweepSettings::default();
    let ctx = SolveContext::new(&params, settings.tension, 1.0).expect("context should build");
    let mesh = build_mesh(&ctx, settings.mesh_density).expect("mesh should build");
    let problem = MembraneProblem::new(&ctx);
    let mut solver = CollocationSolver::new();

    let first = match solver
        .solve(&problem, &mesh, &initial_guess(&ctx, &mesh), &settings.solver)
        .expect("inputs are valid")
    {
        BvpOutcome::Converged(solution) => solution,
        BvpOutcome::Failed(failure) => panic!("first solve failed: {failure}"),
    };
    let second = match solver
        .solve(&problem, first.mesh(), first.states(), &settings.solver)
        .expect("inputs are valid")
    {
        BvpOutcome::Converged(solution) => solution,
        BvpOutcome::Failed(failure) => panic!("re-solve failed: {failure}"),
    };
    for (a, b) in first.states().iter().zip(second.states().iter()) {
        assert!((a - b).abs() <= 1e-3 * (1.0 + a.abs()));
    }
}
