//! Equilibrium shapes of an axisymmetric membrane carrying a growing
//! curvature-inducing coat.
//!
//! Key components:
//! - **Model**: `params` (reference constants, per-step `SolveContext`),
//!   `profile` (logistic coat profiles), `shape` (six shape equations),
//!   `boundary` (pole and rim conditions), `problem` (both as a BVP).
//! - **Numerics**: `bvp` (solver contract plus a collocation backend),
//!   `autodiff` (dual numbers for exact Jacobians), `mesh`.
//! - **Sweeps**: `sweep` (continuation over the coat area, tension series)
//!   and `classify` (bare/coated sub-arcs of each frame).

pub mod autodiff;
pub mod boundary;
pub mod bvp;
pub mod classify;
pub mod mesh;
pub mod params;
pub mod problem;
pub mod profile;
pub mod shape;
pub mod sweep;
pub mod traits;

pub use bvp::{BvpOutcome, BvpSolution, BvpSolver, CollocationSolver, SolveFailure, SolverSettings};
pub use classify::{classify_frame, ClassifiedFrame, ShapeArc};
pub use params::{PhysicalParameters, SolveContext};
pub use sweep::{
    run_sweep, run_tension_series, AreaRange, SweepFrame, SweepRunner, SweepSettings,
    SweepTrajectory,
};
