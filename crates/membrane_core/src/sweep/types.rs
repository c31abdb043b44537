//! Core types for coat-area sweeps.
//!
//! Settings, the per-step continuation seed, and the trajectory a sweep
//! builds up.

use crate::bvp::{BvpSolution, SolveFailure, SolverSettings};
use crate::mesh::linspace;
use crate::params::PhysicalParameters;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Coat-area values swept in increasing order (`count` points on
/// `[start, end]`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AreaRange {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

impl Default for AreaRange {
    fn default() -> Self {
        Self {
            start: 1.0,
            end: 12.0,
            count: 100,
        }
    }
}

impl AreaRange {
    pub fn validate(&self, params: &PhysicalParameters) -> Result<()> {
        if self.count == 0 {
            bail!("Coat-area sweep is empty (count = 0).");
        }
        if !self.start.is_finite() || !self.end.is_finite() {
            bail!(
                "Coat-area sweep bounds must be finite (got {} to {}).",
                self.start,
                self.end
            );
        }
        if self.start > self.end {
            bail!(
                "alpha_start ({}) must not exceed alpha_end ({}).",
                self.start,
                self.end
            );
        }
        if self.start <= params.pole_offset {
            bail!(
                "alpha_start ({}) must exceed the pole offset ({}).",
                self.start,
                params.pole_offset
            );
        }
        if self.end + params.transition_band_width >= params.alpha_max {
            bail!(
                "alpha_end ({}) plus the transition band ({}) must stay below alpha_max ({}).",
                self.end,
                params.transition_band_width,
                params.alpha_max
            );
        }
        Ok(())
    }

    pub fn values(&self) -> Vec<f64> {
        linspace(self.start, self.end, self.count)
    }
}

/// Settings for one coat-area sweep at fixed tension.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SweepSettings {
    /// Prescribed tension lambda0 (pN/nm).
    pub tension: f64,
    pub areas: AreaRange,
    /// Linear points per mesh region (coat and transition band).
    pub mesh_density: usize,
    /// Halvings of the coat-area step tried when a step fails from its
    /// seed. Intermediate coat areas only carry the seed forward and are
    /// never recorded as frames. Zero disables substeps.
    pub substep_depth: usize,
    pub solver: SolverSettings,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            tension: 0.02,
            areas: AreaRange::default(),
            mesh_density: 10_000,
            substep_depth: 3,
            solver: SolverSettings::default(),
        }
    }
}

impl SweepSettings {
    pub fn validate(&self, params: &PhysicalParameters) -> Result<()> {
        if !self.tension.is_finite() {
            bail!("Tension must be finite (got {}).", self.tension);
        }
        if self.mesh_density < 2 {
            bail!("Mesh density must be at least 2 (got {}).", self.mesh_density);
        }
        self.areas.validate(params)?;
        self.solver.validate()
    }
}

/// What the next step starts from.
#[derive(Debug, Clone)]
pub enum ContinuationSeed {
    /// No step has converged yet; use the seed guess.
    NoPriorSolution,
    /// The last converged solution, resampled on the next mesh.
    HasPriorSolution(BvpSolution),
}

impl ContinuationSeed {
    pub fn has_prior_solution(&self) -> bool {
        matches!(self, ContinuationSeed::HasPriorSolution(_))
    }
}

/// One converged sweep step: physical coordinates (nm), mirrored about the
/// axis so that `radial` runs from the left rim through the pole to the
/// right rim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepFrame {
    pub coat_area: f64,
    pub radial: Vec<f64>,
    pub axial: Vec<f64>,
}

impl SweepFrame {
    /// Scales the half-profile `(x, y)` by `reference_length` and reflects
    /// it: `[-x reversed, x]`, `[y reversed, y]`.
    pub fn mirrored(coat_area: f64, x: &[f64], y: &[f64], reference_length: f64) -> Self {
        let radial = x
            .iter()
            .rev()
            .map(|v| -v * reference_length)
            .chain(x.iter().map(|v| v * reference_length))
            .collect();
        let axial = y
            .iter()
            .rev()
            .chain(y.iter())
            .map(|v| v * reference_length)
            .collect();
        Self {
            coat_area,
            radial,
            axial,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepFailure {
    pub coat_area: f64,
    pub reason: SolveFailure,
}

/// Everything one sweep produced, frames in increasing coat-area order.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepTrajectory {
    pub tension: f64,
    pub attempted: usize,
    pub frames: Vec<SweepFrame>,
    pub failures: Vec<SweepFailure>,
}

impl SweepTrajectory {
    pub fn new(tension: f64) -> Self {
        Self {
            tension,
            attempted: 0,
            frames: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn success_count(&self) -> usize {
        self.frames.len()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SweepProgress {
    pub done: bool,
    pub current_step: usize,
    pub max_steps: usize,
    pub frames: usize,
    pub failures: usize,
}
