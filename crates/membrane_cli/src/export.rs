//! JSON export of one sweep per tension value.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use membrane_core::{classify_frame, ClassifiedFrame, PhysicalParameters, SweepTrajectory};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TrajectoryExport {
    pub version: &'static str,
    /// lambda0 (pN/nm).
    pub tension: f64,
    pub attempted: usize,
    pub successful: usize,
    pub failed_coat_areas: Vec<f64>,
    pub frames: Vec<ClassifiedFrame>,
}

impl TrajectoryExport {
    pub fn new(trajectory: &SweepTrajectory, params: &PhysicalParameters) -> Self {
        Self {
            version: "1.0.0",
            tension: trajectory.tension,
            attempted: trajectory.attempted,
            successful: trajectory.success_count(),
            failed_coat_areas: trajectory.failures.iter().map(|f| f.coat_area).collect(),
            frames: trajectory
                .frames
                .iter()
                .map(|frame| classify_frame(frame, params))
                .collect(),
        }
    }
}

/// `membrane_lambda<value>.json` for one tension value.
pub fn export_file_name(tension: f64) -> String {
    format!("membrane_lambda{}.json", tension)
}

/// Writes one JSON document for `trajectory` into `dir` (created if needed)
/// and returns its path.
pub fn export_trajectory(
    trajectory: &SweepTrajectory,
    params: &PhysicalParameters,
    dir: &Path,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    let path = dir.join(export_file_name(trajectory.tension));

    let export = TrajectoryExport::new(trajectory, params);
    let file = std::fs::File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, &export)?;

    log::info!("Frames exported: {}", path.display());
    Ok(path)
}
