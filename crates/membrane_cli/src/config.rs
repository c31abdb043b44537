//! Command-line options and the parameter file.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use membrane_core::{AreaRange, PhysicalParameters, SolverSettings, SweepSettings};

#[derive(Debug, Clone, PartialEq)]
pub struct CliConfig {
    pub lambdas: Vec<f64>,
    pub alpha_start: f64,
    pub alpha_end: f64,
    pub n_alpha: usize,
    pub mesh_size: usize,
    pub tol: f64,
    pub params_path: Option<PathBuf>,
    pub out_dir: PathBuf,
}

impl Default for CliConfig {
    fn default() -> Self {
        let areas = AreaRange::default();
        let sweep = SweepSettings::default();
        Self {
            lambdas: vec![sweep.tension],
            alpha_start: areas.start,
            alpha_end: areas.end,
            n_alpha: areas.count,
            mesh_size: sweep.mesh_density,
            tol: sweep.solver.tolerance,
            params_path: None,
            out_dir: PathBuf::from("animations"),
        }
    }
}

impl CliConfig {
    /// Sweep settings shared by every tension; the tension itself is filled
    /// in per sweep.
    pub fn sweep_settings(&self) -> SweepSettings {
        SweepSettings {
            tension: self.lambdas.first().copied().unwrap_or_default(),
            areas: AreaRange {
                start: self.alpha_start,
                end: self.alpha_end,
                count: self.n_alpha,
            },
            mesh_density: self.mesh_size,
            solver: SolverSettings {
                tolerance: self.tol,
                boundary_tolerance: self.tol,
                ..SolverSettings::default()
            },
            ..SweepSettings::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run(CliConfig),
    Help,
}

/// Parses arguments (without the program name). Uses plain matching on
/// the flags; any malformed value is an error.
pub fn parse_args(args: &[String]) -> Result<Command> {
    let mut config = CliConfig::default();
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--lambdas" => {
                let mut values = Vec::new();
                while i + 1 < args.len() && !args[i + 1].starts_with("--") {
                    i += 1;
                    values.push(parse_value::<f64>("--lambdas", &args[i])?);
                }
                if values.is_empty() {
                    bail!("--lambdas requires at least one value");
                }
                config.lambdas = values;
            }
            "--alpha_start" => {
                i += 1;
                config.alpha_start = parse_value("--alpha_start", next(args, i, "--alpha_start")?)?;
            }
            "--alpha_end" => {
                i += 1;
                config.alpha_end = parse_value("--alpha_end", next(args, i, "--alpha_end")?)?;
            }
            "--n_alpha" => {
                i += 1;
                config.n_alpha = parse_value("--n_alpha", next(args, i, "--n_alpha")?)?;
            }
            "--mesh-size" => {
                i += 1;
                config.mesh_size = parse_value("--mesh-size", next(args, i, "--mesh-size")?)?;
            }
            "--tol" => {
                i += 1;
                config.tol = parse_value("--tol", next(args, i, "--tol")?)?;
            }
            "--params" => {
                i += 1;
                config.params_path = Some(PathBuf::from(next(args, i, "--params")?));
            }
            "--out" => {
                i += 1;
                config.out_dir = PathBuf::from(next(args, i, "--out")?);
            }
            "--help" | "-h" => return Ok(Command::Help),
            other => bail!("Unknown argument: {other}"),
        }
        i += 1;
    }

    if config.lambdas.iter().any(|v| !v.is_finite()) {
        bail!("--lambdas values must be finite");
    }
    if !(config.tol > 0.0) {
        bail!("--tol must be positive (got {})", config.tol);
    }
    Ok(Command::Run(config))
}

fn next<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{flag} requires a value"))
}

fn parse_value<T: std::str::FromStr>(flag: &str, raw: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .with_context(|| format!("{flag}: invalid value '{raw}'"))
}

pub fn print_usage() {
    println!("Usage: membrane-sweep [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --lambdas <V>...     Tension values in pN/nm (default: 0.02)");
    println!("  --alpha_start <A>    First coat area (default: 1.0)");
    println!("  --alpha_end <A>      Last coat area (default: 12.0)");
    println!("  --n_alpha <N>        Number of coat areas (default: 100)");
    println!("  --mesh-size <N>      Mesh points per dense region (default: 10000)");
    println!("  --tol <T>            Solver tolerance (default: 1e-3)");
    println!("  --params <FILE>      Physical parameters as JSON (default: built-in)");
    println!("  --out <DIR>          Output directory (default: animations)");
    println!("  --help, -h           Show this help");
}

/// Physical parameters from a JSON file, or the defaults when no file is
/// given or it cannot be read.
pub fn load_parameters(path: Option<&Path>) -> PhysicalParameters {
    let Some(path) = path else {
        return PhysicalParameters::default();
    };
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(params) => {
                log::info!("Loaded physical parameters from {}", path.display());
                params
            }
            Err(e) => {
                log::warn!("Failed to parse physical parameters: {}, using defaults", e);
                PhysicalParameters::default()
            }
        },
        Err(e) => {
            log::warn!(
                "Could not read parameters file {}: {}, using defaults",
                path.display(),
                e
            );
            PhysicalParameters::default()
        }
    }
}
