// Command-line entry point for coat-area sweeps.
//
// For every tension value, sweeps the coat area with continuation and writes
// the converged, classified frames to `<out>/membrane_lambda<value>.json`.
// See `config.rs` for the flags and `export.rs` for the document layout.
//
// Logging goes through `env_logger` (default level `info`, override with
// `RUST_LOG`).

mod config;
mod export;

use anyhow::Result;
use membrane_core::{run_tension_series, CollocationSolver};

use config::{load_parameters, parse_args, print_usage, Command};
use export::export_trajectory;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match parse_args(&args)? {
        Command::Help => {
            print_usage();
            return Ok(());
        }
        Command::Run(config) => config,
    };

    let params = load_parameters(config.params_path.as_deref());
    let settings = config.sweep_settings();
    let mut solver = CollocationSolver::new();
    let trajectories = run_tension_series(&mut solver, &params, &settings, &config.lambdas)?;

    for trajectory in &trajectories {
        export_trajectory(trajectory, &params, &config.out_dir)?;
    }
    Ok(())
}
