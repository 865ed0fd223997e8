//! `drape` binary: opens a window with a hanging cloth.
//!
//! `DRAPE_STRATEGY` (`pbd` or `massSpring`) and `DRAPE_GRID` (particles per
//! side) override the defaults. `RUST_LOG` controls logging.

use std::process::ExitCode;

use drape::{Simulation, StrategyKind};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut sim = Simulation::new();

    if let Ok(value) = std::env::var("DRAPE_STRATEGY") {
        match value.parse::<StrategyKind>() {
            Ok(kind) => sim = sim.with_strategy(kind),
            Err(err) => log::warn!("ignoring DRAPE_STRATEGY: {}", err),
        }
    }
    if let Ok(value) = std::env::var("DRAPE_GRID") {
        match value.parse::<u32>() {
            Ok(n) => sim = sim.with_grid_size(n),
            Err(err) => log::warn!("ignoring DRAPE_GRID={:?}: {}", value, err),
        }
    }

    match sim.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            eprintln!("drape: {}", err);
            ExitCode::FAILURE
        }
    }
}
