//! Command line entry point for Furrow simulations.
//!
//! The runner reads a YAML run file naming the weather records, the
//! agromanagement definition, the model configuration and the parameter
//! sets, mounts the reference crop and soil components, runs the engine
//! until it terminates (or, in hold mode, until the agromanagement end
//! date) and writes a JSON report to stdout.
//!
//! ```text
//! furrow-runner <run-file.yaml>
//! FURROW_RUN_FILE=run.yaml furrow-runner
//! ```
//!
//! Logs go to stderr; `RUST_LOG` selects the level (default `info`).

mod config;
mod report;

use std::path::PathBuf;

use anyhow::{Context, Result};
use furrow_agro::AgroManagementDef;
use furrow_core::{Engine, EngineMode, InMemoryWeather, ModelComponents};
use furrow_models::{BucketSoilFactory, ThermalTimeCropFactory};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::RunFile;
use crate::report::Report;

/// Environment variable consulted when no run file argument is given.
const RUN_FILE_ENV: &str = "FURROW_RUN_FILE";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("furrow-runner starting");

    let path = run_file_path()?;
    let run = RunFile::load(&path)?;
    info!(
        run_file = %path.display(),
        weather = %run.weather.display(),
        agromanagement = %run.agromanagement.display(),
        "run file loaded"
    );

    let weather = InMemoryWeather::from_file(&run.weather)
        .with_context(|| format!("loading weather from {}", run.weather.display()))?;
    if let Some((first, last)) = weather.date_range() {
        info!(%first, %last, days = weather.len(), "weather loaded");
    }

    let agromanagement = AgroManagementDef::from_file(&run.agromanagement).with_context(|| {
        format!(
            "loading agromanagement from {}",
            run.agromanagement.display()
        )
    })?;

    let params = run
        .parameter_provider()
        .context("building the parameter provider")?;

    let mut engine = Engine::new(
        params,
        Box::new(weather),
        agromanagement,
        run.config,
        ModelComponents {
            crop: Box::new(ThermalTimeCropFactory),
            soil: Box::new(BucketSoilFactory),
        },
    )
    .context("setting up the simulation")?;

    let simulated = match engine.config().engine_mode {
        EngineMode::Standard => engine.run_till_terminate(),
        // the clock never terminates a held run; stop at the campaign end
        EngineMode::Hold => {
            let end = engine.agromanager().end_date();
            engine.run_till(end)
        }
    };
    simulated.with_context(|| format!("simulation failed on {}", engine.day()))?;

    info!(
        last_day = %engine.day(),
        signals = engine.signal_log().len(),
        crop_cycles = engine.get_summary_output().len(),
        "simulation finished"
    );

    let json = serde_json::to_string_pretty(&Report::from_engine(&engine))
        .context("serializing the report")?;
    println!("{json}");
    Ok(())
}

/// Run file from the first argument, falling back to `FURROW_RUN_FILE`.
fn run_file_path() -> Result<PathBuf> {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os(RUN_FILE_ENV))
        .map(PathBuf::from)
        .with_context(|| format!("usage: furrow-runner <run-file.yaml> (or set {RUN_FILE_ENV})"))
}
