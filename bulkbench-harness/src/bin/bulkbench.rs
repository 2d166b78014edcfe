//! Command-line runner that prints the strategy report.
//!
//! Usage:
//!   bulkbench                                  # all scenarios, env config
//!   bulkbench --backend sqlite --scenario update
//!   bulkbench --config bench.toml              # TOML, then BULKBENCH_* overrides

use bulkbench_core::{BackendKind, BenchConfig, BenchResult};
use bulkbench_harness::{init_tracing, run_configured, ScenarioKind};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "bulkbench", version, about = "Time bulk iterate, filter and update strategies")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "BULKBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Storage engine: memory or sqlite.
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Scenario to run: select, update, stale or all.
    #[arg(long, default_value_t = ScenarioKind::All)]
    scenario: ScenarioKind,
}

fn load_config(cli: &Cli) -> BenchResult<BenchConfig> {
    let mut config = match &cli.config {
        Some(path) => BenchConfig::from_path(path)?.with_env_overrides(),
        None => BenchConfig::from_env(),
    };
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("bulkbench: {}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = init_tracing(config.log_format) {
        eprintln!("bulkbench: could not install tracing subscriber: {}", e);
    }

    let format = config.report_format;
    let report = match run_configured(config, cli.scenario) {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "scenario failed");
            eprintln!("bulkbench: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match report.render(format) {
        Ok(rendered) => {
            println!("{}", rendered);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("bulkbench: could not render report: {}", e);
            ExitCode::FAILURE
        }
    }
}
