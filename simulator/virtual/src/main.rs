//! Weight Sync Scenario Runner
//!
//! Fast, deterministic phone/watch sync simulation over mock platforms.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use weightsync_core::SyncConfig;

mod scenario_config;
mod scenario_runner;

use scenario_config::{ScenarioConfig, TestAction};
use scenario_runner::{ScenarioReport, ScenarioRunner};

/// Weight Sync Scenario Runner
#[derive(Parser)]
#[command(name = "weightsync-sim")]
#[command(about = "Deterministic phone/watch weight sync simulation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Sync configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Persist the phone store under this directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a TOML scenario file
    Run {
        scenario_file: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Parse and check a scenario without running it
    Validate { scenario_file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match &cli.command {
        Commands::Run {
            scenario_file,
            json,
        } => {
            let config = load_configuration(&cli)?;
            let scenario = ScenarioConfig::from_toml_file(scenario_file)?;

            let mut runner = ScenarioRunner::new(config);
            if let Some(dir) = &cli.data_dir {
                runner = runner.with_data_dir(dir.clone());
            }

            match runner.run(&scenario).await {
                Ok(report) => {
                    if *json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        print_report(&report);
                    }
                    if !report.is_success() {
                        std::process::exit(1);
                    }
                    Ok(())
                }
                Err(e) => {
                    error!("Scenario execution failed: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Validate { scenario_file } => {
            let scenario = ScenarioConfig::from_toml_file(scenario_file)?;
            let sends = scenario
                .sequence
                .iter()
                .filter(|step| matches!(step.action, TestAction::SendWeight { .. }))
                .count();
            println!(
                "{} is valid: {} steps ({} sends), {} checks",
                scenario.metadata.name,
                scenario.sequence.len(),
                sends,
                scenario.validation.final_checks.len()
            );
            Ok(())
        }
    }
}

/// RUST_LOG wins when set; otherwise `-v` picks debug over info
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from file or use defaults
fn load_configuration(cli: &Cli) -> Result<SyncConfig> {
    if let Some(path) = &cli.config {
        info!("Loading configuration from: {}", path.display());
        Ok(SyncConfig::load_from_file(path)?)
    } else {
        info!("Using default configuration");
        Ok(SyncConfig::default())
    }
}

fn print_report(report: &ScenarioReport) {
    println!("Scenario Report");
    println!("==================");
    println!("Name: {}", report.scenario_name);
    println!("Version: {}", report.scenario_version);
    println!("Duration: {:.2}s", report.duration_secs);
    println!("Result: {}", report.summary());
    println!();

    println!("Steps ({}):", report.steps.len());
    for step in &report.steps {
        println!("  {} - {}", step.name, step.outcome);
    }
    println!();

    println!("Checks ({}):", report.checks.len());
    for check in &report.checks {
        let status = if check.passed { "PASS" } else { "FAIL" };
        println!("  {} {} ({})", status, check.description, check.detail);
    }
    println!();

    println!("Stored weights ({}):", report.stored_weights.len());
    for record in &report.stored_weights {
        println!("  {:.1} kg at {}", record.weight(), record.time().to_rfc3339());
    }
}
