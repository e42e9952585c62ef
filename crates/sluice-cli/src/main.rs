//! Sluice CLI: run simulated workloads through a capacity valve.
//!
//! Defaults come from the environment (`SLUICE_VALVE_MAX`,
//! `SLUICE_COMMAND_BUFFER`, `SLUICE_LOG_FORMAT`, optionally via `.env`);
//! flags override them.

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use sluice_cli::{run_simulation, SimulationConfig};
use sluice_core::ValveConfig;
use sluice_infra::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use sluice_worker::RegulatorConfig;

#[derive(Parser)]
#[command(name = "sluice", about = "Fixed-capacity admission valve")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run holders through a regulator and report what happened to their leases
    Simulate {
        /// Valve maximum: a count or "infinity" (defaults to SLUICE_VALVE_MAX)
        #[arg(long)]
        max: Option<String>,
        /// Number of simulated holders
        #[arg(long, default_value = "10")]
        holders: usize,
        /// Work duration per holder in milliseconds
        #[arg(long, default_value = "100")]
        work_ms: u64,
        /// Abort every n-th holder while it holds its lease (0 disables)
        #[arg(long, default_value = "0")]
        crash_every: usize,
        /// Lower the maximum to this value while the simulation runs
        #[arg(long)]
        lower_to: Option<String>,
        /// Delay before applying --lower-to, in milliseconds
        #[arg(long, default_value = "50")]
        reconfigure_after_ms: u64,
    },
    /// Print the effective configuration as JSON
    Config,
}

#[derive(Serialize)]
struct EffectiveConfig {
    valve: ValveConfig,
    command_buffer: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let telemetry = TelemetryConfig::from_env("sluice")?;
    init_telemetry(&telemetry)?;

    let cli = Cli::parse();
    let result = run(cli).await;

    shutdown_telemetry().await;
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let regulator = RegulatorConfig::from_env()?;

    match cli.command {
        Commands::Simulate {
            max,
            holders,
            work_ms,
            crash_every,
            lower_to,
            reconfigure_after_ms,
        } => {
            let valve = match max {
                Some(max) => ValveConfig::parse_max(&max).context("--max is invalid")?,
                None => ValveConfig::from_env()?,
            };
            let lower_to = lower_to
                .map(|raw| ValveConfig::parse_max(&raw))
                .transpose()
                .context("--lower-to is invalid")?;

            let report = run_simulation(SimulationConfig {
                valve,
                regulator,
                holders,
                work: Duration::from_millis(work_ms),
                crash_every,
                lower_to,
                reconfigure_after: Duration::from_millis(reconfigure_after_ms),
            })
            .await?;

            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Config => {
            let effective = EffectiveConfig {
                valve: ValveConfig::from_env()?,
                command_buffer: regulator.command_buffer,
            };
            println!("{}", serde_json::to_string_pretty(&effective)?);
        }
    }

    Ok(())
}
