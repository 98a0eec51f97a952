//! Audio Channel Simulator (acs-sim) - Main entry point
//!
//! Replays a TOML scenario of agents and playback operations against a fresh
//! audio channel service and checks the expected play states step by step.

use std::path::PathBuf;
use std::process::ExitCode;

use acs_common::config::{ServiceConfig, TomlConfig, CONFIG_ENV_VAR};
use acs_common::events::ChannelEvent;
use acs_service::scenario::{self, Scenario};
use acs_service::AudioChannelService;
use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for acs-sim
#[derive(Parser, Debug)]
#[command(name = "acs-sim")]
#[command(about = "Replay audio channel arbitration scenarios")]
#[command(version)]
struct Args {
    /// Scenario file (TOML)
    scenario: PathBuf,

    /// Configuration file
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Print the service events as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing; RUST_LOG overrides the configured level
    let level = config.logging.level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("acs_service={level},acs_common={level},acs_sim={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let scenario = Scenario::from_file(&args.scenario)
        .with_context(|| format!("Failed to read scenario {}", args.scenario.display()))?;
    info!(
        "Loaded scenario {} ({} agents, {} steps)",
        args.scenario.display(),
        scenario.agents.len(),
        scenario.steps.len()
    );

    let service = AudioChannelService::new(ServiceConfig::from(&config));
    let mut events = service.subscribe();

    let result = scenario::run(&scenario, &service).await;

    if args.json {
        print_events(&mut events)?;
    }

    match result {
        Ok(report) => {
            if !args.json {
                for outcome in &report.steps {
                    println!("{}", outcome);
                }
            }
            info!("Scenario passed ({} steps)", report.steps.len());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("Scenario failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Drain the events the run produced and print one JSON object per line
fn print_events(events: &mut tokio::sync::broadcast::Receiver<ChannelEvent>) -> Result<()> {
    loop {
        match events.try_recv() {
            Ok(event) => {
                let line = serde_json::to_string(&event).context("Failed to serialize event")?;
                println!("{}", line);
            }
            Err(TryRecvError::Lagged(skipped)) => {
                warn!("{} events dropped; raise event_capacity to keep them", skipped);
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return Ok(()),
        }
    }
}
