//! Zeratul Delegation CLI
//!
//! Replays delegation scenarios against the lazy ledger and prints the
//! resulting balances.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use zeratul_delegation::{
    scenario, DelegationConfig, EpochClock, Scenario, SystemTimeSource, TimeSource,
};

#[derive(Parser)]
#[command(name = "zeratul-delegation")]
#[command(about = "Validator delegation lifecycle with lazy epoch-indexed balances")]
struct Cli {
    /// Config file path (defaults apply when absent)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Replay a scenario file and print final balances
    Replay {
        /// Scenario YAML
        scenario: PathBuf,
    },

    /// Show the effective configuration and the current epoch
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(cli.log_level.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let config = match &cli.config {
        Some(path) => DelegationConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DelegationConfig::default(),
    };

    match cli.command {
        Command::Replay { scenario } => replay(config, scenario),
        Command::Info => show_info(&config),
    }
}

fn replay(config: DelegationConfig, path: PathBuf) -> Result<()> {
    let scenario = Scenario::from_file(&path)
        .with_context(|| format!("loading scenario {}", path.display()))?;
    info!(steps = scenario.steps.len(), path = %path.display(), "replaying scenario");

    let report = scenario::run(config, &scenario)?;

    println!("Scenario: {}", path.display());
    println!("  Steps:               {}", report.steps);
    println!("  Expected failures:   {}", report.expected_failures);
    println!("  Final epoch:         {}", report.epoch);
    println!("  Delegations:         {}", report.delegations);
    println!();
    println!("Holders:");
    for holder in &report.holders {
        println!(
            "  {:<12} balance {:>12}  locked {:>12}  delegated {:>12}  slashed {:>12}",
            holder.name, holder.balance, holder.locked, holder.delegated, holder.slashed
        );
    }
    println!();
    println!("Validators:");
    for validator in &report.validators {
        println!(
            "  {:<12} id {:>4}  delegated {:>12}  bond {:>12}",
            validator.name, validator.id, validator.delegated, validator.bond
        );
    }
    Ok(())
}

fn show_info(config: &DelegationConfig) -> Result<()> {
    let clock = EpochClock::new(config.epoch)?;
    let now = SystemTimeSource.now();

    println!("Zeratul Delegation");
    println!();
    println!("{}", serde_yaml::to_string(config)?);
    println!("Clock:");
    println!("  Origin:              {}", clock.origin());
    println!("  Now:                 {}", now);
    match clock.epoch_of(now) {
        Ok(epoch) => {
            println!("  Current epoch:       {}", epoch);
            println!("  Epoch started at:    {}", clock.epoch_start(epoch)?);
        }
        Err(err) => println!("  Current epoch:       ({})", err),
    }
    Ok(())
}
