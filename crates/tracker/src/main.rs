use std::path::PathBuf;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use tracker::config::TrackerConfig;
use tracker::logging::init_tracing;
use tracker::run::{print_patterns, run_parse, ParseArgs};

#[derive(Parser, Debug)]
#[command(
    name = "tracker",
    version,
    about = "Extract best-checkpoint metrics from training logs"
)]
struct Cli {
    /// Path to a tracker.toml config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract a metric record from each log
    Parse(ParseArgs),

    /// Show the recognized line patterns
    Patterns,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = TrackerConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    config.validate()
        .context("Configuration validation failed")?;

    init_tracing(&config.logging);

    match cli.command {
        Command::Parse(args) => {
            let mut stdout = std::io::stdout().lock();
            let summary = run_parse(&args, &config, &mut stdout)?;

            if args.stats {
                let stats = serde_json::to_string_pretty(&summary.stats)
                    .context("Failed to serialize batch counters")?;
                eprintln!("{}", stats);
            }

            if summary.failed() > 0 {
                warn!("{} of {} inputs could not be read", summary.failed(), args.files.len());
                anyhow::bail!("{} input(s) failed", summary.failed());
            }
            Ok(())
        }
        Command::Patterns => print_patterns(&mut std::io::stdout().lock()),
    }
}
