//! fusebox CLI
//!
//! Drives a scripted, flaky action through a circuit breaker and reports
//! what the breaker did with every call.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fusebox::CircuitBreaker;

mod simulate;

use simulate::{Pattern, Simulation};

#[derive(Parser)]
#[command(name = "fusebox")]
#[command(about = "Exercise a circuit breaker against a scripted action", long_about = None)]
#[command(version)]
struct Cli {
    /// Log breaker transitions at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sequence of successes and failures through a breaker
    Simulate {
        /// Consecutive failures tolerated while closed
        #[arg(long, default_value_t = 3)]
        failure_threshold: u32,

        /// Consecutive failures tolerated while half-open
        #[arg(long, default_value_t = 2)]
        trial_limit: u32,

        /// Time spent open before probing (e.g. "1s", "250ms")
        #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
        cooldown: Duration,

        /// One character per call: 's' succeeds, 'f' fails
        #[arg(long, default_value = "ffffsfs")]
        pattern: Pattern,

        /// Pause between calls
        #[arg(long, default_value = "300ms", value_parser = humantime::parse_duration)]
        interval: Duration,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "fusebox=debug" } else { "fusebox=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Simulate {
            failure_threshold,
            trial_limit,
            cooldown,
            pattern,
            interval,
            json,
        } => {
            let breaker = CircuitBreaker::builder()
                .failure_threshold(failure_threshold)
                .half_open_trial_limit(trial_limit)
                .cooldown(cooldown)
                .build()
                .context("Invalid breaker settings")?;

            tracing::info!(
                failure_threshold,
                trial_limit,
                cooldown = %humantime::format_duration(cooldown),
                calls = pattern.len(),
                "Starting simulation"
            );

            let report = Simulation::new(breaker, pattern, interval).run().await;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report);
            }
        }
    }

    Ok(())
}
