//! Ration CLI - Command-line interface
//!
//! Runs resource-allocation traces under deadlock avoidance and
//! detection/recovery policies.

mod commands;

use clap::Parser;
use ration_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "ration")]
#[command(about = "A resource-allocation deadlock simulator")]
struct Cli {
    /// Console log level
    #[arg(long, default_value_t = CliLogLevel::Warn)]
    log_level: CliLogLevel,

    #[command(subcommand)]
    command: commands::Commands,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_tracing_level())?;

    commands::handle_command(cli.command)?;

    Ok(())
}
