//! CLI command implementations

use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use ration_core::config::{RecoveryVictimPolicy, SimulationConfig};
use ration_core::scenarios::{self, ScenarioParams};
use ration_core::{Policy, RunReport, Trace, run_policy};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a trace under one or both scheduling policies
    Run {
        /// Path to the trace file
        trace: PathBuf,
        /// Policy to run; omit to run both
        #[arg(short, long)]
        policy: Option<Policy>,
        /// Victim selection for deadlock recovery
        #[arg(long)]
        victim_policy: Option<RecoveryVictimPolicy>,
        /// Emit reports as JSON instead of the summary table
        #[arg(long)]
        json: bool,
    },
    /// Generate a random, well-formed trace on stdout
    Generate {
        /// Seed for reproducible generation
        #[arg(short, long, default_value = "42")]
        seed: u64,
        /// Number of tasks
        #[arg(short, long, default_value = "5")]
        tasks: u32,
        /// Number of resource types
        #[arg(short, long, default_value = "2")]
        resources: usize,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            trace,
            policy,
            victim_policy,
            json,
        } => run_trace(trace, policy, victim_policy, json),
        Commands::Generate {
            seed,
            tasks,
            resources,
        } => generate_trace(seed, tasks, resources),
    }
}

/// Run a trace file under the selected policies and print reports.
fn run_trace(
    path: PathBuf,
    policy: Option<Policy>,
    victim_policy: Option<RecoveryVictimPolicy>,
    json: bool,
) -> anyhow::Result<()> {
    let trace = Trace::from_path(&path)
        .with_context(|| format!("loading trace {}", path.display()))?;

    let mut config = SimulationConfig::from_env();
    if let Some(victim_policy) = victim_policy {
        config.victim_policy = victim_policy;
    }

    let policies = match policy {
        Some(policy) => vec![policy],
        None => vec![Policy::Banker, Policy::Optimistic],
    };

    let mut reports: Vec<RunReport> = Vec::new();
    for policy in policies {
        let report = run_policy(&trace, policy, &config)
            .with_context(|| format!("running {policy} policy"))?;
        reports.push(report);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            println!("{}", report.summary());
        }
    }

    Ok(())
}

/// Emit a generated trace in the trace file format.
fn generate_trace(seed: u64, tasks: u32, resources: usize) -> anyhow::Result<()> {
    let scenario = scenarios::generate(&ScenarioParams {
        seed,
        task_count: tasks,
        resource_count: resources,
        ..ScenarioParams::default()
    });

    print!("{}", scenario.to_trace_text());
    Ok(())
}
