//! Ration Core - Resource-allocation simulation under two deadlock policies
//!
//! This crate simulates resource allocation among competing tasks in
//! discrete cycles. The same trace can run under deadlock *avoidance*
//! (Banker's algorithm, every grant proven safe in advance) or deadlock
//! *detection and recovery* (optimistic FIFO grants, abort-based recovery),
//! and each run reports per-task completion and waiting times.

pub mod config;
pub mod scenarios;
pub mod sim;
pub mod trace;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::{RecoveryVictimPolicy, SimulationConfig};
pub use sim::{
    Activity, ActivityKind, BankerScheduler, Diagnostic, FinishedTask, OptimisticScheduler,
    Policy, RunReport, SimulationError, Task, TaskId,
};
pub use trace::{Trace, TraceError};

/// Core errors that can bubble up from any Ration subsystem.
#[derive(Debug, thiserror::Error)]
pub enum RationError {
    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RationError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            RationError::Trace(e) => match e {
                TraceError::Parse { line, reason } => {
                    format!("Invalid trace (line {line}): {reason}")
                }
                TraceError::Io(_) => "Could not read trace file".to_string(),
            },
            RationError::Simulation(SimulationError::CycleLimit { limit }) => {
                format!("Simulation did not complete within {limit} cycles")
            }
            RationError::Simulation(_) => "Invalid task set".to_string(),
            RationError::Io(_) => "File system error occurred".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RationError>;

/// Runs one trace under the given policy with fresh state.
///
/// Convenience wrapper for callers that hold a parsed [`Trace`]; each call
/// instantiates its own task state, so repeat runs are independent and
/// deterministic.
///
/// # Errors
/// - `RationError::Simulation` - Task set invalid or cycle ceiling exceeded
pub fn run_policy(trace: &Trace, policy: Policy, config: &SimulationConfig) -> Result<RunReport> {
    let tasks = trace.instantiate();
    let capacities = trace.capacities().to_vec();

    let report = match policy {
        Policy::Banker => BankerScheduler::new(tasks, capacities, config)?.run()?,
        Policy::Optimistic => OptimisticScheduler::new(tasks, capacities, config)?.run()?,
    };

    Ok(report)
}
