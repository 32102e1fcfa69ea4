//! Finished-task reports and the diagnostics a run surfaces.

use std::fmt;

use serde::Serialize;

use super::Policy;
use super::task::TaskId;

/// Outcome of one task: completion cycle, time spent blocked, abort flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinishedTask {
    /// Task identifier.
    pub id: TaskId,
    /// Cycle at which the task terminated (or was aborted).
    pub total_time: u32,
    /// Cycles the task spent blocked.
    pub waiting_time: u32,
    /// Whether the task was aborted instead of terminating.
    pub aborted: bool,
}

/// Noteworthy events surfaced by a run, in occurrence order.
///
/// These are not errors: every one of them is recovered locally and the
/// run continues. They are also emitted as `tracing` events as they happen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A task's initial claim exceeded total system capacity; it was
    /// aborted before running.
    InfeasibleInitialClaim {
        /// The aborted task.
        task: TaskId,
        /// Resource the claim named (zero-based).
        resource: usize,
        /// Units the task tried to claim.
        claimed: u32,
        /// Units actually present.
        available: u32,
    },
    /// A request would have pushed a task past its own declared maximum;
    /// the task was aborted mid-run.
    ClaimExceeded {
        /// The aborted task.
        task: TaskId,
        /// Resource requested (zero-based).
        resource: usize,
        /// Units requested.
        requested: u32,
        /// Units the task already held.
        held: u32,
        /// The task's declared maximum.
        max_claim: u32,
        /// Cycle of the violation.
        cycle: u32,
    },
    /// The ready set emptied while tasks remained blocked.
    DeadlockDetected {
        /// Cycle of the stall.
        cycle: u32,
    },
    /// A task was sacrificed to break a deadlock. Not a violation by that
    /// task, a recovery side effect.
    RecoveryAbort {
        /// The sacrificed task.
        task: TaskId,
        /// Cycle of the abort.
        cycle: u32,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::InfeasibleInitialClaim {
                task,
                resource,
                claimed,
                available,
            } => write!(
                f,
                "task {task} aborted before run begins: claim for resource {} ({claimed}) \
                 exceeds units present ({available})",
                resource + 1
            ),
            Diagnostic::ClaimExceeded {
                task,
                resource,
                requested,
                held,
                max_claim,
                cycle,
            } => write!(
                f,
                "cycle {cycle}: task {task} aborted: request for {requested} of resource {} \
                 on top of {held} held exceeds its claim of {max_claim}",
                resource + 1
            ),
            Diagnostic::DeadlockDetected { cycle } => {
                write!(f, "cycle {cycle}: deadlock detected")
            }
            Diagnostic::RecoveryAbort { task, cycle } => {
                write!(f, "cycle {cycle}: task {task} aborted to break deadlock")
            }
        }
    }
}

/// Result of running one trace under one policy.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Which policy produced this report.
    pub policy: Policy,
    /// Per-task outcomes, sorted by task id.
    pub tasks: Vec<FinishedTask>,
    /// Sum of completion cycles over non-aborted tasks.
    pub time_sum: u32,
    /// Sum of waiting cycles over non-aborted tasks.
    pub wait_sum: u32,
    /// `round(100 * wait_sum / time_sum)`; zero when nothing terminated.
    pub wait_percent: u32,
    /// Cycle count when the run ended.
    pub cycles: u32,
    /// Events surfaced during the run, in order.
    pub diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    /// Builds a report from the finished-task collection of a completed run.
    pub fn from_finished(
        policy: Policy,
        mut tasks: Vec<FinishedTask>,
        cycles: u32,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        tasks.sort_by_key(|task| task.id);

        let time_sum: u32 = tasks.iter().filter(|t| !t.aborted).map(|t| t.total_time).sum();
        let wait_sum: u32 = tasks
            .iter()
            .filter(|t| !t.aborted)
            .map(|t| t.waiting_time)
            .sum();

        Self {
            policy,
            tasks,
            time_sum,
            wait_sum,
            wait_percent: percent(wait_sum, time_sum),
            cycles,
            diagnostics,
        }
    }

    /// Renders the classic per-task summary table.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{}\n", self.policy));

        for task in &self.tasks {
            if task.aborted {
                out.push_str(&format!("Task {}\taborted\n", task.id));
            } else {
                out.push_str(&format!(
                    "Task {}\t{}\t{}\t{}%\n",
                    task.id,
                    task.total_time,
                    task.waiting_time,
                    percent(task.waiting_time, task.total_time)
                ));
            }
        }

        out.push_str(&format!(
            "total\t{}\t{}\t{}%\n",
            self.time_sum, self.wait_sum, self.wait_percent
        ));

        if !self.diagnostics.is_empty() {
            out.push('\n');
            for diagnostic in &self.diagnostics {
                out.push_str(&format!("{diagnostic}\n"));
            }
        }

        out
    }
}

fn percent(wait: u32, time: u32) -> u32 {
    if time == 0 {
        return 0;
    }
    (100.0 * f64::from(wait) / f64::from(time)).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(id: u32, total: u32, waiting: u32, aborted: bool) -> FinishedTask {
        FinishedTask {
            id: TaskId::new(id),
            total_time: total,
            waiting_time: waiting,
            aborted,
        }
    }

    #[test]
    fn test_totals_exclude_aborted_tasks() {
        let report = RunReport::from_finished(
            Policy::Banker,
            vec![finished(2, 10, 2, false), finished(1, 0, 0, true)],
            10,
            Vec::new(),
        );

        assert_eq!(report.time_sum, 10);
        assert_eq!(report.wait_sum, 2);
        assert_eq!(report.wait_percent, 20);
        // Sorted by id, aborted task still listed.
        assert_eq!(report.tasks[0].id, TaskId::new(1));
        assert!(report.tasks[0].aborted);
    }

    #[test]
    fn test_percent_rounds_to_nearest() {
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(0, 0), 0);
    }

    #[test]
    fn test_summary_lists_aborted_tasks() {
        let report = RunReport::from_finished(
            Policy::Optimistic,
            vec![finished(1, 0, 0, true), finished(2, 6, 1, false)],
            6,
            vec![Diagnostic::DeadlockDetected { cycle: 3 }],
        );

        let summary = report.summary();
        assert!(summary.contains("Task 1\taborted"));
        assert!(summary.contains("Task 2\t6\t1\t17%"));
        assert!(summary.contains("deadlock detected"));
    }
}
