//! Discrete-cycle resource-allocation simulation engine.
//!
//! Two scheduling policies run the same trace: deadlock avoidance
//! ([`BankerScheduler`]) proves every grant safe before making it, while
//! detection/recovery ([`OptimisticScheduler`]) grants optimistically and
//! aborts tasks to break the deadlocks that result.

pub mod banker;
pub mod ledger;
pub mod optimistic;
pub mod report;
pub mod safety;
pub mod task;

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use serde::Serialize;

pub use banker::BankerScheduler;
pub use ledger::ResourceLedger;
pub use optimistic::OptimisticScheduler;
pub use report::{Diagnostic, FinishedTask, RunReport};
pub use safety::request_is_safe;
pub use task::{Activity, ActivityKind, Task, TaskId};

/// The two scheduling policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Deadlock avoidance: Banker's algorithm with a safety check before
    /// every grant.
    Banker,
    /// Deadlock detection and recovery: optimistic FIFO grants, abort-based
    /// recovery.
    Optimistic,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Banker => write!(f, "BANKER'S"),
            Policy::Optimistic => write!(f, "FIFO"),
        }
    }
}

/// Errors that prevent a simulation from being constructed or completing.
///
/// Conditions recovered within a run (infeasible claims, protocol
/// violations, recovery aborts) are [`Diagnostic`]s, not errors.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// Two tasks in the input share an id.
    #[error("duplicate task id {id} in task set")]
    DuplicateTask {
        /// The repeated id.
        id: TaskId,
    },

    /// An activity referenced a resource index the capacity vector lacks.
    #[error("task {task} references resource index {resource}, only {resource_count} present")]
    UnknownResource {
        /// Task owning the bad activity.
        task: TaskId,
        /// Offending zero-based resource index.
        resource: usize,
        /// Number of resource types in the run.
        resource_count: usize,
    },

    /// The run exceeded the configured cycle ceiling without draining.
    #[error("simulation exceeded {limit} cycles without completing")]
    CycleLimit {
        /// The configured ceiling.
        limit: u32,
    },
}

/// Mutable state of one run: cycle counter, ledger, and the ready, blocked,
/// and finished collections.
///
/// Constructed per run and owned exclusively by one scheduler instance, so
/// several simulations in one process cannot contaminate each other.
#[derive(Debug)]
pub(crate) struct Simulation {
    pub(crate) cycle: u32,
    pub(crate) ledger: ResourceLedger,
    /// Every unfinished task, keyed by id. Membership in `ready`/`blocked`
    /// is tracked by id so passes can iterate a stable snapshot of ids and
    /// mutate the live collections afterwards.
    pub(crate) tasks: BTreeMap<TaskId, Task>,
    pub(crate) ready: VecDeque<TaskId>,
    pub(crate) blocked: VecDeque<TaskId>,
    pub(crate) finished: Vec<FinishedTask>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    max_cycles: u32,
}

impl Simulation {
    /// Builds the initial state from a task set and capacity vector.
    pub(crate) fn new(
        tasks: Vec<Task>,
        capacities: Vec<u32>,
        max_cycles: u32,
    ) -> Result<Self, SimulationError> {
        let resource_count = capacities.len();
        let mut task_map = BTreeMap::new();
        let mut ready = VecDeque::new();

        for task in tasks {
            if task_map.contains_key(&task.id) {
                return Err(SimulationError::DuplicateTask { id: task.id });
            }
            if let Some(bad) = task
                .activities()
                .map(|activity| activity.resource)
                .find(|&resource| resource >= resource_count)
            {
                return Err(SimulationError::UnknownResource {
                    task: task.id,
                    resource: bad,
                    resource_count,
                });
            }
            ready.push_back(task.id);
            task_map.insert(task.id, task);
        }

        let ledger = ResourceLedger::new(capacities, task_map.keys().copied());

        Ok(Self {
            cycle: 0,
            ledger,
            tasks: task_map,
            ready,
            blocked: VecDeque::new(),
            finished: Vec::new(),
            diagnostics: Vec::new(),
            max_cycles,
        })
    }

    /// A run keeps cycling while any task is still ready or blocked.
    pub(crate) fn is_running(&self) -> bool {
        !self.ready.is_empty() || !self.blocked.is_empty()
    }

    /// Moves a terminated task to the finished collection.
    pub(crate) fn finish(&mut self, id: TaskId) {
        self.remove_everywhere(id);
        if let Some(task) = self.tasks.remove(&id) {
            self.finished.push(FinishedTask {
                id,
                total_time: self.cycle,
                waiting_time: task.waiting_time,
                aborted: false,
            });
        }
    }

    /// Aborts a task: reclaims every unit it holds and retires it.
    ///
    /// Idempotent; aborting an already-removed task has no effect.
    pub(crate) fn abort(&mut self, id: TaskId) {
        self.remove_everywhere(id);
        self.ledger.reclaim_all(id);
        if let Some(task) = self.tasks.remove(&id) {
            self.finished.push(FinishedTask {
                id,
                total_time: self.cycle,
                waiting_time: task.waiting_time,
                aborted: true,
            });
        }
    }

    /// Moves tasks whose blocked flag was cleared this cycle back to the
    /// ready set, preserving blocked-queue order. Runs after the ready
    /// pass, so an unblocked task first advances again next cycle.
    pub(crate) fn promote_unblocked(&mut self) {
        let ids: Vec<TaskId> = self.blocked.iter().copied().collect();
        for id in ids {
            if self.tasks.get(&id).is_some_and(|task| !task.blocked) {
                self.blocked.retain(|&b| b != id);
                self.ready.push_back(id);
            }
        }
    }

    /// Moves a ready task to the back of the blocked queue.
    pub(crate) fn block(&mut self, id: TaskId) {
        self.ready.retain(|&r| r != id);
        if !self.blocked.contains(&id) {
            self.blocked.push_back(id);
        }
    }

    /// Closes out a cycle: bumps the counter and enforces the ceiling.
    pub(crate) fn end_cycle(&mut self) -> Result<(), SimulationError> {
        debug_assert!(self.ledger.is_conserved());
        self.cycle += 1;
        if self.cycle > self.max_cycles {
            return Err(SimulationError::CycleLimit {
                limit: self.max_cycles,
            });
        }
        Ok(())
    }

    /// Consumes the state into a report once the run has drained.
    pub(crate) fn into_report(self, policy: Policy) -> RunReport {
        RunReport::from_finished(policy, self.finished, self.cycle, self.diagnostics)
    }

    /// Records a diagnostic for the report.
    pub(crate) fn diagnose(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    fn remove_everywhere(&mut self, id: TaskId) {
        self.ready.retain(|&r| r != id);
        self.blocked.retain(|&b| b != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulation(task_ids: &[u32]) -> Simulation {
        let tasks = task_ids
            .iter()
            .map(|&id| Task::new(TaskId::new(id), 1))
            .collect();
        Simulation::new(tasks, vec![4], 1000).expect("valid task set")
    }

    #[test]
    fn test_duplicate_task_ids_rejected() {
        let tasks = vec![Task::new(TaskId::new(1), 1), Task::new(TaskId::new(1), 1)];
        let err = Simulation::new(tasks, vec![4], 1000).unwrap_err();
        assert!(matches!(err, SimulationError::DuplicateTask { id: TaskId(1) }));
    }

    #[test]
    fn test_unknown_resource_rejected() {
        let mut task = Task::new(TaskId::new(1), 2);
        task.push_activity(Activity::new(ActivityKind::Request, 1, 1, 0));
        let err = Simulation::new(vec![task], vec![4], 1000).unwrap_err();
        assert!(matches!(
            err,
            SimulationError::UnknownResource { resource: 1, resource_count: 1, .. }
        ));
    }

    #[test]
    fn test_abort_is_idempotent() {
        let mut sim = simulation(&[1, 2]);
        sim.ledger.reserve(TaskId::new(1), 0, 3);

        sim.abort(TaskId::new(1));
        assert_eq!(sim.ledger.available(0), 4);
        assert_eq!(sim.finished.len(), 1);
        assert!(sim.finished[0].aborted);
        assert!(!sim.ready.contains(&TaskId::new(1)));

        // Second abort: no observable effect.
        sim.abort(TaskId::new(1));
        assert_eq!(sim.ledger.available(0), 4);
        assert_eq!(sim.finished.len(), 1);
    }

    #[test]
    fn test_unblocked_tasks_rejoin_ready_in_queue_order() {
        let mut sim = simulation(&[1, 2, 3]);
        sim.block(TaskId::new(2));
        sim.block(TaskId::new(3));
        for id in [2, 3] {
            if let Some(task) = sim.tasks.get_mut(&TaskId::new(id)) {
                task.blocked = false;
            }
        }

        sim.promote_unblocked();
        assert!(sim.blocked.is_empty());
        assert_eq!(
            sim.ready.iter().copied().collect::<Vec<_>>(),
            vec![TaskId::new(1), TaskId::new(2), TaskId::new(3)]
        );
    }

    #[test]
    fn test_cycle_limit_enforced() {
        let mut sim = simulation(&[1]);
        let limit = 1000;
        for _ in 0..limit {
            sim.end_cycle().expect("below the ceiling");
        }
        assert!(matches!(
            sim.end_cycle(),
            Err(SimulationError::CycleLimit { limit: 1000 })
        ));
    }
}
