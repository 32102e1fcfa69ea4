//! Detection/recovery scheduler: optimistic FIFO grants.
//!
//! Grants are purely availability-based, with no safety check and no
//! declared maxima. When the ready set empties while tasks remain blocked,
//! the run declares deadlock and aborts victims until the head of the
//! blocked queue becomes grantable again. Each recovery round removes at
//! least one blocked task, so the run always terminates.

use tracing::{debug, info, warn};

use super::report::{Diagnostic, RunReport};
use super::task::{ActivityKind, Task, TaskId};
use super::{Policy, Simulation, SimulationError};
use crate::config::{RecoveryVictimPolicy, SimulationConfig};

/// Runs one task set to completion under deadlock detection and recovery.
///
/// Owns all run state; construct a fresh scheduler per run.
pub struct OptimisticScheduler {
    sim: Simulation,
    victim_policy: RecoveryVictimPolicy,
    deadlocked: bool,
}

impl OptimisticScheduler {
    /// Creates a scheduler for the given task set and capacity vector.
    ///
    /// # Errors
    /// - `SimulationError::DuplicateTask` - Two tasks share an id
    /// - `SimulationError::UnknownResource` - Activity names a resource the
    ///   capacity vector lacks
    pub fn new(
        tasks: Vec<Task>,
        capacities: Vec<u32>,
        config: &SimulationConfig,
    ) -> Result<Self, SimulationError> {
        Ok(Self {
            sim: Simulation::new(tasks, capacities, config.max_cycles)?,
            victim_policy: config.victim_policy,
            deadlocked: false,
        })
    }

    /// Runs the simulation to completion and reports per-task outcomes.
    ///
    /// # Errors
    /// - `SimulationError::CycleLimit` - Run exceeded the configured cycle
    ///   ceiling
    pub fn run(mut self) -> Result<RunReport, SimulationError> {
        while self.sim.is_running() {
            self.service_blocked();
            self.advance_ready();
            self.sim.promote_unblocked();
            self.detect_and_recover();
            self.sim.end_cycle()?;
        }

        Ok(self.sim.into_report(Policy::Optimistic))
    }

    /// Step 1: retry blocked tasks in queue order. A request is granted
    /// whenever enough units are free right now.
    fn service_blocked(&mut self) {
        let ids: Vec<TaskId> = self.sim.blocked.iter().copied().collect();

        for id in ids {
            let Some(request) = self
                .sim
                .tasks
                .get(&id)
                .and_then(|task| task.peek_activity())
                .cloned()
            else {
                continue;
            };

            if request.amount <= self.sim.ledger.available(request.resource) {
                self.sim.ledger.reserve(id, request.resource, request.amount);
                if let Some(task) = self.sim.tasks.get_mut(&id) {
                    task.consume_activity();
                    task.blocked = false;
                }
                debug!(cycle = self.sim.cycle, task = %id, "blocked request granted");
            } else if let Some(task) = self.sim.tasks.get_mut(&id) {
                task.waiting_time += 1;
            }
        }
    }

    /// Step 2: advance every ready task by at most one eligible activity.
    /// Initiates carry no feasibility check here: this policy never
    /// consults declared maxima.
    fn advance_ready(&mut self) {
        let ids: Vec<TaskId> = self.sim.ready.iter().copied().collect();

        for id in ids {
            let Some(task) = self.sim.tasks.get_mut(&id) else {
                continue;
            };
            if task.tick_delay() {
                continue;
            }
            let Some(activity) = task.peek_activity().cloned() else {
                self.sim.finish(id);
                continue;
            };

            match activity.kind {
                ActivityKind::Initiate => {
                    task.consume_activity();
                }
                ActivityKind::Request => self.request(id, activity.resource, activity.amount),
                ActivityKind::Release => {
                    self.sim
                        .ledger
                        .release_immediate(id, activity.resource, activity.amount);
                    if let Some(task) = self.sim.tasks.get_mut(&id) {
                        task.consume_activity();
                    }
                }
                ActivityKind::Terminate => self.sim.finish(id),
            }
        }
    }

    fn request(&mut self, id: TaskId, resource: usize, amount: u32) {
        let already_blocked = self
            .sim
            .tasks
            .get(&id)
            .is_some_and(|task| task.blocked);

        if amount <= self.sim.ledger.available(resource) && !already_blocked {
            self.sim.ledger.reserve(id, resource, amount);
            if let Some(task) = self.sim.tasks.get_mut(&id) {
                task.consume_activity();
            }
            debug!(cycle = self.sim.cycle, task = %id, resource, amount, "request granted");
        } else {
            if let Some(task) = self.sim.tasks.get_mut(&id) {
                task.waiting_time += 1;
                task.blocked = true;
            }
            self.sim.block(id);
            debug!(cycle = self.sim.cycle, task = %id, resource, amount, "request blocked");
        }
    }

    /// Declares deadlock when the ready set is empty with tasks still
    /// blocked, then aborts victims until the head of the blocked queue can
    /// be granted. Aborted units become grantable this cycle; the freed
    /// head rejoins ready and first advances next cycle.
    fn detect_and_recover(&mut self) {
        if self.sim.ready.is_empty() && !self.sim.blocked.is_empty() && !self.deadlocked {
            info!(cycle = self.sim.cycle, "deadlock detected");
            self.sim.diagnose(Diagnostic::DeadlockDetected {
                cycle: self.sim.cycle,
            });
            self.deadlocked = true;
        }

        if !self.deadlocked {
            return;
        }

        while !self.sim.blocked.is_empty() && !self.head_grantable() {
            let Some(victim) = self.choose_victim() else {
                break;
            };
            warn!(cycle = self.sim.cycle, task = %victim, "aborting task to break deadlock");
            self.sim.diagnose(Diagnostic::RecoveryAbort {
                task: victim,
                cycle: self.sim.cycle,
            });
            self.sim.abort(victim);
        }

        if let Some(&head) = self.sim.blocked.front() {
            self.sim.blocked.pop_front();
            if let Some(task) = self.sim.tasks.get_mut(&head) {
                task.blocked = false;
            }
            self.sim.ready.push_back(head);
        }

        self.deadlocked = false;
    }

    /// Whether the head of the blocked queue could be granted its pending
    /// request from current available units.
    fn head_grantable(&self) -> bool {
        let Some(&head) = self.sim.blocked.front() else {
            return false;
        };
        match self.sim.tasks.get(&head).and_then(Task::peek_activity) {
            Some(request) => request.amount <= self.sim.ledger.available(request.resource),
            None => true,
        }
    }

    /// Picks the next task to sacrifice.
    ///
    /// The default policy aborts the lowest task id across the whole
    /// blocked collection, which is not necessarily the head whose request
    /// gates the loop; `BlockedHead` aborts the head itself.
    fn choose_victim(&self) -> Option<TaskId> {
        match self.victim_policy {
            RecoveryVictimPolicy::LowestTaskId => self.sim.blocked.iter().copied().min(),
            RecoveryVictimPolicy::BlockedHead => self.sim.blocked.front().copied(),
        }
    }
}
