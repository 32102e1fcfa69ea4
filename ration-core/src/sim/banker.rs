//! Deadlock-avoidance scheduler: Banker's algorithm.
//!
//! Every grant is proven SAFE by the speculative safety check before it is
//! made, so granted tasks are always completable and the run never
//! deadlocks. Released units are deferred into the ledger's pending pool
//! and only become grantable at the next cycle boundary.

use tracing::{debug, warn};

use super::report::{Diagnostic, RunReport};
use super::safety::request_is_safe;
use super::task::{ActivityKind, Task, TaskId};
use super::{Policy, Simulation, SimulationError};
use crate::config::SimulationConfig;

/// Runs one task set to completion under deadlock avoidance.
///
/// Owns all run state; construct a fresh scheduler per run.
pub struct BankerScheduler {
    sim: Simulation,
}

impl BankerScheduler {
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
            self.sim.ledger.merge_pending();
            self.sim.end_cycle()?;
        }

        Ok(self.sim.into_report(Policy::Banker))
    }

    /// Step 1: retry every blocked task's pending request, in blocked-queue
    /// order, with the same availability + safety test a fresh request
    /// gets. Runs strictly before the ready pass.
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

            if request.amount <= self.sim.ledger.available(request.resource)
                && request_is_safe(id, &self.sim.tasks, &self.sim.ledger)
            {
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
                ActivityKind::Initiate => self.initiate(id, activity.resource, activity.amount),
                ActivityKind::Request => self.request(id, activity.resource, activity.amount),
                ActivityKind::Release => {
                    self.sim
                        .ledger
                        .release_deferred(id, activity.resource, activity.amount);
                    if let Some(task) = self.sim.tasks.get_mut(&id) {
                        task.consume_activity();
                    }
                }
                ActivityKind::Terminate => self.sim.finish(id),
            }
        }
    }

    /// Records a declared maximum claim, or aborts the task outright when
    /// the claim exceeds what the system has.
    fn initiate(&mut self, id: TaskId, resource: usize, amount: u32) {
        let available = self.sim.ledger.available(resource);
        if amount > available {
            warn!(
                task = %id,
                resource,
                claimed = amount,
                available,
                "initial claim infeasible, aborting before run begins"
            );
            self.sim.diagnose(Diagnostic::InfeasibleInitialClaim {
                task: id,
                resource,
                claimed: amount,
                available,
            });
            self.sim.abort(id);
            return;
        }

        if let Some(task) = self.sim.tasks.get_mut(&id) {
            task.max_claims[resource] = amount;
            task.consume_activity();
        }
    }

    /// Grants a request iff it fits in available units and the resulting
    /// state is provably SAFE; otherwise blocks the task. A request past
    /// the task's own declared maximum aborts it.
    fn request(&mut self, id: TaskId, resource: usize, amount: u32) {
        let held = self.sim.ledger.claim(id, resource);
        let (max_claim, already_blocked) = match self.sim.tasks.get(&id) {
            Some(task) => (task.max_claims[resource], task.blocked),
            None => return,
        };

        if held + amount > max_claim {
            warn!(
                cycle = self.sim.cycle,
                task = %id,
                requested = amount,
                held,
                max_claim,
                "request exceeds declared claim, aborting"
            );
            self.sim.diagnose(Diagnostic::ClaimExceeded {
                task: id,
                resource,
                requested: amount,
                held,
                max_claim,
                cycle: self.sim.cycle,
            });
            self.sim.abort(id);
            return;
        }

        let grantable = amount <= self.sim.ledger.available(resource) && !already_blocked;
        if grantable && request_is_safe(id, &self.sim.tasks, &self.sim.ledger) {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::task::Activity;

    fn activity(kind: ActivityKind, resource: usize, amount: u32, delay: u32) -> Activity {
        Activity::new(kind, resource, amount, delay)
    }

    fn scripted(id: u32, resource_count: usize, script: &[Activity]) -> Task {
        let mut task = Task::new(TaskId::new(id), resource_count);
        for step in script {
            task.push_activity(step.clone());
        }
        task
    }

    fn run(tasks: Vec<Task>, capacities: Vec<u32>) -> RunReport {
        BankerScheduler::new(tasks, capacities, &SimulationConfig::for_testing())
            .expect("valid task set")
            .run()
            .expect("run completes")
    }

    #[test]
    fn test_deferred_release_unblocks_waiter_next_cycle() {
        // 1 resource, 3 units. Task 1 takes 2, task 2 blocks on its own
        // request for 2, task 1 releases. The release is deferred, so task
        // 2 is granted only on the retry after the cycle boundary.
        let t1 = scripted(
            1,
            1,
            &[
                activity(ActivityKind::Initiate, 0, 2, 0),
                activity(ActivityKind::Request, 0, 2, 0),
                activity(ActivityKind::Release, 0, 2, 0),
                activity(ActivityKind::Terminate, 0, 0, 0),
            ],
        );
        let t2 = scripted(
            2,
            1,
            &[
                activity(ActivityKind::Initiate, 0, 2, 0),
                activity(ActivityKind::Request, 0, 2, 0),
                activity(ActivityKind::Release, 0, 2, 0),
                activity(ActivityKind::Terminate, 0, 0, 0),
            ],
        );

        let report = run(vec![t1, t2], vec![3]);

        let done: Vec<_> = report.tasks.iter().collect();
        assert!(done.iter().all(|t| !t.aborted));
        // Task 1 never waits; task 2 spends cycles blocked.
        assert_eq!(done[0].waiting_time, 0);
        assert!(done[1].waiting_time > 0);
        assert!(done[1].total_time > done[0].total_time);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_infeasible_initial_claim_aborts_immediately() {
        let t1 = scripted(
            1,
            1,
            &[
                activity(ActivityKind::Initiate, 0, 3, 0),
                activity(ActivityKind::Request, 0, 3, 0),
                activity(ActivityKind::Terminate, 0, 0, 0),
            ],
        );

        let report = run(vec![t1], vec![2]);

        assert_eq!(report.tasks.len(), 1);
        assert!(report.tasks[0].aborted);
        assert_eq!(report.time_sum, 0);
        assert!(matches!(
            report.diagnostics[0],
            Diagnostic::InfeasibleInitialClaim {
                task: TaskId(1),
                claimed: 3,
                available: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_request_beyond_claim_aborts_and_reclaims() {
        // Task 1 claims 2, takes 2, then requests 1 more: protocol
        // violation. Its units must flow back so task 2 can finish.
        let t1 = scripted(
            1,
            1,
            &[
                activity(ActivityKind::Initiate, 0, 2, 0),
                activity(ActivityKind::Request, 0, 2, 0),
                activity(ActivityKind::Request, 0, 1, 0),
                activity(ActivityKind::Terminate, 0, 0, 0),
            ],
        );
        let t2 = scripted(
            2,
            1,
            &[
                activity(ActivityKind::Initiate, 0, 3, 0),
                activity(ActivityKind::Request, 0, 3, 0),
                activity(ActivityKind::Release, 0, 3, 0),
                activity(ActivityKind::Terminate, 0, 0, 0),
            ],
        );

        let report = run(vec![t1, t2], vec![3]);

        assert!(report.tasks[0].aborted);
        assert!(!report.tasks[1].aborted);
        assert!(
            report
                .diagnostics
                .iter()
                .any(|d| matches!(d, Diagnostic::ClaimExceeded { task: TaskId(1), .. }))
        );
    }

    #[test]
    fn test_runs_are_deterministic() {
        let build = || {
            vec![
                scripted(
                    1,
                    1,
                    &[
                        activity(ActivityKind::Initiate, 0, 2, 0),
                        activity(ActivityKind::Request, 0, 2, 1),
                        activity(ActivityKind::Release, 0, 2, 0),
                        activity(ActivityKind::Terminate, 0, 0, 0),
                    ],
                ),
                scripted(
                    2,
                    1,
                    &[
                        activity(ActivityKind::Initiate, 0, 2, 0),
                        activity(ActivityKind::Request, 0, 2, 0),
                        activity(ActivityKind::Release, 0, 2, 2),
                        activity(ActivityKind::Terminate, 0, 0, 0),
                    ],
                ),
            ]
        };

        let first = run(build(), vec![3]);
        let second = run(build(), vec![3]);

        assert_eq!(first.tasks, second.tasks);
        assert_eq!(first.cycles, second.cycles);
        assert_eq!(first.wait_percent, second.wait_percent);
    }

    #[test]
    fn test_units_conserved_at_every_cycle_boundary() {
        use crate::scenarios::{self, ScenarioParams};

        for seed in 0..25 {
            let scenario = scenarios::generate(&ScenarioParams {
                seed,
                task_count: 6,
                resource_count: 3,
                ..ScenarioParams::default()
            });
            let mut scheduler = BankerScheduler::new(
                scenario.tasks,
                scenario.capacities,
                &SimulationConfig::for_testing(),
            )
            .expect("valid task set");

            while scheduler.sim.is_running() {
                scheduler.service_blocked();
                scheduler.advance_ready();
                scheduler.sim.promote_unblocked();
                scheduler.sim.ledger.merge_pending();
                assert!(scheduler.sim.ledger.is_conserved(), "seed {seed}");
                scheduler.sim.end_cycle().expect("below the ceiling");
            }
            assert!(scheduler.sim.ledger.is_conserved(), "seed {seed}");
        }
    }

    #[test]
    fn test_delay_postpones_activity_evaluation() {
        let t1 = scripted(
            1,
            1,
            &[
                activity(ActivityKind::Initiate, 0, 1, 0),
                activity(ActivityKind::Request, 0, 1, 3),
                activity(ActivityKind::Release, 0, 1, 0),
                activity(ActivityKind::Terminate, 0, 0, 0),
            ],
        );

        let report = run(vec![t1], vec![1]);

        // initiate(0) + 3 delay cycles + request + release + terminate.
        assert_eq!(report.tasks[0].total_time, 6);
        assert_eq!(report.tasks[0].waiting_time, 0);
    }
}
