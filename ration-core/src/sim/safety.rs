//! Banker's safety check: speculative grant-and-complete evaluation.
//!
//! The checker never touches live scheduler state. It works on a snapshot
//! of the ledger and copies of the active tasks, so the same question asked
//! twice gives the same answer with no side effects.

use std::collections::BTreeMap;

use super::ledger::ResourceLedger;
use super::task::{Task, TaskId};

/// Decides whether granting the head request of `requester` would leave the
/// system in a SAFE state.
///
/// A state is SAFE when some order of future grants lets every active task
/// run to completion. `active` must contain every unfinished task (ready
/// and blocked), including the requester, whose head activity must be a
/// request.
///
/// The live ledger is snapshotted internally; nothing observable changes.
pub fn request_is_safe(
    requester: TaskId,
    active: &BTreeMap<TaskId, Task>,
    ledger: &ResourceLedger,
) -> bool {
    // With no other active tasks the grant trivially completes.
    if active.len() <= 1 {
        return true;
    }

    let mut ledger = ledger.snapshot();
    let mut active: BTreeMap<TaskId, Task> = active.clone();
    let resource_count = ledger.resource_count();

    let Some(task) = active.get(&requester) else {
        return false;
    };
    let Some(request) = task.peek_activity().cloned() else {
        // Nothing pending means nothing to grant.
        return false;
    };

    // If the requester's worst-case remaining need exceeds what is
    // available on any resource, it cannot be driven to completion from
    // this snapshot: UNSAFE without simulating further.
    for resource in 0..resource_count {
        let held = ledger.claim(requester, resource);
        if task.max_additional_need(resource, held) > ledger.available(resource) {
            return false;
        }
    }

    // Tentatively grant the request in the snapshot.
    ledger.reserve(requester, request.resource, request.amount);
    if let Some(task) = active.get_mut(&requester) {
        task.consume_activity();
    }

    // Fixed-point reduction: keep retiring tasks whose worst-case
    // additional need for some resource fits in what is currently
    // available. A retired task gives back everything it holds, which can
    // unlock further retirements on earlier resources, so the full pass
    // over all resources repeats until a pass removes nothing.
    loop {
        let mut removed_any = false;

        for resource in 0..resource_count {
            loop {
                let completable = active.iter().find_map(|(&id, task)| {
                    let held = ledger.claim(id, resource);
                    (task.max_additional_need(resource, held) <= ledger.available(resource))
                        .then_some(id)
                });

                let Some(id) = completable else { break };
                ledger.reclaim_all(id);
                active.remove(&id);
                removed_any = true;
            }
        }

        if !removed_any {
            break;
        }
    }

    // SAFE iff every task could hypothetically reach completion, i.e. the
    // whole claims matrix was reduced to zero.
    active.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::task::{Activity, ActivityKind};

    fn task_with_request(id: u32, claim: u32, amount: u32) -> Task {
        let mut task = Task::new(TaskId::new(id), 1);
        task.max_claims[0] = claim;
        task.push_activity(Activity::new(ActivityKind::Request, 0, amount, 0));
        task
    }

    fn active_set(tasks: Vec<Task>) -> BTreeMap<TaskId, Task> {
        tasks.into_iter().map(|t| (t.id, t)).collect()
    }

    #[test]
    fn test_single_task_is_trivially_safe() {
        let task = task_with_request(1, 3, 3);
        let ledger = ResourceLedger::new(vec![3], [task.id]);
        let active = active_set(vec![task]);

        assert!(request_is_safe(TaskId::new(1), &active, &ledger));
    }

    #[test]
    fn test_grant_within_everyones_worst_case_is_safe() {
        // 3 units; both tasks claim 2. Granting task 1's request for 2
        // leaves 1 unit, but task 1 can finish and release, after which
        // task 2's worst case fits.
        let t1 = task_with_request(1, 2, 2);
        let t2 = task_with_request(2, 2, 2);
        let ledger = ResourceLedger::new(vec![3], [t1.id, t2.id]);
        let active = active_set(vec![t1, t2]);

        assert!(request_is_safe(TaskId::new(1), &active, &ledger));
    }

    #[test]
    fn test_requester_exceeding_available_is_unsafe() {
        // Task 1 already holds 2 of its claim of 3; only 0 units remain
        // available once task 2 holds the rest, so task 1's worst-case
        // additional need cannot be met.
        let t1 = task_with_request(1, 3, 1);
        let t2 = task_with_request(2, 2, 1);
        let mut ledger = ResourceLedger::new(vec![3], [t1.id, t2.id]);
        ledger.reserve(t1.id, 0, 2);
        ledger.reserve(t2.id, 0, 1);
        let active = active_set(vec![t1, t2]);

        assert!(!request_is_safe(TaskId::new(1), &active, &ledger));
    }

    #[test]
    fn test_reduction_repeats_full_passes_across_resources() {
        // Two resources, 3 units each. Tasks 3 and 4 each hold one unit of
        // both resources and cannot retire in the first pass: their
        // resource-1 needs exceed what is free until task 2 retires during
        // the resource-1 scan and gives back its resource-0 unit. Only the
        // second full pass, back at resource 0, can then retire them. A
        // single-pass reduction would report UNSAFE here.
        let mut q = Task::new(TaskId::new(1), 2);
        q.max_claims = vec![0, 1];
        q.push_activity(Activity::new(ActivityKind::Request, 1, 1, 0));

        let mut x = Task::new(TaskId::new(2), 2);
        x.max_claims = vec![2, 1];

        let mut d = Task::new(TaskId::new(3), 2);
        d.max_claims = vec![2, 3];

        let mut f = Task::new(TaskId::new(4), 2);
        f.max_claims = vec![2, 3];

        let mut ledger = ResourceLedger::new(vec![3, 3], [q.id, x.id, d.id, f.id]);
        ledger.reserve(x.id, 0, 1);
        ledger.reserve(d.id, 0, 1);
        ledger.reserve(d.id, 1, 1);
        ledger.reserve(f.id, 0, 1);
        ledger.reserve(f.id, 1, 1);
        let active = active_set(vec![q, x, d, f]);

        assert!(request_is_safe(TaskId::new(1), &active, &ledger));
    }

    #[test]
    fn test_checker_leaves_live_state_untouched() {
        let t1 = task_with_request(1, 2, 2);
        let t2 = task_with_request(2, 2, 2);
        let ledger = ResourceLedger::new(vec![3], [t1.id, t2.id]);
        let active = active_set(vec![t1, t2]);

        let before_available = ledger.available(0);
        let verdict_one = request_is_safe(TaskId::new(1), &active, &ledger);
        let verdict_two = request_is_safe(TaskId::new(1), &active, &ledger);

        assert_eq!(verdict_one, verdict_two);
        assert_eq!(ledger.available(0), before_available);
        assert_eq!(active[&TaskId::new(1)].remaining_activities(), 1);
    }
}
