//! Resource ledger: available, claimed, and pending-freed unit counts.
//!
//! The ledger is the single source of truth for who holds what. The two
//! scheduling policies differ only in the release path: avoidance defers
//! released units into `pending_freed` until the cycle boundary, while
//! detection/recovery credits `available` immediately.

use std::collections::BTreeMap;

use super::task::TaskId;

/// Unit accounting for every resource type across one simulation run.
///
/// Conservation invariant: for every resource `r`,
/// `available[r] + Σ claims[t][r] + pending_freed[r] == total_units[r]`.
#[derive(Debug, Clone)]
pub struct ResourceLedger {
    /// Fixed capacity per resource type.
    total_units: Vec<u32>,
    /// Units free for granting right now.
    available: Vec<u32>,
    /// Units released this cycle but withheld until the cycle boundary.
    pending_freed: Vec<u32>,
    /// Units currently held, per task per resource. BTreeMap keeps
    /// iteration order deterministic.
    claims: BTreeMap<TaskId, Vec<u32>>,
}

impl ResourceLedger {
    /// Creates a ledger with all units available and a zero claim row for
    /// each task.
    pub fn new(total_units: Vec<u32>, task_ids: impl IntoIterator<Item = TaskId>) -> Self {
        let resource_count = total_units.len();
        let claims = task_ids
            .into_iter()
            .map(|id| (id, vec![0; resource_count]))
            .collect();

        Self {
            available: total_units.clone(),
            pending_freed: vec![0; resource_count],
            total_units,
            claims,
        }
    }

    /// Number of resource types tracked.
    pub fn resource_count(&self) -> usize {
        self.total_units.len()
    }

    /// Units of `resource` free for granting right now.
    pub fn available(&self, resource: usize) -> u32 {
        self.available[resource]
    }

    /// Fixed capacity of `resource`.
    pub fn total_units(&self, resource: usize) -> u32 {
        self.total_units[resource]
    }

    /// Units of `resource` currently held by `task`.
    pub fn claim(&self, task: TaskId, resource: usize) -> u32 {
        self.claims[&task][resource]
    }

    /// Grants `amount` units of `resource` to `task`.
    ///
    /// Precondition: `amount <= available(resource)`. The caller performs
    /// the availability test; granting more than is available is a contract
    /// violation.
    pub fn reserve(&mut self, task: TaskId, resource: usize, amount: u32) {
        debug_assert!(amount <= self.available[resource]);
        self.available[resource] -= amount;
        self.claim_row(task)[resource] += amount;
    }

    /// Releases `amount` units into `pending_freed`; they become available
    /// only after the next [`merge_pending`](Self::merge_pending).
    pub fn release_deferred(&mut self, task: TaskId, resource: usize, amount: u32) {
        self.claim_row(task)[resource] -= amount;
        self.pending_freed[resource] += amount;
    }

    /// Releases `amount` units directly into `available`, grantable within
    /// the same cycle.
    pub fn release_immediate(&mut self, task: TaskId, resource: usize, amount: u32) {
        self.claim_row(task)[resource] -= amount;
        self.available[resource] += amount;
    }

    /// Returns every unit `task` holds to `available` and zeroes its claim
    /// row. Used on abort; idempotent once the row is zero.
    pub fn reclaim_all(&mut self, task: TaskId) {
        let row = self.claim_row(task);
        let held: Vec<u32> = std::mem::take(row);
        let resource_count = held.len();
        self.claims.insert(task, vec![0; resource_count]);
        for (resource, amount) in held.into_iter().enumerate() {
            self.available[resource] += amount;
        }
    }

    /// Folds `pending_freed` into `available` and zeroes it. Called once
    /// per cycle boundary, avoidance mode only.
    pub fn merge_pending(&mut self) {
        for (resource, freed) in self.pending_freed.iter_mut().enumerate() {
            self.available[resource] += *freed;
            *freed = 0;
        }
    }

    /// Produces an independent deep copy for speculative evaluation. The
    /// copy shares nothing with the live ledger.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Checks the conservation invariant for every resource.
    pub fn is_conserved(&self) -> bool {
        (0..self.resource_count()).all(|resource| {
            let claimed: u32 = self.claims.values().map(|row| row[resource]).sum();
            self.available[resource] + claimed + self.pending_freed[resource]
                == self.total_units[resource]
        })
    }

    fn claim_row(&mut self, task: TaskId) -> &mut Vec<u32> {
        self.claims
            .get_mut(&task)
            .unwrap_or_else(|| panic!("no claim row for task {task}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> ResourceLedger {
        ResourceLedger::new(vec![4, 2], [TaskId::new(1), TaskId::new(2)])
    }

    #[test]
    fn test_reserve_moves_units_from_available_to_claims() {
        let mut ledger = ledger();
        ledger.reserve(TaskId::new(1), 0, 3);

        assert_eq!(ledger.available(0), 1);
        assert_eq!(ledger.claim(TaskId::new(1), 0), 3);
        assert!(ledger.is_conserved());
    }

    #[test]
    fn test_deferred_release_withholds_units_until_merge() {
        let mut ledger = ledger();
        ledger.reserve(TaskId::new(1), 0, 3);
        ledger.release_deferred(TaskId::new(1), 0, 3);

        // Released but not yet grantable.
        assert_eq!(ledger.available(0), 1);
        assert_eq!(ledger.claim(TaskId::new(1), 0), 0);
        assert!(ledger.is_conserved());

        ledger.merge_pending();
        assert_eq!(ledger.available(0), 4);
        assert!(ledger.is_conserved());
    }

    #[test]
    fn test_immediate_release_credits_available_at_once() {
        let mut ledger = ledger();
        ledger.reserve(TaskId::new(2), 1, 2);
        ledger.release_immediate(TaskId::new(2), 1, 2);

        assert_eq!(ledger.available(1), 2);
        assert!(ledger.is_conserved());
    }

    #[test]
    fn test_reclaim_all_is_idempotent() {
        let mut ledger = ledger();
        ledger.reserve(TaskId::new(1), 0, 2);
        ledger.reserve(TaskId::new(1), 1, 1);

        ledger.reclaim_all(TaskId::new(1));
        assert_eq!(ledger.available(0), 4);
        assert_eq!(ledger.available(1), 2);

        ledger.reclaim_all(TaskId::new(1));
        assert_eq!(ledger.available(0), 4);
        assert_eq!(ledger.available(1), 2);
        assert!(ledger.is_conserved());
    }

    #[test]
    fn test_snapshot_does_not_alias_live_state() {
        let mut ledger = ledger();
        let snapshot = ledger.snapshot();

        ledger.reserve(TaskId::new(1), 0, 4);
        assert_eq!(ledger.available(0), 0);
        assert_eq!(snapshot.available(0), 4);
        assert_eq!(snapshot.claim(TaskId::new(1), 0), 0);
    }
}
