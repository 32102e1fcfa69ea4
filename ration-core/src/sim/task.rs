//! Task model: activity sequences and per-task bookkeeping.
//!
//! A task is a scripted sequence of activities consumed strictly front to
//! back. The scheduler that owns a task mutates it each cycle; once a task
//! terminates or is aborted it moves to the finished collection and is
//! never revived.

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

/// Identifier of a task within one simulation run.
///
/// Task IDs are unique, 1-based as written in trace files, and totally
/// ordered. The ordering doubles as the tie-break key during deadlock
/// recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TaskId(pub u32);

impl TaskId {
    /// Creates a TaskId from its 1-based numeric value.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the underlying numeric id.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four activity kinds a task can script.
///
/// A closed enum rather than free-form strings: a trace line with any other
/// kind fails at parse time, not mid-simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActivityKind {
    /// Declare the maximum claim for one resource.
    Initiate,
    /// Ask for units of one resource.
    Request,
    /// Give back previously granted units.
    Release,
    /// End the task.
    Terminate,
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityKind::Initiate => write!(f, "initiate"),
            ActivityKind::Request => write!(f, "request"),
            ActivityKind::Release => write!(f, "release"),
            ActivityKind::Terminate => write!(f, "terminate"),
        }
    }
}

/// One scripted step of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Activity {
    /// What the step does.
    pub kind: ActivityKind,
    /// Zero-based resource index the step refers to.
    pub resource: usize,
    /// Unit count: claimed (initiate), requested, or released.
    pub amount: u32,
    /// Cycles to wait before the step is even considered.
    pub delay: u32,
}

impl Activity {
    /// Creates an activity.
    pub fn new(kind: ActivityKind, resource: usize, amount: u32, delay: u32) -> Self {
        Self {
            kind,
            resource,
            amount,
            delay,
        }
    }
}

/// A simulated task: its remaining activity script plus bookkeeping.
#[derive(Debug, Clone)]
pub struct Task {
    /// Unique, totally ordered identifier.
    pub id: TaskId,
    /// Remaining activities, consumed front to back.
    activities: VecDeque<Activity>,
    /// Declared maximum claim per resource (avoidance mode only).
    pub max_claims: Vec<u32>,
    /// Whether the task is currently blocked on a request.
    pub blocked: bool,
    /// Whether the task was aborted rather than terminating normally.
    pub aborted: bool,
    /// Cycles spent blocked.
    pub waiting_time: u32,
    /// Cycle at which the task terminated or was aborted.
    pub total_time: u32,
}

impl Task {
    /// Creates an empty task for a system with `resource_count` resource types.
    pub fn new(id: TaskId, resource_count: usize) -> Self {
        Self {
            id,
            activities: VecDeque::new(),
            max_claims: vec![0; resource_count],
            blocked: false,
            aborted: false,
            waiting_time: 0,
            total_time: 0,
        }
    }

    /// Appends an activity to the end of the script.
    pub fn push_activity(&mut self, activity: Activity) {
        self.activities.push_back(activity);
    }

    /// Returns the head activity without consuming it.
    pub fn peek_activity(&self) -> Option<&Activity> {
        self.activities.front()
    }

    /// Pops and returns the head activity.
    pub fn consume_activity(&mut self) -> Option<Activity> {
        self.activities.pop_front()
    }

    /// Returns how many activities remain.
    pub fn remaining_activities(&self) -> usize {
        self.activities.len()
    }

    /// Iterates the remaining activities front to back without consuming.
    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.activities.iter()
    }

    /// Applies the per-cycle delay rule to the head activity.
    ///
    /// If the head activity still has a positive delay, decrements it and
    /// returns `true`: the task does nothing else this cycle. The activity
    /// kind is only evaluated once this returns `false`.
    pub fn tick_delay(&mut self) -> bool {
        match self.activities.front_mut() {
            Some(activity) if activity.delay > 0 => {
                activity.delay -= 1;
                true
            }
            _ => false,
        }
    }

    /// Maximum additional units of `resource` this task may still request,
    /// given the units it currently holds.
    pub fn max_additional_need(&self, resource: usize, held: u32) -> u32 {
        self.max_claims[resource].saturating_sub(held)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(resource: usize, amount: u32, delay: u32) -> Activity {
        Activity::new(ActivityKind::Request, resource, amount, delay)
    }

    #[test]
    fn test_activities_consumed_front_to_back() {
        let mut task = Task::new(TaskId::new(1), 1);
        task.push_activity(request(0, 1, 0));
        task.push_activity(request(0, 2, 0));

        assert_eq!(task.remaining_activities(), 2);
        assert_eq!(task.peek_activity().unwrap().amount, 1);

        let first = task.consume_activity().unwrap();
        assert_eq!(first.amount, 1);
        assert_eq!(task.peek_activity().unwrap().amount, 2);
        assert_eq!(task.remaining_activities(), 1);
    }

    #[test]
    fn test_delay_counts_down_before_evaluation() {
        let mut task = Task::new(TaskId::new(1), 1);
        task.push_activity(request(0, 1, 2));

        assert!(task.tick_delay());
        assert!(task.tick_delay());
        // Delay exhausted: the activity is now eligible and untouched.
        assert!(!task.tick_delay());
        assert_eq!(task.peek_activity().unwrap().delay, 0);
        assert_eq!(task.remaining_activities(), 1);
    }

    #[test]
    fn test_max_additional_need_saturates() {
        let mut task = Task::new(TaskId::new(3), 2);
        task.max_claims[1] = 4;

        assert_eq!(task.max_additional_need(1, 1), 3);
        assert_eq!(task.max_additional_need(1, 4), 0);
        // Holding more than declared never underflows.
        assert_eq!(task.max_additional_need(1, 9), 0);
        assert_eq!(task.max_additional_need(0, 0), 0);
    }

    #[test]
    fn test_task_ids_are_ordered() {
        assert!(TaskId::new(1) < TaskId::new(2));
        assert_eq!(TaskId::new(7).to_string(), "7");
    }
}
