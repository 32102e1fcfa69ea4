//! Seeded random scenario generation for stress and property testing.
//!
//! The simulation engine itself is RNG-free; randomness only ever enters
//! through this module, and always behind a fixed seed, so any generated
//! trace can be reproduced exactly from its parameters.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::sim::{Activity, ActivityKind, Task, TaskId};

/// Seeded RNG behind the scenario generator.
///
/// ChaCha8 keyed from a single `u64`, so a generated trace is fully
/// identified by its seed plus the generation parameters. Nothing else in
/// the crate draws random numbers.
#[derive(Debug)]
pub struct DeterministicRng {
    rng: ChaCha8Rng,
    seed: u64,
}

impl DeterministicRng {
    /// Creates an RNG keyed from `seed`.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// The seed this RNG was keyed from, for recording in reports or logs.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Draws a value in `[min, max)`; an empty range yields `min`.
    pub fn random_range(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        min + (self.rng.next_u64() % (max - min))
    }

    /// Draws `true` with the given probability.
    pub fn random_bool(&mut self, probability: f64) -> bool {
        (self.rng.next_u64() as f64 / u64::MAX as f64) < probability
    }
}

/// Parameters for one generated scenario.
#[derive(Debug, Clone)]
pub struct ScenarioParams {
    /// Seed for reproduction.
    pub seed: u64,
    /// Number of tasks to script.
    pub task_count: u32,
    /// Number of resource types.
    pub resource_count: usize,
    /// Units per resource type, drawn from this inclusive range.
    pub units: (u32, u32),
    /// Request/release rounds per task, drawn from this inclusive range.
    pub rounds: (u32, u32),
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            seed: 42,
            task_count: 5,
            resource_count: 2,
            units: (2, 6),
            rounds: (1, 3),
        }
    }
}

/// A generated task set plus its capacity vector, ready to hand to either
/// scheduler. Regenerate (same params) for a fresh, independent copy.
#[derive(Debug, Clone)]
pub struct GeneratedScenario {
    /// Resource capacity vector.
    pub capacities: Vec<u32>,
    /// Scripted tasks, ids 1..=task_count.
    pub tasks: Vec<Task>,
}

impl GeneratedScenario {
    /// Renders the scenario in the trace file format, suitable for saving
    /// and re-running through [`crate::trace::Trace::parse`].
    pub fn to_trace_text(&self) -> String {
        let mut out = format!("{} {}", self.tasks.len(), self.capacities.len());
        for units in &self.capacities {
            out.push_str(&format!(" {units}"));
        }
        out.push('\n');

        for task in &self.tasks {
            for activity in task.activities() {
                let resource = match activity.kind {
                    ActivityKind::Terminate => 0,
                    _ => activity.resource + 1,
                };
                out.push_str(&format!(
                    "{} {} {} {} {}\n",
                    activity.kind, task.id, activity.delay, resource, activity.amount
                ));
            }
        }

        out
    }
}

/// Generates a well-formed scenario from a seed.
///
/// Every task declares a claim for each resource no larger than the units
/// present, and its requests never exceed that claim, so avoidance mode
/// aborts nothing: the scenario exercises blocking and recovery behavior,
/// not the violation paths. The same parameters always produce the same
/// scenario.
pub fn generate(params: &ScenarioParams) -> GeneratedScenario {
    let mut rng = DeterministicRng::from_seed(params.seed);
    let (min_units, max_units) = params.units;
    let (min_rounds, max_rounds) = params.rounds;

    let capacities: Vec<u32> = (0..params.resource_count)
        .map(|_| rng.random_range(u64::from(min_units), u64::from(max_units) + 1) as u32)
        .collect();

    let tasks = (1..=params.task_count)
        .map(|id| {
            let mut task = Task::new(TaskId::new(id), params.resource_count);

            // Declared claims, one initiate per resource.
            let claims: Vec<u32> = capacities
                .iter()
                .map(|&units| rng.random_range(1, u64::from(units) + 1) as u32)
                .collect();
            for (resource, &claim) in claims.iter().enumerate() {
                task.push_activity(Activity::new(ActivityKind::Initiate, resource, claim, 0));
            }

            // Request/release rounds; each round returns everything it
            // took, so cumulative holdings never exceed the claim.
            let rounds = rng.random_range(u64::from(min_rounds), u64::from(max_rounds) + 1);
            for _ in 0..rounds {
                let resource = rng.random_range(0, params.resource_count as u64) as usize;
                let amount = rng.random_range(1, u64::from(claims[resource]) + 1) as u32;
                let delay = rng.random_range(0, 3) as u32;
                task.push_activity(Activity::new(ActivityKind::Request, resource, amount, delay));

                let release_delay = if rng.random_bool(0.5) { 1 } else { 0 };
                task.push_activity(Activity::new(
                    ActivityKind::Release,
                    resource,
                    amount,
                    release_delay,
                ));
            }

            task.push_activity(Activity::new(ActivityKind::Terminate, 0, 0, 0));
            task
        })
        .collect();

    GeneratedScenario { capacities, tasks }
}
