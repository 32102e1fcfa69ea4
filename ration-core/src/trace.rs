//! Trace files: the external input format for simulation runs.
//!
//! A trace is plain text, whitespace separated. The first significant line
//! is a header, `<task-count> <resource-count> <units...>`, with one unit
//! figure per resource type. Every following line is one activity,
//! `<kind> <task-id> <delay> <resource-id> <amount>`, with 1-based task and
//! resource ids. Blank lines and `#` comments are skipped. Example:
//!
//! ```text
//! # two tasks sharing one resource of 3 units
//! 2 1 3
//! initiate  1 0 1 2
//! initiate  2 0 1 2
//! request   1 0 1 2
//! request   2 0 1 2
//! release   1 0 1 2
//! release   2 0 1 2
//! terminate 1 0 0 0
//! terminate 2 0 0 0
//! ```
//!
//! Malformed input is a fatal [`TraceError`] here in the loader; the
//! simulation core never sees it.

use std::path::Path;
use std::str::FromStr;

use crate::sim::{Activity, ActivityKind, Task, TaskId};

/// Errors raised while loading a trace.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// The trace file could not be read.
    #[error("failed to read trace: {0}")]
    Io(#[from] std::io::Error),

    /// The trace text is malformed.
    #[error("trace parse error at line {line}: {reason}")]
    Parse {
        /// 1-based line number of the offending line.
        line: usize,
        /// What went wrong.
        reason: String,
    },
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiate" => Ok(ActivityKind::Initiate),
            "request" => Ok(ActivityKind::Request),
            "release" => Ok(ActivityKind::Release),
            "terminate" => Ok(ActivityKind::Terminate),
            _ => Err(format!("unknown activity kind '{s}'")),
        }
    }
}

/// A parsed trace: resource capacities plus per-task activity scripts.
///
/// Parsing happens once; the trace can then be instantiated into fresh
/// task state any number of times, so several runs (or policies) never
/// share mutable state.
#[derive(Debug, Clone)]
pub struct Trace {
    capacities: Vec<u32>,
    task_count: usize,
    entries: Vec<(TaskId, Activity)>,
}

impl Trace {
    /// Reads and parses a trace file.
    ///
    /// # Errors
    /// - `TraceError::Io` - File could not be read
    /// - `TraceError::Parse` - Malformed trace text
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parses trace text.
    ///
    /// # Errors
    /// - `TraceError::Parse` - Malformed header or activity line
    pub fn parse(input: &str) -> Result<Self, TraceError> {
        let mut lines = significant_lines(input);

        let (line, header) = lines
            .next()
            .ok_or_else(|| parse_error(1, "empty trace: missing header line"))?;
        let fields = parse_numbers(line, header)?;
        if fields.len() < 2 {
            return Err(parse_error(
                line,
                "header needs at least task and resource counts",
            ));
        }
        let task_count = fields[0] as usize;
        let resource_count = fields[1] as usize;
        let capacities: Vec<u32> = fields[2..].to_vec();
        if capacities.len() != resource_count {
            return Err(parse_error(
                line,
                format!(
                    "header declares {resource_count} resources but lists {} unit figures",
                    capacities.len()
                ),
            ));
        }

        let mut entries = Vec::new();
        for (line, text) in lines {
            entries.push(parse_activity(line, text, task_count, resource_count)?);
        }

        Ok(Self {
            capacities,
            task_count,
            entries,
        })
    }

    /// Resource capacity vector, one entry per resource type.
    pub fn capacities(&self) -> &[u32] {
        &self.capacities
    }

    /// Number of tasks the header declares.
    pub fn task_count(&self) -> usize {
        self.task_count
    }

    /// Builds fresh task state for one run. Tasks appear in id order.
    pub fn instantiate(&self) -> Vec<Task> {
        let resource_count = self.capacities.len();
        let mut tasks: Vec<Task> = (1..=self.task_count)
            .map(|id| Task::new(TaskId::new(id as u32), resource_count))
            .collect();

        for (id, activity) in &self.entries {
            tasks[(id.as_u32() - 1) as usize].push_activity(activity.clone());
        }

        tasks
    }
}

/// Lines that carry content, with their 1-based line numbers. Blank lines
/// and `#` comments are skipped; trailing comments are stripped.
fn significant_lines(input: &str) -> impl Iterator<Item = (usize, &str)> {
    input.lines().enumerate().filter_map(|(index, raw)| {
        let text = raw.split('#').next().unwrap_or("").trim();
        (!text.is_empty()).then_some((index + 1, text))
    })
}

fn parse_activity(
    line: usize,
    text: &str,
    task_count: usize,
    resource_count: usize,
) -> Result<(TaskId, Activity), TraceError> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    let [kind, task, delay, resource, amount] = fields[..] else {
        return Err(parse_error(
            line,
            format!(
                "expected 'kind task delay resource amount', got {} fields",
                fields.len()
            ),
        ));
    };

    let kind: ActivityKind = kind
        .parse()
        .map_err(|reason: String| parse_error(line, reason))?;
    let task = parse_number(line, task)?;
    let delay = parse_number(line, delay)?;
    let resource = parse_number(line, resource)? as usize;
    let amount = parse_number(line, amount)?;

    if task == 0 || task as usize > task_count {
        return Err(parse_error(
            line,
            format!("task id {task} outside 1..={task_count}"),
        ));
    }

    // Terminate lines conventionally carry zeros for resource and amount;
    // both fields are ignored for that kind.
    let activity = if kind == ActivityKind::Terminate {
        Activity::new(kind, 0, 0, delay)
    } else {
        if resource == 0 || resource > resource_count {
            return Err(parse_error(
                line,
                format!("resource id {resource} outside 1..={resource_count}"),
            ));
        }
        Activity::new(kind, resource - 1, amount, delay)
    };

    Ok((TaskId::new(task), activity))
}

fn parse_numbers(line: usize, text: &str) -> Result<Vec<u32>, TraceError> {
    text.split_whitespace()
        .map(|field| parse_number(line, field))
        .collect()
}

fn parse_number(line: usize, field: &str) -> Result<u32, TraceError> {
    field
        .parse()
        .map_err(|_| parse_error(line, format!("expected a number, got '{field}'")))
}

fn parse_error(line: usize, reason: impl Into<String>) -> TraceError {
    TraceError::Parse {
        line,
        reason: reason.into(),
    }
}
