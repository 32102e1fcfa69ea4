//! Integration tests for Ration
//!
//! These tests run complete traces through both scheduling policies and
//! verify the end-to-end contracts: per-task outcomes, diagnostics,
//! determinism, and the properties generated scenarios must uphold.

#[path = "integration/scenario_traces.rs"]
mod scenario_traces;

#[path = "integration/properties.rs"]
mod properties;
