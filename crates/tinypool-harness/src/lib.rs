//! Verification tooling for the tinypool allocator.
//!
//! This crate provides:
//! - Trace replay: run a JSON list of operations against a simulated heap
//! - Stress: deterministic randomized workloads with invariant checks
//! - Scenarios: named end-to-end checks of the allocator's observable policy
//! - Structured logging: lifecycle records as JSONL

#![forbid(unsafe_code)]

pub mod error;
pub mod scenarios;
pub mod stress;
pub mod structured_log;
pub mod trace;

pub use error::HarnessError;
pub use scenarios::{SCENARIOS, ScenarioReport, run_scenario};
pub use stress::{StressConfig, StressSummary, run_stress};
pub use structured_log::{LogEmitter, LogRecord};
pub use trace::{ReplayReport, TraceFile, TraceOp, replay};
