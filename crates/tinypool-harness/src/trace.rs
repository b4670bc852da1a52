//! JSON operation traces and their replay.
//!
//! A trace names blocks by caller-chosen handles, since addresses are only
//! known once the allocator hands them out:
//!
//! ```json
//! {
//!   "name": "reuse",
//!   "ops": [
//!     { "op": "allocate", "handle": "a", "size": 24 },
//!     { "op": "deallocate", "handle": "a", "size": 24 },
//!     { "op": "allocate", "handle": "b", "size": 20 }
//!   ]
//! }
//! ```
//!
//! Allocator errors are recorded per step and do not stop the replay; a
//! malformed trace (unknown or reused handle) does.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tinypool_core::{
    AllocError, AllocatorConfig, OomPolicy, PoolAllocator, SimulatedHeap, ValidationMode,
};

use crate::error::HarnessError;
use crate::structured_log::LogRecord;

/// One trace operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TraceOp {
    Allocate {
        handle: String,
        size: usize,
    },
    Deallocate {
        handle: String,
        size: usize,
    },
    Reallocate {
        handle: String,
        old_size: usize,
        new_size: usize,
    },
    /// Makes the simulated heap refuse its next `count` requests.
    FailNext {
        count: usize,
    },
}

/// A trace file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceFile {
    #[serde(default)]
    pub name: String,
    /// Validation mode (`strict` or `hardened`), default strict.
    #[serde(default)]
    pub validation: Option<String>,
    /// Byte capacity of the simulated heap, unbounded if absent.
    #[serde(default)]
    pub heap_capacity: Option<usize>,
    /// Blocks per refill, default 20.
    #[serde(default)]
    pub refill_batch: Option<usize>,
    pub ops: Vec<TraceOp>,
}

impl TraceFile {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, HarnessError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }

    /// Allocator configuration requested by the trace.
    #[must_use]
    pub fn config(&self) -> AllocatorConfig {
        let mut config = AllocatorConfig::default()
            .with_oom_policy(OomPolicy::ReturnError)
            .with_logging();
        if let Some(mode) = &self.validation {
            config = config.with_validation(ValidationMode::from_str_loose(mode));
        }
        if let Some(batch) = self.refill_batch {
            config = config.with_refill_batch(batch);
        }
        config
    }
}

/// Result of one replayed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: usize,
    pub op: TraceOp,
    /// `ok` or `error`.
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Allocator state at the end of a replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSummary {
    pub heap_size: usize,
    pub pool_remainder: usize,
    pub free_list_lens: Vec<usize>,
    pub system_requests: u64,
    pub system_refusals: u64,
}

impl PoolSummary {
    pub(crate) fn capture(pool: &PoolAllocator<SimulatedHeap>) -> Self {
        Self {
            heap_size: pool.heap_size(),
            pool_remainder: pool.pool_remainder(),
            free_list_lens: pool.free_lists().lens().to_vec(),
            system_requests: pool.system().requests(),
            system_refusals: pool.system().refusals(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub name: String,
    pub steps: Vec<StepResult>,
    pub summary: PoolSummary,
    #[serde(skip)]
    pub logs: Vec<LogRecord>,
}

impl ReplayReport {
    /// Number of steps that ended in an allocator error.
    #[must_use]
    pub fn errors(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome == "error").count()
    }
}

/// Replays `trace` on a fresh allocator over a [`SimulatedHeap`].
///
/// Free-list invariants are checked after every step.
pub fn replay(trace: &TraceFile) -> Result<ReplayReport, HarnessError> {
    let heap = match trace.heap_capacity {
        Some(cap) => SimulatedHeap::with_capacity(cap),
        None => SimulatedHeap::new(),
    };
    let mut pool = PoolAllocator::with_config(heap, trace.config());
    let mut handles: HashMap<&str, usize> = HashMap::new();
    let mut steps = Vec::with_capacity(trace.ops.len());

    for (step, op) in trace.ops.iter().enumerate() {
        let result = match op {
            TraceOp::Allocate { handle, size } => {
                if handles.contains_key(handle.as_str()) {
                    return Err(HarnessError::DuplicateHandle {
                        step,
                        handle: handle.clone(),
                    });
                }
                pool.allocate(*size).inspect(|&addr| {
                    handles.insert(handle.as_str(), addr);
                })
            }
            TraceOp::Deallocate { handle, size } => {
                let addr = lookup(&handles, step, handle)?;
                pool.deallocate(addr, *size).map(|()| {
                    handles.remove(handle.as_str());
                    addr
                })
            }
            TraceOp::Reallocate {
                handle,
                old_size,
                new_size,
            } => {
                let addr = lookup(&handles, step, handle)?;
                let result = pool.reallocate(addr, *old_size, *new_size);
                match result {
                    Ok(new_addr) => {
                        handles.insert(handle.as_str(), new_addr);
                    }
                    // The old block was released before the failed allocation.
                    Err(AllocError::OutOfMemory { .. }) => {
                        handles.remove(handle.as_str());
                    }
                    Err(_) => {}
                }
                result
            }
            TraceOp::FailNext { count } => {
                pool.system_mut().fail_next(*count);
                Ok(0)
            }
        };

        steps.push(match result {
            Ok(addr) => StepResult {
                step,
                op: op.clone(),
                outcome: "ok".to_string(),
                addr: (addr != 0).then(|| format!("{addr:#x}")),
                error: None,
            },
            Err(err) => StepResult {
                step,
                op: op.clone(),
                outcome: "error".to_string(),
                addr: None,
                error: Some(err.to_string()),
            },
        });

        pool.verify()
            .map_err(|violation| HarnessError::Invariant { step, violation })?;
    }

    Ok(ReplayReport {
        name: trace.name.clone(),
        steps,
        summary: PoolSummary::capture(&pool),
        logs: pool.lifecycle_logs().map(LogRecord::from).collect(),
    })
}

fn lookup(handles: &HashMap<&str, usize>, step: usize, handle: &str) -> Result<usize, HarnessError> {
    handles
        .get(handle)
        .copied()
        .ok_or_else(|| HarnessError::UnknownHandle {
            step,
            handle: handle.to_string(),
        })
}
