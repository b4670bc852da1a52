//! Harness error type.

use thiserror::Error;
use tinypool_core::{AllocError, InvariantViolation};

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("allocator: {0}")]
    Alloc(#[from] AllocError),
    #[error("invariant violated after step {step}: {violation}")]
    Invariant {
        step: usize,
        #[source]
        violation: InvariantViolation,
    },
    #[error("step {step}: block {addr:#x} {reason}")]
    LiveBlock {
        step: usize,
        addr: usize,
        reason: &'static str,
    },
    #[error("trace step {step}: unknown block handle `{handle}`")]
    UnknownHandle { step: usize, handle: String },
    #[error("trace step {step}: block handle `{handle}` is already live")]
    DuplicateHandle { step: usize, handle: String },
    #[error("unknown scenario `{0}`")]
    UnknownScenario(String),
}
