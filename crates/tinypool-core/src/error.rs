//! Allocator error types.

use thiserror::Error;

/// Why a deallocation was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FreeViolation {
    /// Address was null (0).
    #[error("null pointer")]
    NullPointer,
    /// Block is already on a free list.
    #[error("double free")]
    DoubleFree,
    /// Block was handed out under a different size class.
    #[error("size class mismatch (allocated class {allocated}, freed as class {requested})")]
    SizeClassMismatch {
        /// Class index recorded at allocation time.
        allocated: usize,
        /// Class index implied by the size passed to deallocate.
        requested: usize,
    },
    /// Address was never handed out by this allocator (hardened mode only).
    #[error("pointer not owned by this allocator")]
    UnknownPointer,
}

/// Errors surfaced by the public allocation API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The system allocator refused the request and no free block could be
    /// scavenged to satisfy it.
    #[error("out of memory: {requested} bytes requested")]
    OutOfMemory {
        /// Size of the caller's request.
        requested: usize,
    },
    /// A deallocation broke the caller contract.
    #[error("invalid free of {addr:#x} ({size} bytes): {reason}")]
    InvalidFree {
        addr: usize,
        size: usize,
        reason: FreeViolation,
    },
    /// `allocate(0)`; every request must ask for at least one byte.
    #[error("zero-sized allocation request")]
    ZeroSizedRequest,
}

/// Structural corruption found while walking the free-list table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("free list {class} reaches {addr:#x} which has no link")]
    DanglingNode { class: usize, addr: usize },
    #[error("block {addr:#x} on list {expected} is tagged with class {found}")]
    WrongClass {
        addr: usize,
        expected: usize,
        found: usize,
    },
    #[error("free block {addr:#x} is not 8-byte aligned")]
    Misaligned { addr: usize },
    #[error("free list {class} contains a cycle")]
    Cycle { class: usize },
    #[error("{stored} links stored but only {reachable} reachable from list heads")]
    UnreachableLinks { reachable: usize, stored: usize },
    #[error("pool cursors inverted: start_free={start:#x} end_free={end:#x}")]
    PoolCursorsInverted { start: usize, end: usize },
}
