// All extern "C" exports accept raw pointers from C callers.
#![allow(clippy::missing_safety_doc)]
//! # tinypool-abi
//!
//! Binds the safe `tinypool-core` allocator to real memory.
//!
//! ```text
//! C caller -> tinypool_* entry (this crate) -> global PoolAllocator<LibcHeap> -> libc
//! ```
//!
//! The core only moves addresses around; this crate supplies a
//! [`LibcHeap`] system allocator backed by `malloc`/`free`, a lazily created
//! process-wide instance behind a single lock, and the `extern "C"` entry
//! points that copy bytes where the core cannot.

pub mod global;
pub mod libc_heap;
pub mod pool_abi;

pub use global::{ENV_LOG_CAPACITY, ENV_OOM, ENV_VALIDATION, config_from_env, with_global_pool};
pub use libc_heap::LibcHeap;
pub use pool_abi::{tinypool_allocate, tinypool_deallocate, tinypool_reallocate};
