//! # tinypool-core
//!
//! A two-tier, fixed-policy pool allocator.
//!
//! Requests of up to 128 bytes are rounded up to a multiple of 8 and served
//! from one of 16 per-size-class free lists. Empty lists are refilled in
//! batches carved from a pool that grows from the system allocator; larger
//! requests go to the system allocator directly.
//!
//! This crate is the safe layer: it manages addresses and policy and never
//! dereferences memory. The `tinypool-abi` crate binds it to real memory.
//!
//! ```
//! use tinypool_core::{PoolAllocator, SimulatedHeap};
//!
//! let mut pool = PoolAllocator::new(SimulatedHeap::new());
//! let p = pool.allocate(24).unwrap();
//! pool.deallocate(p, 24).unwrap();
//! assert_eq!(pool.allocate(20).unwrap(), p);
//! ```

#![deny(unsafe_code)]

pub mod allocator;
pub mod config;
pub mod error;
pub mod free_list;
pub mod log;
pub mod pool;
pub mod size_class;
pub mod system;

pub use allocator::PoolAllocator;
pub use config::{AllocatorConfig, DEFAULT_LOG_CAPACITY, OomPolicy, ValidationMode};
pub use error::{AllocError, FreeViolation, InvariantViolation};
pub use free_list::{FreeListSlot, FreeListTable};
pub use log::{LifecycleRecord, LogLevel};
pub use pool::{Pool, Region};
pub use size_class::{
    ALIGN, MAX_SMALL_SIZE, NUM_SIZE_CLASSES, class_size, freelist_index, round_up,
};
pub use system::{SimulatedHeap, SystemAllocator};
