//! Core allocator state.
//!
//! [`PoolAllocator`] owns the free-list table, the pool cursors and the
//! system allocator, and implements the allocate / deallocate / reallocate
//! API on top of them. Small requests are popped from a free list, refilling
//! it from the pool when empty; the pool grows from the system allocator and,
//! when that fails, scavenges free blocks of larger classes.

use std::collections::HashMap;

use crate::config::{AllocatorConfig, OomPolicy};
use crate::error::{AllocError, FreeViolation, InvariantViolation};
use crate::free_list::FreeListTable;
use crate::log::{Event, LifecycleLog, LifecycleRecord, LogLevel, Snapshot};
use crate::pool::Pool;
use crate::size_class::{
    self, MAX_SMALL_SIZE, NUM_SIZE_CLASSES, classes_from, freelist_index, round_up,
};
use crate::system::SystemAllocator;

/// Class recorded for live delegated (large) blocks.
const DELEGATED: usize = NUM_SIZE_CLASSES;

/// Two-tier pooled allocator.
///
/// All state is per instance; independent allocators never share blocks.
/// Operations take `&mut self`: wrap the allocator in a lock to share it
/// between threads.
pub struct PoolAllocator<S: SystemAllocator> {
    system: S,
    free_lists: FreeListTable,
    pool: Pool,
    /// Live block -> class index (`DELEGATED` for large). Hardened mode only.
    live: HashMap<usize, usize>,
    config: AllocatorConfig,
    log: LifecycleLog,
}

impl<S: SystemAllocator> PoolAllocator<S> {
    /// Creates an allocator with the default configuration.
    pub fn new(system: S) -> Self {
        Self::with_config(system, AllocatorConfig::default())
    }

    /// Creates an allocator with an explicit configuration.
    pub fn with_config(system: S, config: AllocatorConfig) -> Self {
        let config = config.normalized();
        Self {
            system,
            free_lists: FreeListTable::new(),
            pool: Pool::new(),
            live: HashMap::new(),
            log: LifecycleLog::new(config.log_capacity),
            config,
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            heap_size: self.pool.heap_size(),
            pool_remainder: self.pool.remainder(),
            free_blocks: self.free_lists.total_free(),
        }
    }

    fn record(&mut self, event: Event<'_>) {
        if self.log.enabled() {
            let snapshot = self.snapshot();
            self.log.record(event, snapshot);
        }
    }

    /// Records `event` with details that are only formatted when logging
    /// is on, so the disabled path never touches the system heap.
    fn record_with(&mut self, event: Event<'_>, details: impl FnOnce() -> String) {
        if self.log.enabled() {
            let details = details();
            let snapshot = self.snapshot();
            self.log.record(event.details(&details), snapshot);
        }
    }

    /// Allocates `n` bytes.
    ///
    /// Requests up to 128 bytes are served from the pool, rounded up to a
    /// multiple of 8; larger ones go straight to the system allocator.
    pub fn allocate(&mut self, n: usize) -> Result<usize, AllocError> {
        self.allocate_as("allocate", n)
    }

    fn allocate_as(&mut self, symbol: &'static str, n: usize) -> Result<usize, AllocError> {
        if n == 0 {
            self.record(Event::new(LogLevel::Warn, symbol, "alloc", "denied").details("zero_size"));
            return Err(AllocError::ZeroSizedRequest);
        }

        if !size_class::is_small(n) {
            let Some(addr) = self.system.allocate(n) else {
                return Err(self.out_of_memory(symbol, n, "path=system"));
            };
            self.track_live(addr, DELEGATED);
            self.record(
                Event::new(LogLevel::Trace, symbol, "alloc", "success")
                    .addr(addr)
                    .size(n)
                    .details("path=system"),
            );
            return Ok(addr);
        }

        let index = freelist_index(n);
        if let Some(addr) = self.free_lists.slot(index).pop() {
            self.track_live(addr, index);
            self.record(
                Event::new(LogLevel::Trace, symbol, "alloc", "success")
                    .addr(addr)
                    .size(n)
                    .class(index)
                    .details("path=free_list"),
            );
            return Ok(addr);
        }

        let addr = self.refill(symbol, round_up(n)).map_err(|err| match err {
            AllocError::OutOfMemory { .. } => AllocError::OutOfMemory { requested: n },
            other => other,
        })?;
        self.track_live(addr, index);
        self.record(
            Event::new(LogLevel::Trace, symbol, "alloc", "success")
                .addr(addr)
                .size(n)
                .class(index)
                .details("path=refill"),
        );
        Ok(addr)
    }

    /// Returns the block at `addr`, allocated with `n` bytes, to the allocator.
    ///
    /// `n` may be any size in the same class as the original request.
    /// Blocks of up to 128 bytes go back on their free list; larger ones are
    /// released to the system allocator.
    pub fn deallocate(&mut self, addr: usize, n: usize) -> Result<(), AllocError> {
        self.deallocate_as("deallocate", addr, n)
    }

    fn deallocate_as(
        &mut self,
        symbol: &'static str,
        addr: usize,
        n: usize,
    ) -> Result<(), AllocError> {
        if n == 0 {
            self.record(
                Event::new(LogLevel::Warn, symbol, "free", "denied")
                    .addr(addr)
                    .details("zero_size"),
            );
            return Err(AllocError::ZeroSizedRequest);
        }
        let class = if size_class::is_small(n) {
            freelist_index(n)
        } else {
            DELEGATED
        };

        if let Err(reason) = self.check_free(addr, class) {
            return Err(self.invalid_free(symbol, addr, n, reason));
        }

        if class == DELEGATED {
            self.system.deallocate(addr, n);
            self.record(
                Event::new(LogLevel::Trace, symbol, "free", "success")
                    .addr(addr)
                    .size(n)
                    .details("path=system"),
            );
            return Ok(());
        }

        if !self.free_lists.slot(class).push(addr) {
            return Err(self.invalid_free(symbol, addr, n, FreeViolation::DoubleFree));
        }
        self.record(
            Event::new(LogLevel::Trace, symbol, "free", "success")
                .addr(addr)
                .size(n)
                .class(class)
                .details("path=free_list"),
        );
        Ok(())
    }

    /// Frees `addr` under `old_size`, then allocates `new_size`.
    ///
    /// No bytes are copied: this layer only moves addresses around. Callers
    /// that need the contents preserved copy them first, or use the ABI
    /// layer's reallocate, which does.
    pub fn reallocate(
        &mut self,
        addr: usize,
        old_size: usize,
        new_size: usize,
    ) -> Result<usize, AllocError> {
        self.deallocate_as("reallocate", addr, old_size)?;
        let new_addr = self.allocate_as("reallocate", new_size)?;
        self.record_with(
            Event::new(LogLevel::Trace, "reallocate", "realloc", "success")
                .addr(new_addr)
                .size(new_size),
            || format!("old_addr={addr:#x} old_size={old_size}"),
        );
        Ok(new_addr)
    }

    /// Refills the free list for class size `n` and returns one block.
    ///
    /// Asks the pool for a batch; the first block goes to the caller and the
    /// rest are threaded onto the list. A batch of one leaves the list empty.
    fn refill(&mut self, symbol: &'static str, n: usize) -> Result<usize, AllocError> {
        debug_assert!(n > 0 && n <= MAX_SMALL_SIZE && n % size_class::ALIGN == 0);
        let mut nobj = self.config.refill_batch;
        let start = self.chunk_alloc(symbol, n, &mut nobj)?;
        let index = freelist_index(n);
        if nobj > 1 {
            self.free_lists.slot(index).push_chain(start + n, nobj - 1);
        }
        self.record_with(
            Event::new(LogLevel::Debug, symbol, "refill", "success")
                .addr(start)
                .size(n)
                .class(index),
            || format!("granted={nobj} listed={}", nobj - 1),
        );
        Ok(start)
    }

    /// Carves up to `*nobj` blocks of `size` bytes from the pool.
    ///
    /// Lowers `*nobj` to the number actually granted. When the pool cannot
    /// supply even one block, its leftover bytes are donated to the matching
    /// free list and the pool is replenished, first from the system
    /// allocator and then by scavenging a free block of the same or a larger
    /// class, before trying again.
    fn chunk_alloc(
        &mut self,
        symbol: &'static str,
        size: usize,
        nobj: &mut usize,
    ) -> Result<usize, AllocError> {
        for _ in 0..self.config.max_chunk_retries {
            let requested = *nobj;
            if let Some(start) = self.pool.carve(size, nobj) {
                let outcome = if *nobj == requested { "full" } else { "partial" };
                let granted = *nobj;
                self.record_with(
                    Event::new(LogLevel::Trace, symbol, "chunk_carve", outcome)
                        .addr(start)
                        .size(size)
                        .class(freelist_index(size)),
                    || format!("requested={requested} granted={granted}"),
                );
                return Ok(start);
            }

            self.donate_remainder(symbol);

            let growth = size
                .checked_mul(*nobj)
                .and_then(|need| self.pool.growth_request(need));
            let grown = growth.and_then(|bytes| self.system.allocate(bytes).map(|base| (base, bytes)));
            match grown {
                Some((base, bytes)) => {
                    self.pool.install_growth(base, bytes);
                    self.record_with(
                        Event::new(LogLevel::Info, symbol, "pool_grow", "success")
                            .addr(base)
                            .size(bytes),
                        || format!("bytes_to_get={bytes}"),
                    );
                }
                None => {
                    self.record_with(
                        Event::new(LogLevel::Warn, symbol, "pool_grow", "refused").size(size),
                        || match growth {
                            Some(bytes) => format!("bytes_to_get={bytes}"),
                            None => "bytes_to_get=overflow".to_owned(),
                        },
                    );
                    if !self.scavenge(symbol, size) {
                        return Err(self.out_of_memory(symbol, size, "path=pool"));
                    }
                }
            }
        }
        Err(self.out_of_memory(symbol, size, "retries_exhausted"))
    }

    /// Moves the pool's leftover bytes onto the free list of their size.
    fn donate_remainder(&mut self, symbol: &'static str) {
        let Some(region) = self.pool.take_remainder() else {
            return;
        };
        // Every carve and every pool span is a multiple of 8, and the
        // leftover is smaller than the class that failed to fit.
        debug_assert!(region.len % size_class::ALIGN == 0 && region.len < MAX_SMALL_SIZE);
        let index = freelist_index(region.len);
        let pushed = self.free_lists.slot(index).push(region.base);
        debug_assert!(pushed, "pool remainder {:#x} already on a free list", region.base);
        self.record(
            Event::new(LogLevel::Debug, symbol, "remainder_donated", "success")
                .addr(region.base)
                .size(region.len)
                .class(index),
        );
    }

    /// Turns the first free block of class size `size` or larger into the
    /// pool. Returns false if every candidate list is empty.
    fn scavenge(&mut self, symbol: &'static str, size: usize) -> bool {
        for class_bytes in classes_from(size) {
            let index = freelist_index(class_bytes);
            if let Some(addr) = self.free_lists.slot(index).pop() {
                self.pool.adopt_block(addr, class_bytes);
                self.record(
                    Event::new(LogLevel::Info, symbol, "scavenge", "success")
                        .addr(addr)
                        .size(class_bytes)
                        .class(index),
                );
                return true;
            }
        }
        false
    }

    fn out_of_memory(
        &mut self,
        symbol: &'static str,
        requested: usize,
        details: &str,
    ) -> AllocError {
        self.record(
            Event::new(LogLevel::Error, symbol, "oom", "failed")
                .size(requested)
                .details(details),
        );
        if self.config.oom_policy == OomPolicy::Abort {
            eprintln!("tinypool: out of memory ({requested} bytes requested)");
            std::process::abort();
        }
        AllocError::OutOfMemory { requested }
    }

    fn invalid_free(
        &mut self,
        symbol: &'static str,
        addr: usize,
        size: usize,
        reason: FreeViolation,
    ) -> AllocError {
        self.record_with(
            Event::new(LogLevel::Warn, symbol, "invalid_free", "rejected")
                .addr(addr)
                .size(size),
            || reason.to_string(),
        );
        AllocError::InvalidFree { addr, size, reason }
    }

    fn track_live(&mut self, addr: usize, class: usize) {
        if self.config.validation.tracks_live_blocks() {
            self.live.insert(addr, class);
        }
    }

    /// Validates a deallocation and, in hardened mode, retires the live entry.
    fn check_free(&mut self, addr: usize, class: usize) -> Result<(), FreeViolation> {
        if addr == 0 {
            return Err(FreeViolation::NullPointer);
        }
        if !self.config.validation.tracks_live_blocks() {
            return Ok(());
        }
        match self.live.get(&addr).copied() {
            Some(allocated) if allocated == class => {
                self.live.remove(&addr);
                Ok(())
            }
            Some(allocated) => Err(FreeViolation::SizeClassMismatch {
                allocated,
                requested: class,
            }),
            None if self.free_lists.free_class_of(addr).is_some() => {
                Err(FreeViolation::DoubleFree)
            }
            None => Err(FreeViolation::UnknownPointer),
        }
    }

    /// Cumulative bytes requested from the system allocator for pool growth.
    #[must_use]
    pub fn heap_size(&self) -> usize {
        self.pool.heap_size()
    }

    /// Unused pool bytes.
    #[must_use]
    pub fn pool_remainder(&self) -> usize {
        self.pool.remainder()
    }

    /// Pool cursors and growth history.
    #[must_use]
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Read-only view of the free-list table.
    #[must_use]
    pub fn free_lists(&self) -> &FreeListTable {
        &self.free_lists
    }

    /// Number of free blocks on list `index`.
    #[must_use]
    pub fn free_list_len(&self, index: usize) -> usize {
        self.free_lists.len(index)
    }

    /// Blocks currently handed out, as tracked in hardened mode.
    ///
    /// Always 0 in strict mode.
    #[must_use]
    pub fn tracked_live_blocks(&self) -> usize {
        self.live.len()
    }

    #[must_use]
    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// The system allocator backing this pool.
    #[must_use]
    pub fn system(&self) -> &S {
        &self.system
    }

    /// Mutable access to the system allocator (for failure injection).
    pub fn system_mut(&mut self) -> &mut S {
        &mut self.system
    }

    /// Retained lifecycle records, oldest first.
    pub fn lifecycle_logs(&self) -> impl ExactSizeIterator<Item = &LifecycleRecord> {
        self.log.records()
    }

    /// Drains retained lifecycle records.
    pub fn drain_lifecycle_logs(&mut self) -> Vec<LifecycleRecord> {
        self.log.drain()
    }

    /// Checks pool and free-list invariants.
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        self.pool.verify()?;
        self.free_lists.verify()
    }
}

impl<S: SystemAllocator + Default> Default for PoolAllocator<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S: SystemAllocator> Drop for PoolAllocator<S> {
    fn drop(&mut self) {
        for region in self.pool.take_regions() {
            self.system.deallocate(region.base, region.len);
        }
    }
}
