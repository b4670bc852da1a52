//! The system allocator seam.
//!
//! The pool never talks to the host allocator directly. It goes through
//! [`SystemAllocator`], which hands out raw regions as plain addresses. The
//! ABI crate implements it over libc; this module provides
//! [`SimulatedHeap`], a logical address space used by tests, the harness and
//! fuzzing. It follows the same offset-based model as the rest of the core:
//! addresses are integers and no memory is touched.

use std::collections::HashMap;

/// Host allocator consumed by the pool.
pub trait SystemAllocator {
    /// Allocates `bytes` raw bytes, 8-byte aligned.
    ///
    /// Returns the region's start address, or `None` if the request cannot
    /// be satisfied.
    fn allocate(&mut self, bytes: usize) -> Option<usize>;

    /// Releases a region previously returned by [`allocate`] with the same
    /// `bytes`.
    ///
    /// [`allocate`]: SystemAllocator::allocate
    fn deallocate(&mut self, addr: usize, bytes: usize);
}

impl<S: SystemAllocator + ?Sized> SystemAllocator for &mut S {
    fn allocate(&mut self, bytes: usize) -> Option<usize> {
        (**self).allocate(bytes)
    }

    fn deallocate(&mut self, addr: usize, bytes: usize) {
        (**self).deallocate(addr, bytes);
    }
}

/// Page size used to space simulated regions apart.
const PAGE_SIZE: usize = 4096;

fn page_align(size: usize) -> usize {
    (size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// Logical heap with capacity limits and failure injection.
///
/// Regions are laid out at increasing, page-aligned addresses starting above
/// the zero page and are never reused, so a stale address can never alias a
/// newer region.
#[derive(Debug)]
pub struct SimulatedHeap {
    /// Live regions (base -> length).
    regions: HashMap<usize, usize>,
    /// Next base address handed out.
    next_base: usize,
    /// Bytes currently live.
    live_bytes: usize,
    /// Upper bound on `live_bytes`, if any.
    capacity: Option<usize>,
    /// Number of upcoming requests to refuse unconditionally.
    fail_next: usize,
    /// Refuse every request of at least this many bytes.
    fail_at_least: Option<usize>,
    /// Requests seen (successful or not).
    requests: u64,
    /// Requests refused.
    refusals: u64,
}

impl SimulatedHeap {
    /// Creates an unbounded heap.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regions: HashMap::new(),
            next_base: 0x1000,
            live_bytes: 0,
            capacity: None,
            fail_next: 0,
            fail_at_least: None,
            requests: 0,
            refusals: 0,
        }
    }

    /// Creates a heap that refuses requests once `capacity` bytes are live.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    /// Refuses the next `count` requests regardless of size.
    pub fn fail_next(&mut self, count: usize) {
        self.fail_next = count;
    }

    /// Refuses every request of `bytes` or more until cleared with `None`.
    pub fn fail_requests_at_least(&mut self, bytes: Option<usize>) {
        self.fail_at_least = bytes;
    }

    /// Bytes currently live.
    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    /// Number of live regions.
    #[must_use]
    pub fn live_regions(&self) -> usize {
        self.regions.len()
    }

    /// Returns the length of the live region starting at `addr`.
    #[must_use]
    pub fn region_len(&self, addr: usize) -> Option<usize> {
        self.regions.get(&addr).copied()
    }

    /// Total requests observed.
    #[must_use]
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Requests refused so far.
    #[must_use]
    pub fn refusals(&self) -> u64 {
        self.refusals
    }

    fn refuse(&mut self, bytes: usize) -> bool {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return true;
        }
        if self.fail_at_least.is_some_and(|limit| bytes >= limit) {
            return true;
        }
        match self.capacity {
            Some(cap) => self.live_bytes.saturating_add(bytes) > cap,
            None => false,
        }
    }
}

impl Default for SimulatedHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemAllocator for SimulatedHeap {
    fn allocate(&mut self, bytes: usize) -> Option<usize> {
        self.requests += 1;
        if bytes == 0 || self.refuse(bytes) {
            self.refusals += 1;
            return None;
        }
        let base = self.next_base;
        self.next_base = self.next_base.checked_add(page_align(bytes))?;
        self.regions.insert(base, bytes);
        self.live_bytes += bytes;
        Some(base)
    }

    fn deallocate(&mut self, addr: usize, bytes: usize) {
        if let Some(len) = self.regions.remove(&addr) {
            debug_assert_eq!(len, bytes, "region {addr:#x} released with wrong length");
            self.live_bytes -= len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_are_aligned_and_distinct() {
        let mut heap = SimulatedHeap::new();
        let a = heap.allocate(100).unwrap();
        let b = heap.allocate(5000).unwrap();
        let c = heap.allocate(8).unwrap();
        assert_eq!(a % 8, 0);
        assert!(b >= a + 100);
        assert!(c >= b + 5000);
        assert_eq!(heap.live_bytes(), 5108);
        assert_eq!(heap.live_regions(), 3);
    }

    #[test]
    fn deallocate_releases_bytes() {
        let mut heap = SimulatedHeap::new();
        let a = heap.allocate(64).unwrap();
        heap.deallocate(a, 64);
        assert_eq!(heap.live_bytes(), 0);
        assert_eq!(heap.region_len(a), None);
    }

    #[test]
    fn zero_byte_request_is_refused() {
        let mut heap = SimulatedHeap::new();
        assert!(heap.allocate(0).is_none());
        assert_eq!(heap.refusals(), 1);
    }

    #[test]
    fn capacity_limits_live_bytes() {
        let mut heap = SimulatedHeap::with_capacity(256);
        let a = heap.allocate(200).unwrap();
        assert!(heap.allocate(100).is_none());
        heap.deallocate(a, 200);
        assert!(heap.allocate(100).is_some());
    }

    #[test]
    fn fail_next_refuses_then_recovers() {
        let mut heap = SimulatedHeap::new();
        heap.fail_next(2);
        assert!(heap.allocate(8).is_none());
        assert!(heap.allocate(8).is_none());
        assert!(heap.allocate(8).is_some());
        assert_eq!(heap.requests(), 3);
        assert_eq!(heap.refusals(), 2);
    }

    #[test]
    fn size_threshold_refusal() {
        let mut heap = SimulatedHeap::new();
        heap.fail_requests_at_least(Some(1024));
        assert!(heap.allocate(1023).is_some());
        assert!(heap.allocate(1024).is_none());
        heap.fail_requests_at_least(None);
        assert!(heap.allocate(4096).is_some());
    }
}
