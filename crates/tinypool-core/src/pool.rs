//! Pool cursors and carving.
//!
//! The pool is the unused tail of the most recent region obtained from the
//! system allocator (or of a scavenged block). `[start_free, end_free)` is
//! raw capacity owned by no list and no caller.

use crate::error::InvariantViolation;
use crate::size_class::round_up;

/// A region obtained from the system allocator for pool growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub base: usize,
    pub len: usize,
}

/// Pool cursor state plus the growth history.
#[derive(Debug, Default)]
pub struct Pool {
    start_free: usize,
    end_free: usize,
    /// Cumulative bytes requested from the system allocator for growth.
    heap_size: usize,
    /// Every growth region, released when the allocator is dropped.
    regions: Vec<Region>,
}

impl Pool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Next free byte.
    #[must_use]
    pub fn start_free(&self) -> usize {
        self.start_free
    }

    /// One past the last usable byte.
    #[must_use]
    pub fn end_free(&self) -> usize {
        self.end_free
    }

    /// Unused pool bytes.
    #[must_use]
    pub fn remainder(&self) -> usize {
        self.end_free - self.start_free
    }

    /// Cumulative growth in bytes. Never decreases.
    #[must_use]
    pub fn heap_size(&self) -> usize {
        self.heap_size
    }

    /// Growth regions obtained so far.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Carves up to `*nobj` blocks of `size` bytes from the remainder.
    ///
    /// Grants the full batch if it fits, otherwise as many whole blocks as
    /// remain and lowers `*nobj` to match. Returns `None` without touching
    /// anything when not even one block fits.
    pub fn carve(&mut self, size: usize, nobj: &mut usize) -> Option<usize> {
        debug_assert!(size > 0 && *nobj > 0);
        let remainder = self.remainder();
        if remainder < size {
            return None;
        }
        let granted = match size.checked_mul(*nobj) {
            Some(need) if remainder >= need => *nobj,
            _ => remainder / size,
        };
        *nobj = granted;
        let result = self.start_free;
        self.start_free += size * granted;
        Some(result)
    }

    /// Empties the pool and returns the leftover span, if non-empty.
    pub fn take_remainder(&mut self) -> Option<Region> {
        let len = self.remainder();
        if len == 0 {
            return None;
        }
        let base = self.start_free;
        self.start_free = self.end_free;
        Some(Region { base, len })
    }

    /// Size of the next growth request when `need` bytes are wanted now.
    ///
    /// Twice the immediate need plus a slice proportional to historical
    /// growth. `None` on arithmetic overflow.
    #[must_use]
    pub fn growth_request(&self, need: usize) -> Option<usize> {
        need.checked_mul(2)?
            .checked_add(round_up(self.heap_size >> 4))
    }

    /// Installs a freshly grown region as the whole pool.
    pub fn install_growth(&mut self, base: usize, len: usize) {
        debug_assert_eq!(self.remainder(), 0, "growth over a non-empty pool leaks bytes");
        self.start_free = base;
        self.end_free = base + len;
        self.heap_size = self.heap_size.saturating_add(len);
        self.regions.push(Region { base, len });
    }

    /// Turns a scavenged free block into the whole pool.
    ///
    /// Does not count as growth: `heap_size` is unchanged.
    pub fn adopt_block(&mut self, base: usize, len: usize) {
        debug_assert_eq!(self.remainder(), 0, "adopting over a non-empty pool leaks bytes");
        self.start_free = base;
        self.end_free = base + len;
    }

    /// Removes and returns every growth region.
    pub(crate) fn take_regions(&mut self) -> Vec<Region> {
        self.start_free = 0;
        self.end_free = 0;
        std::mem::take(&mut self.regions)
    }

    pub fn verify(&self) -> Result<(), InvariantViolation> {
        if self.start_free > self.end_free {
            return Err(InvariantViolation::PoolCursorsInverted {
                start: self.start_free,
                end: self.end_free,
            });
        }
        Ok(())
    }
}
