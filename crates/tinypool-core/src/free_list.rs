//! Per-size-class free lists.
//!
//! Each list is a singly-linked LIFO chain of free blocks. The link of a free
//! block is kept out of band, keyed by the block address, and exists only
//! while the block sits on a list: popping a block removes its link, so the
//! allocator never reads link state for a block a caller holds.
//!
//! List heads are only ever changed through a [`FreeListSlot`], which borrows
//! the table entry itself. There is no way to take a copy of a head, modify
//! the copy and forget to write it back.

use std::collections::HashMap;

use crate::error::InvariantViolation;
use crate::size_class::{NUM_SIZE_CLASSES, class_size};

/// Out-of-band link for one free block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Link {
    /// Next free block of the same class, `None` at the tail.
    next: Option<usize>,
    /// Class index of the list holding this block.
    class: usize,
}

/// Table of 16 free-list heads plus the links of every free block.
#[derive(Debug)]
pub struct FreeListTable {
    heads: [Option<usize>; NUM_SIZE_CLASSES],
    links: HashMap<usize, Link>,
}

/// Mutable handle on one table entry.
///
/// Obtained from [`FreeListTable::slot`]. Every push and pop goes through the
/// borrowed head, so the change is visible to the next caller.
pub struct FreeListSlot<'a> {
    class: usize,
    head: &'a mut Option<usize>,
    links: &'a mut HashMap<usize, Link>,
}

impl FreeListSlot<'_> {
    /// Class index this slot belongs to.
    #[must_use]
    pub fn class(&self) -> usize {
        self.class
    }

    /// Address of the first free block, if any.
    #[must_use]
    pub fn head(&self) -> Option<usize> {
        *self.head
    }

    /// Returns true if the list holds no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Detaches the head block and advances the head to its successor.
    pub fn pop(&mut self) -> Option<usize> {
        let addr = (*self.head)?;
        let link = self.links.remove(&addr);
        debug_assert!(
            link.is_some_and(|l| l.class == self.class),
            "free-list head {addr:#x} has no link for class {}",
            self.class
        );
        *self.head = link.and_then(|l| l.next);
        Some(addr)
    }

    /// Pushes `addr` as the new head.
    ///
    /// Returns `false` and leaves the list untouched if `addr` is already
    /// linked on any list; pushing it again would create a cycle.
    pub fn push(&mut self, addr: usize) -> bool {
        if self.links.contains_key(&addr) {
            return false;
        }
        self.links.insert(
            addr,
            Link {
                next: *self.head,
                class: self.class,
            },
        );
        *self.head = Some(addr);
        true
    }

    /// Threads `count` contiguous blocks starting at `start` into a chain
    /// and splices it in front of the current head.
    ///
    /// Blocks are `class_size(self.class())` bytes apart.
    pub fn push_chain(&mut self, start: usize, count: usize) {
        if count == 0 {
            return;
        }
        let stride = class_size(self.class);
        let mut next = *self.head;
        for i in (0..count).rev() {
            let addr = start + i * stride;
            self.links.insert(
                addr,
                Link {
                    next,
                    class: self.class,
                },
            );
            next = Some(addr);
        }
        *self.head = next;
    }
}

impl FreeListTable {
    /// Creates a table with every list empty.
    #[must_use]
    pub fn new() -> Self {
        Self {
            heads: [None; NUM_SIZE_CLASSES],
            links: HashMap::new(),
        }
    }

    /// Borrows the table entry for class `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= NUM_SIZE_CLASSES`.
    pub fn slot(&mut self, index: usize) -> FreeListSlot<'_> {
        FreeListSlot {
            class: index,
            head: &mut self.heads[index],
            links: &mut self.links,
        }
    }

    /// Head of list `index` without mutating it.
    #[must_use]
    pub fn head(&self, index: usize) -> Option<usize> {
        self.heads.get(index).copied().flatten()
    }

    /// Returns the class index of the list holding `addr`, if it is free.
    #[must_use]
    pub fn free_class_of(&self, addr: usize) -> Option<usize> {
        self.links.get(&addr).map(|l| l.class)
    }

    /// Walks list `index` from head to tail.
    pub fn iter(&self, index: usize) -> FreeListIter<'_> {
        FreeListIter {
            next: self.head(index),
            links: &self.links,
            remaining: self.links.len(),
        }
    }

    /// Number of blocks reachable from head `index`.
    #[must_use]
    pub fn len(&self, index: usize) -> usize {
        self.iter(index).count()
    }

    /// Node count of every list, index-ordered.
    #[must_use]
    pub fn lens(&self) -> [usize; NUM_SIZE_CLASSES] {
        std::array::from_fn(|i| self.len(i))
    }

    /// Total number of free blocks across all lists.
    #[must_use]
    pub fn total_free(&self) -> usize {
        self.links.len()
    }

    /// Returns true if every list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Checks structural invariants of every list.
    ///
    /// Each list must be acyclic, every node must carry its own class, every
    /// node must be aligned to its class boundary, and every stored link must
    /// be reachable from exactly one head.
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        let mut reachable = 0usize;
        for index in 0..NUM_SIZE_CLASSES {
            let mut cursor = self.heads[index];
            let mut steps = 0usize;
            while let Some(addr) = cursor {
                let Some(link) = self.links.get(&addr) else {
                    return Err(InvariantViolation::DanglingNode { class: index, addr });
                };
                if link.class != index {
                    return Err(InvariantViolation::WrongClass {
                        addr,
                        expected: index,
                        found: link.class,
                    });
                }
                if addr % crate::size_class::ALIGN != 0 {
                    return Err(InvariantViolation::Misaligned { addr });
                }
                steps += 1;
                if steps > self.links.len() {
                    return Err(InvariantViolation::Cycle { class: index });
                }
                cursor = link.next;
            }
            reachable += steps;
        }
        if reachable != self.links.len() {
            return Err(InvariantViolation::UnreachableLinks {
                reachable,
                stored: self.links.len(),
            });
        }
        Ok(())
    }
}

impl Default for FreeListTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the addresses of one free list.
pub struct FreeListIter<'a> {
    next: Option<usize>,
    links: &'a HashMap<usize, Link>,
    // Guards traversal of a corrupted (cyclic) list.
    remaining: usize,
}

impl Iterator for FreeListIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let addr = self.next?;
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.next = self.links.get(&addr).and_then(|l| l.next);
        Some(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_table_is_empty() {
        let table = FreeListTable::new();
        assert!(table.is_empty());
        assert_eq!(table.lens(), [0; NUM_SIZE_CLASSES]);
        assert!(table.verify().is_ok());
    }

    #[test]
    fn push_pop_is_lifo_and_persists() {
        let mut table = FreeListTable::new();
        assert!(table.slot(2).push(0x1000));
        assert!(table.slot(2).push(0x1018));
        assert_eq!(table.len(2), 2);

        // A second slot borrow observes the first one's writes.
        assert_eq!(table.slot(2).pop(), Some(0x1018));
        assert_eq!(table.head(2), Some(0x1000));
        assert_eq!(table.slot(2).pop(), Some(0x1000));
        assert_eq!(table.slot(2).pop(), None);
        assert!(table.is_empty());
    }

    #[test]
    fn popped_block_has_no_link() {
        let mut table = FreeListTable::new();
        table.slot(0).push(0x2000);
        assert_eq!(table.free_class_of(0x2000), Some(0));
        table.slot(0).pop();
        assert_eq!(table.free_class_of(0x2000), None);
    }

    #[test]
    fn push_rejects_already_linked_block() {
        let mut table = FreeListTable::new();
        assert!(table.slot(1).push(0x3000));
        assert!(!table.slot(1).push(0x3000));
        assert!(!table.slot(4).push(0x3000));
        assert_eq!(table.len(1), 1);
        assert_eq!(table.len(4), 0);
        assert!(table.verify().is_ok());
    }

    #[test]
    fn push_chain_threads_contiguous_blocks() {
        let mut table = FreeListTable::new();
        table.slot(3).push_chain(0x4000, 5);
        let addrs: Vec<usize> = table.iter(3).collect();
        assert_eq!(addrs, vec![0x4000, 0x4020, 0x4040, 0x4060, 0x4080]);
        assert!(table.verify().is_ok());
    }

    #[test]
    fn push_chain_splices_before_existing_head() {
        let mut table = FreeListTable::new();
        table.slot(0).push(0x9000);
        table.slot(0).push_chain(0x100, 2);
        let addrs: Vec<usize> = table.iter(0).collect();
        assert_eq!(addrs, vec![0x100, 0x108, 0x9000]);
    }

    #[test]
    fn push_chain_of_zero_is_noop() {
        let mut table = FreeListTable::new();
        table.slot(5).push_chain(0x100, 0);
        assert!(table.is_empty());
    }

    #[test]
    fn verify_reports_misaligned_node() {
        let mut table = FreeListTable::new();
        table.slot(0).push(0x1003);
        assert_eq!(
            table.verify(),
            Err(InvariantViolation::Misaligned { addr: 0x1003 })
        );
    }
}
