//! Size classes for small allocations.
//!
//! Sixteen classes from 8 to 128 bytes in 8-byte steps. A request is rounded
//! up to the next multiple of [`ALIGN`] and served from the matching free
//! list; anything above [`MAX_SMALL_SIZE`] bypasses the pool entirely.

/// Boundary every small block is rounded up to (bytes).
pub const ALIGN: usize = 8;

/// Largest request served from the pool (bytes). Above this, delegate.
pub const MAX_SMALL_SIZE: usize = 128;

/// Number of free lists, one per size class.
pub const NUM_SIZE_CLASSES: usize = MAX_SMALL_SIZE / ALIGN;

/// Rounds `bytes` up to the next multiple of [`ALIGN`].
#[inline]
#[must_use]
pub const fn round_up(bytes: usize) -> usize {
    (bytes + ALIGN - 1) & !(ALIGN - 1)
}

/// Maps a byte count to its 0-based free-list index.
///
/// For `bytes` in `[1, MAX_SMALL_SIZE]` the result lies in
/// `[0, NUM_SIZE_CLASSES)`. Callers must route larger requests to the system
/// allocator before indexing.
#[inline]
#[must_use]
pub const fn freelist_index(bytes: usize) -> usize {
    round_up(bytes) / ALIGN - 1
}

/// Block size held by free list `index`. Returns 0 for out-of-range indices.
#[inline]
#[must_use]
pub const fn class_size(index: usize) -> usize {
    if index < NUM_SIZE_CLASSES {
        (index + 1) * ALIGN
    } else {
        0
    }
}

/// Returns true if a request of `bytes` is served from the pool.
#[inline]
#[must_use]
pub const fn is_small(bytes: usize) -> bool {
    bytes <= MAX_SMALL_SIZE
}

/// Iterates class sizes from `size` up to [`MAX_SMALL_SIZE`] inclusive.
///
/// `size` must already be a class size. This is the scavenging order used
/// when the system allocator refuses to grow the pool.
pub fn classes_from(size: usize) -> impl Iterator<Item = usize> {
    (size..=MAX_SMALL_SIZE).step_by(ALIGN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_up_to_eight() {
        assert_eq!(round_up(1), 8);
        assert_eq!(round_up(8), 8);
        assert_eq!(round_up(9), 16);
        assert_eq!(round_up(127), 128);
        assert_eq!(round_up(128), 128);
        assert_eq!(round_up(0), 0);
    }

    #[test]
    fn freelist_index_covers_all_classes() {
        assert_eq!(freelist_index(1), 0);
        assert_eq!(freelist_index(8), 0);
        assert_eq!(freelist_index(9), 1);
        assert_eq!(freelist_index(64), 7);
        assert_eq!(freelist_index(65), 8);
        assert_eq!(freelist_index(128), NUM_SIZE_CLASSES - 1);
    }

    #[test]
    fn freelist_index_is_stable_under_rounding() {
        for bytes in 1..=4 * MAX_SMALL_SIZE {
            assert_eq!(
                freelist_index(round_up(bytes)),
                freelist_index(bytes),
                "bytes={bytes}"
            );
        }
    }

    #[test]
    fn class_size_matches_index() {
        for i in 0..NUM_SIZE_CLASSES {
            let size = class_size(i);
            assert_eq!(size, (i + 1) * ALIGN);
            assert_eq!(freelist_index(size), i);
        }
        assert_eq!(class_size(NUM_SIZE_CLASSES), 0);
    }

    #[test]
    fn threshold_splits_tiers() {
        assert!(is_small(MAX_SMALL_SIZE));
        assert!(!is_small(MAX_SMALL_SIZE + 1));
    }

    #[test]
    fn classes_from_walks_to_threshold() {
        let sizes: Vec<usize> = classes_from(112).collect();
        assert_eq!(sizes, vec![112, 120, 128]);
        assert_eq!(classes_from(8).count(), NUM_SIZE_CLASSES);
    }
}
