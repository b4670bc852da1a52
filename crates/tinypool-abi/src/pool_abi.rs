//! `extern "C"` entry points over the process-wide pool.
//!
//! C conventions apply: failures return null, rejected frees are ignored
//! (with logging on, the rejection is recorded in the lifecycle log).

use std::ffi::c_void;
use std::ptr;

use tinypool_core::size_class::{freelist_index, is_small};

use crate::global::with_global_pool;

/// Allocates `n` bytes from the process-wide pool.
///
/// Returns null when `n` is 0, on exhaustion, or on a reentrant call.
#[unsafe(no_mangle)]
pub extern "C" fn tinypool_allocate(n: usize) -> *mut c_void {
    if n == 0 {
        return ptr::null_mut();
    }
    with_global_pool(|pool| pool.allocate(n).ok())
        .flatten()
        .map_or(ptr::null_mut(), |addr| addr as *mut c_void)
}

/// Returns `p`, allocated with `n` bytes, to the process-wide pool.
///
/// A null `p` or a zero `n` is ignored.
///
/// # Safety
///
/// `p` must have been returned by [`tinypool_allocate`] or
/// [`tinypool_reallocate`] for a size in the same class as `n`, and must not
/// be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tinypool_deallocate(p: *mut c_void, n: usize) {
    if p.is_null() || n == 0 {
        return;
    }
    let _ = with_global_pool(|pool| pool.deallocate(p as usize, n));
}

/// Resizes `p` from `old_size` to `new_size` bytes, preserving the first
/// `min(old_size, new_size)` bytes.
///
/// A null `p` behaves like [`tinypool_allocate`]; a zero `new_size` frees
/// `p` and returns null. On failure null is returned and `p` stays valid.
///
/// # Safety
///
/// Unless null, `p` must be a live block from this pool allocated with a
/// size in the same class as `old_size`. On success it must not be used
/// afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tinypool_reallocate(
    p: *mut c_void,
    old_size: usize,
    new_size: usize,
) -> *mut c_void {
    if p.is_null() {
        return tinypool_allocate(new_size);
    }
    if new_size == 0 {
        // SAFETY: forwarded caller contract.
        unsafe { tinypool_deallocate(p, old_size) };
        return ptr::null_mut();
    }

    let addr = p as usize;
    let moved = with_global_pool(|pool| {
        if same_class(old_size, new_size) {
            // Free-list links live outside the blocks, so the block comes
            // back unchanged from the head of its own list.
            return pool.reallocate(addr, old_size, new_size).ok();
        }
        let fresh = pool.allocate(new_size).ok()?;
        // SAFETY: `p` is live for `old_size` bytes per the caller contract
        // and `fresh` was just allocated for `new_size` bytes.
        unsafe { copy_block(addr, fresh, old_size.min(new_size)) };
        if pool.deallocate(addr, old_size).is_err() {
            let _ = pool.deallocate(fresh, new_size);
            return None;
        }
        Some(fresh)
    });
    moved
        .flatten()
        .map_or(ptr::null_mut(), |addr| addr as *mut c_void)
}

fn same_class(a: usize, b: usize) -> bool {
    a > 0 && b > 0 && is_small(a) && is_small(b) && freelist_index(a) == freelist_index(b)
}

/// Copies `len` bytes from `src` to `dst`; the ranges may overlap.
///
/// # Safety
///
/// Both ranges must be valid for `len` bytes.
unsafe fn copy_block(src: usize, dst: usize, len: usize) {
    if src == dst || len == 0 {
        return;
    }
    // SAFETY: validity of both ranges is the caller's obligation.
    unsafe { ptr::copy(src as *const u8, dst as *mut u8, len) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_check_matches_size_classes() {
        assert!(same_class(17, 24));
        assert!(!same_class(16, 17));
        assert!(!same_class(128, 129));
        assert!(!same_class(200, 200));
        assert!(!same_class(0, 8));
    }

    #[test]
    fn zero_size_allocation_is_null() {
        assert!(tinypool_allocate(0).is_null());
    }

    #[test]
    fn null_and_zero_frees_are_ignored() {
        unsafe {
            tinypool_deallocate(ptr::null_mut(), 8);
            let p = tinypool_allocate(8);
            tinypool_deallocate(p, 0);
            tinypool_deallocate(p, 8);
        }
    }
}
