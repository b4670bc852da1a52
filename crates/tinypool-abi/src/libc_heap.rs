//! System allocator over the host libc heap.

use std::ffi::c_void;

use tinypool_core::SystemAllocator;

/// [`SystemAllocator`] backed by `libc::malloc` and `libc::free`.
///
/// `malloc` returns memory aligned for any fundamental type, which covers
/// the pool's 8-byte alignment.
#[derive(Debug, Default)]
pub struct LibcHeap {
    live_bytes: usize,
    live_regions: usize,
}

impl LibcHeap {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            live_bytes: 0,
            live_regions: 0,
        }
    }

    /// Bytes obtained from libc and not yet released.
    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    /// Regions obtained from libc and not yet released.
    #[must_use]
    pub fn live_regions(&self) -> usize {
        self.live_regions
    }
}

impl SystemAllocator for LibcHeap {
    fn allocate(&mut self, bytes: usize) -> Option<usize> {
        if bytes == 0 {
            return None;
        }
        // SAFETY: malloc has no preconditions; null is handled below.
        let ptr = unsafe { libc::malloc(bytes) };
        if ptr.is_null() {
            return None;
        }
        self.live_bytes += bytes;
        self.live_regions += 1;
        Some(ptr as usize)
    }

    fn deallocate(&mut self, addr: usize, bytes: usize) {
        if addr == 0 {
            return;
        }
        // SAFETY: the pool only releases addresses this heap returned from
        // `allocate`, each exactly once.
        unsafe { libc::free(addr as *mut c_void) };
        self.live_bytes = self.live_bytes.saturating_sub(bytes);
        self.live_regions = self.live_regions.saturating_sub(1);
    }
}
