// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The backing page allocator contract.
//!
//! Treated as a black box: the pool never assumes anything about how
//! `alloc`/`drop` are implemented beyond the contract documented on
//! [`BackingAllocator`]. `SystemBackend` is the default, backed by
//! `std::alloc`.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::error::PoolError;

/// A source of zero-filled memory regions, and a sink to release them.
///
/// This is the pool's only external collaborator for memory.
/// Implementations may back onto `mmap`, a process-wide arena, or (as
/// here) the system allocator.
pub trait BackingAllocator: Send + Sync {
    /// Return a region of at least `bytes`, zero-filled. Implementations
    /// should prefer page-aligned regions but are not required to.
    ///
    /// # Errors
    /// Returns [`PoolError::Exhausted`] if the region cannot be obtained.
    /// This is the one failure path the pool propagates to the caller
    /// rather than treating as a fatal assertion.
    fn alloc(&self, bytes: usize) -> Result<NonNull<u8>, PoolError>;

    /// Release a region previously returned by [`BackingAllocator::alloc`].
    /// `bytes` must equal the value originally passed to `alloc`.
    ///
    /// # Safety
    /// `ptr` must have been obtained from this same backend's `alloc` with
    /// the same `bytes`, and must not be used again afterward.
    unsafe fn drop(&self, ptr: NonNull<u8>, bytes: usize);
}

/// Default backend: the process's global allocator, aligned to the
/// largest handle width so chunk linkage writes are always aligned.
#[derive(Debug, Default)]
pub struct SystemBackend;

/// Alignment requested for every block's backing region. 8 covers both
/// `Handle32::Raw` (`u32`) and `Handle64::Raw` (`u64`).
const BLOCK_ALIGN: usize = 8;

impl BackingAllocator for SystemBackend {
    fn alloc(&self, bytes: usize) -> Result<NonNull<u8>, PoolError> {
        if bytes == 0 {
            // A zero-byte region still needs a valid, distinct pointer;
            // `Layout::from_size_align` rejects size 0 for some
            // allocators' guarantees, so round up to the alignment.
            return self.alloc(BLOCK_ALIGN);
        }
        let layout = Layout::from_size_align(bytes, BLOCK_ALIGN)
            .map_err(|_| PoolError::Exhausted { requested: bytes })?;
        // SAFETY: layout has non-zero size by construction above.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        NonNull::new(raw).ok_or(PoolError::Exhausted { requested: bytes })
    }

    unsafe fn drop(&self, ptr: NonNull<u8>, bytes: usize) {
        let bytes = bytes.max(BLOCK_ALIGN);
        // SAFETY: caller guarantees `ptr`/`bytes` match a prior `alloc`
        // call on this backend, which always used `BLOCK_ALIGN`.
        let layout = Layout::from_size_align_unchecked(bytes, BLOCK_ALIGN);
        alloc::dealloc(ptr.as_ptr(), layout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_returns_zero_filled_region() {
        let backend = SystemBackend;
        let ptr = backend.alloc(256).expect("allocation should succeed");
        // SAFETY: freshly allocated 256-byte region.
        let slice = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 256) };
        assert!(slice.iter().all(|&b| b == 0));
        // SAFETY: matches the preceding alloc call.
        unsafe { backend.drop(ptr, 256) };
    }
}
