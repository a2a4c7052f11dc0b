// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Block (slab) headers and the chunk-alignment helper.
//!
//! A block is a contiguous region carved from the backing allocator,
//! dedicated to exactly one item size. Metadata lives out-of-band in this
//! `Block` struct rather than embedded ahead of the payload the way a C
//! allocator would lay it out (see `DESIGN.md`); the raw region requested
//! from the backend is exactly `total * allocsize` bytes with no header
//! overhead, and that is the byte count handed back to
//! `BackingAllocator::drop` at teardown.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

/// `align(size, to)` rounds `size` up to the next multiple of `to`, except
/// that `align(0, to) == 0` (an ephemeral/zero-sized request never needs
/// rounding).
///
/// ```
/// # use slabpool::core::rt::block::align;
/// assert_eq!(align(2, 4), 4);
/// assert_eq!(align(3, 4), 4);
/// assert_eq!(align(5, 4), 8);
/// assert_eq!(align(0, 4), 0);
/// ```
pub const fn align(size: usize, to: usize) -> usize {
    if size == 0 {
        return 0;
    }
    (size + to - 1) / to * to
}

/// A single size-classed slab.
///
/// `total` and `itemsize` are fixed at creation; `allocated` is the
/// high-water bump-allocation mark and only ever grows via
/// [`Block::bump`].
pub(crate) struct Block {
    data: NonNull<u8>,
    /// Bytes originally requested from the backing allocator, passed back
    /// verbatim to `BackingAllocator::drop` at teardown.
    bytes: usize,
    /// Capacity in chunks, budgeted at 20 bits; enforced here via debug
    /// assertion rather than a physical bitfield.
    total: u32,
    /// Bytes per object as requested by the caller, unpadded, budgeted at
    /// 24 bits. Callers needing the per-slot stride derive it with
    /// `align(itemsize, size_of::<Handle::Raw>())` at the call site;
    /// `itemsize` itself stays the literal size the client asked for, so
    /// [`Block::itemsize`] is what `size(handle)` reports back.
    itemsize: u32,
    /// High-water mark; `allocated <= total` always holds.
    allocated: AtomicU32,
}

// SAFETY: `data` points at a region exclusively owned by this `Block`.
// Concurrent access to distinct chunks within it is intentional (bump
// allocation never relocates and per-chunk exclusivity is established by
// the freelist/bump-allocation protocol in `master`, not by this type).
unsafe impl Send for Block {}
unsafe impl Sync for Block {}

impl Block {
    pub(crate) const TOTAL_BITS: u32 = 20;
    pub(crate) const ITEMSIZE_BITS: u32 = 24;

    /// Build a block over a freshly-obtained, zero-filled region.
    ///
    /// # Safety
    /// `data` must point to a `bytes`-byte region, exclusively owned,
    /// valid for the `Block`'s lifetime, and zero-filled (matching the
    /// `BackingAllocator::alloc` contract).
    pub(crate) unsafe fn new(data: NonNull<u8>, bytes: usize, total: u32, itemsize: u32) -> Self {
        debug_assert!(
            total < (1 << Self::TOTAL_BITS),
            "block capacity exceeds the 20-bit total budget"
        );
        debug_assert!(
            itemsize < (1 << Self::ITEMSIZE_BITS),
            "item size exceeds the 24-bit itemsize budget"
        );
        Self {
            data,
            bytes,
            total,
            itemsize,
            allocated: AtomicU32::new(0),
        }
    }

    pub(crate) fn itemsize(&self) -> u32 {
        self.itemsize
    }

    pub(crate) fn total(&self) -> u32 {
        self.total
    }

    pub(crate) fn bytes(&self) -> usize {
        self.bytes
    }

    pub(crate) fn allocated(&self) -> u32 {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Post-increment the high-water mark. Returns the chunk index claimed,
    /// or `None` if the block is exhausted. Only ever called by the thread
    /// that owns this block as its `active` slab for the size class, so a
    /// plain `fetch_add` with a post-hoc bounds check is race-free against
    /// other allocators of the *same* size class (each slab has exactly
    /// one owner at a time) and independent of all other size classes.
    pub(crate) fn bump(&self) -> Option<u32> {
        let prev = self.allocated.fetch_add(1, Ordering::Relaxed);
        if prev < self.total {
            Some(prev)
        } else {
            // Overshot; undo so repeated calls on an exhausted block don't
            // let the counter run away.
            self.allocated.fetch_sub(1, Ordering::Relaxed);
            None
        }
    }

    /// Pointer to the start of chunk `index`'s payload, padded to
    /// `align(itemsize, handle_width)`.
    pub(crate) fn chunk_ptr(&self, index: u32, allocsize: usize) -> NonNull<u8> {
        debug_assert!(index < self.total, "chunk index out of bounds for block");
        let offset = (index as usize) * allocsize;
        // SAFETY: offset < total * allocsize == bytes, within the region.
        unsafe { NonNull::new_unchecked(self.data.as_ptr().add(offset)) }
    }

    pub(crate) fn data_ptr(&self) -> NonNull<u8> {
        self.data
    }
}
