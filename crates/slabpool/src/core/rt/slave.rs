// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The slave pool: lazily-materialised shadow storage keyed by master
//! handles.
//!
//! A [`SlavePool`] never allocates or frees chunks of its own. It mirrors
//! a master block's chunk count the first time any handle in that slab is
//! materialised, then indexes into the mirror with the same `(slab,
//! chunk)` coordinates the master uses. There is deliberately no
//! `allocate`/`free` here: a slave slot's lifetime is tied entirely to its
//! master handle's.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use crate::error::Result;

use super::backend::BackingAllocator;
use super::block::align;
use super::handle::Handle;
use super::master::{Pool, SharedState};

/// A single slave block, mirroring one master slab's chunk count at a
/// caller-chosen payload size.
struct SlaveBlock {
    data: NonNull<u8>,
    bytes: usize,
    total: u32,
    itemsize: u32,
}

// SAFETY: same reasoning as `Block`: distinct chunks within `data` are
// accessed independently, and publication is a single CAS-guarded store.
unsafe impl Send for SlaveBlock {}
unsafe impl Sync for SlaveBlock {}

impl SlaveBlock {
    fn chunk_ptr(&self, chunk: u32, allocsize: usize) -> NonNull<u8> {
        debug_assert!(chunk < self.total, "chunk index out of bounds for slave block");
        let offset = (chunk as usize) * allocsize;
        // SAFETY: offset < total * allocsize == bytes, within the region.
        unsafe { NonNull::new_unchecked(self.data.as_ptr().add(offset)) }
    }
}

/// An auxiliary allocator keyed by a master pool's handle space.
///
/// Constructed from a master [`crate::Pool`]; holds a shared reference to
/// its state so the master's block table and chunk geometry stay
/// readable without the master needing to know slaves exist.
pub struct SlavePool<H: Handle> {
    master: Arc<SharedState<H>>,
    blocks: Box<[AtomicPtr<SlaveBlock>]>,
    backend: Arc<dyn BackingAllocator>,
}

impl<H: Handle> SlavePool<H> {
    /// Attach a slave pool to `pool`, reusing its backing allocator.
    pub fn new(pool: &Pool<H>, backend: Arc<dyn BackingAllocator>) -> Self {
        let master = Arc::clone(pool.shared_state());
        let slots = H::MAX_SLABS as usize;
        Self {
            master,
            blocks: (0..slots)
                .map(|_| AtomicPtr::new(std::ptr::null_mut()))
                .collect(),
            backend,
        }
    }

    fn slave_block(&self, slab: u32) -> Option<&SlaveBlock> {
        let ptr = self.blocks[slab as usize].load(Ordering::Acquire);
        if ptr.is_null() {
            None
        } else {
            // SAFETY: published once via `materialise`, never replaced or
            // freed before this `SlavePool` tears down.
            Some(unsafe { &*ptr })
        }
    }

    /// Ensure a slave block exists for `handle.slab()`, sized to
    /// `payload_size` bytes per slot and mirroring the master block's
    /// chunk count. Idempotent: later calls against any handle in the
    /// same slab skip block creation but still honour `clear`.
    ///
    /// # Errors
    /// Propagates [`PoolError::Exhausted`] if the backing allocator cannot
    /// satisfy the slave block's request.
    pub fn materialise(&self, handle: H, payload_size: u32, clear: bool) -> Result<()> {
        let slab = handle.slab();
        if self.slave_block(slab).is_none() {
            self.install_block(slab, payload_size)?;
        }

        if clear {
            let block = self.slave_block(slab).expect("just installed above");
            let allocsize = Self::allocsize(payload_size as usize);
            let ptr = block.chunk_ptr(handle.chunk(), allocsize);
            // SAFETY: `ptr` is within the freshly-sized slave block; the
            // caller is the only holder of `handle` at materialise time.
            unsafe { ptr.as_ptr().write_bytes(0, allocsize) };
        }

        Ok(())
    }

    fn install_block(&self, slab: u32, payload_size: u32) -> Result<()> {
        let total = self.master.block_total(slab);
        let allocsize = Self::allocsize(payload_size as usize);
        let bytes = total as usize * allocsize;

        let data = self.backend.alloc(bytes)?;
        let block = SlaveBlock {
            data,
            bytes,
            total,
            itemsize: payload_size,
        };
        let raw = Box::into_raw(Box::new(block));

        match self.blocks[slab as usize].compare_exchange(
            std::ptr::null_mut(),
            raw,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(_) => {
                // Lost the race to materialise this slab first; discard
                // our speculative block and use the winner's.
                // SAFETY: `raw` was never published.
                let lost = unsafe { Box::from_raw(raw) };
                // SAFETY: `lost.data`/`lost.bytes` match a prior `alloc`.
                unsafe { self.backend.drop(lost.data, lost.bytes) };
                Ok(())
            }
        }
    }

    /// Resolve `handle` to its slave payload. Dense-packs byte-sized
    /// shadow state (`itemsize == 1`): no alignment padding between
    /// slots.
    ///
    /// # Panics
    /// If `materialise` was never called for any handle in `handle`'s
    /// slab.
    pub fn dereference(&self, handle: H) -> NonNull<u8> {
        let block = self
            .slave_block(handle.slab())
            .expect("slave block not materialised for this handle's slab");
        let allocsize = Self::allocsize(block.itemsize as usize);
        block.chunk_ptr(handle.chunk(), allocsize)
    }

    /// The payload size passed to the `materialise` call that created
    /// this handle's slave block.
    pub fn size(&self, handle: H) -> u32 {
        self.slave_block(handle.slab())
            .expect("slave block not materialised for this handle's slab")
            .itemsize
    }

    fn allocsize(payload_size: usize) -> usize {
        if payload_size == 1 {
            1
        } else {
            align(payload_size, std::mem::size_of::<H::Raw>())
        }
    }
}

impl<H: Handle> Drop for SlavePool<H> {
    fn drop(&mut self) {
        for slot in self.blocks.iter() {
            let raw = slot.load(Ordering::Relaxed);
            if raw.is_null() {
                continue;
            }
            // SAFETY: exclusive access during teardown.
            let block = unsafe { Box::from_raw(raw) };
            let data = block.data;
            let bytes = block.bytes;
            drop(block);
            // SAFETY: `data`/`bytes` match a prior `alloc` call.
            unsafe { self.backend.drop(data, bytes) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rt::backend::SystemBackend;
    use crate::core::rt::handle::Handle32;
    use crate::Pool;

    #[test]
    fn materialise_round_trips_writes() {
        let pool: Pool<Handle32> = Pool::new();
        let slave: SlavePool<Handle32> = SlavePool::new(&pool, Arc::new(SystemBackend));

        let handles: Vec<_> = (0..100).map(|_| pool.allocate(8).unwrap()).collect();
        for (i, &h) in handles.iter().enumerate() {
            // SAFETY: exclusively owned, freshly allocated 8-byte chunk.
            unsafe {
                pool.dereference(h).as_ptr().cast::<u32>().write(i as u32);
            }
            slave.materialise(h, 4, true).unwrap();
            // SAFETY: just materialised at 4 bytes.
            unsafe {
                slave.dereference(h).as_ptr().cast::<u32>().write(i as u32);
            }
        }

        for (i, &h) in handles.iter().enumerate() {
            // SAFETY: still live, 8/4-byte regions respectively.
            let master_val = unsafe { pool.dereference(h).as_ptr().cast::<u32>().read() };
            let slave_val = unsafe { slave.dereference(h).as_ptr().cast::<u32>().read() };
            assert_eq!(master_val, i as u32);
            assert_eq!(slave_val, i as u32);
        }
    }

    #[test]
    fn materialise_is_idempotent_for_block_creation() {
        let pool: Pool<Handle32> = Pool::new();
        let slave: SlavePool<Handle32> = SlavePool::new(&pool, Arc::new(SystemBackend));

        let a = pool.allocate(8).unwrap();
        let b = pool.allocate(8).unwrap();
        slave.materialise(a, 4, true).unwrap();
        slave.materialise(b, 4, false).unwrap();
        assert_eq!(slave.size(a), 4);
        assert_eq!(slave.size(b), 4);
    }

    #[test]
    fn byte_sized_payload_is_densely_packed() {
        let pool: Pool<Handle32> = Pool::new();
        let slave: SlavePool<Handle32> = SlavePool::new(&pool, Arc::new(SystemBackend));

        let a = pool.allocate(8).unwrap();
        slave.materialise(a, 1, true).unwrap();
        // SAFETY: materialised just above.
        unsafe { slave.dereference(a).as_ptr().write(7) };
        let read_back = unsafe { slave.dereference(a).as_ptr().read() };
        assert_eq!(read_back, 7);
    }
}
