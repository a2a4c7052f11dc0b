// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The master pool: size-classed slab allocation behind opaque handles.
//!
//! A [`Pool`] value is a cheap handle to [`SharedState`] plus, implicitly,
//! this thread's share of a single non-generic thread-local table. Cloning
//! a `Pool` shares the state; each thread still gets its own `touse`/
//! `tofree`/`active`/`blocksize` bookkeeping, keyed by the shared state's
//! address so `Pool<Handle32>` and `Pool<Handle64>` over distinct inner
//! state never collide and neither needs its own `thread_local!`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};
use std::sync::Arc;

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};

use super::access::{AccessTracker, NullTracker};
use super::backend::{BackingAllocator, SystemBackend};
use super::block::{align, Block};
use super::freelist::FreelistDirectory;
use super::handle::{Handle, Handle32};
use super::stats::{CounterDirectory, PoolStats};

/// Per-size-class thread-local bookkeeping. `touse_head`/`tofree_head` are
/// handles widened via [`Handle::to_bits`] so this struct stays the same
/// regardless of `H`.
#[derive(Debug, Clone, Copy)]
struct SizeClassLocal {
    touse_head: u64,
    touse_count: u32,
    tofree_head: u64,
    tofree_count: u32,
    /// Slab this thread is currently bump-allocating from for this size,
    /// or 0 if none.
    active: u32,
    blocksize: usize,
}

impl SizeClassLocal {
    fn fresh(blocksize: usize) -> Self {
        Self {
            touse_head: 0,
            touse_count: 0,
            tofree_head: 0,
            tofree_count: 0,
            active: 0,
            blocksize,
        }
    }
}

/// One thread's view of a single pool's shared state: its emptyblocks
/// cache plus a size-class table.
#[derive(Debug, Default)]
struct ThreadState {
    emptyblocks: Vec<u32>,
    classes: HashMap<usize, SizeClassLocal>,
}

thread_local! {
    /// Keyed by a shared state's address (`Arc::as_ptr as usize`), not by
    /// handle type. The whole point of widening handles to `u64` above is
    /// that this table never needs to be generic over `H`.
    static POOL_STATE: RefCell<HashMap<usize, ThreadState>> = RefCell::new(HashMap::new());
}

/// State shared by every clone of a [`Pool`], across every thread.
///
/// `pub(crate)` rather than private: [`super::slave`] holds a reference to
/// a master's `SharedState` so the slave pool can mirror its block
/// geometry, capturing a shared handle to the master's shared state.
pub(crate) struct SharedState<H: Handle> {
    blocks: Box<[AtomicPtr<Block>]>,
    usedblocks: AtomicU32,
    freelist: FreelistDirectory<H>,
    counters: CounterDirectory,
    backend: Arc<dyn BackingAllocator>,
    tracker: Arc<dyn AccessTracker<H>>,
    config: PoolConfig,
}

impl<H: Handle> SharedState<H> {
    fn new(
        backend: Arc<dyn BackingAllocator>,
        tracker: Arc<dyn AccessTracker<H>>,
        config: PoolConfig,
    ) -> Self {
        let slots = H::MAX_SLABS as usize;
        Self {
            blocks: (0..slots).map(|_| AtomicPtr::new(ptr::null_mut())).collect(),
            // Slab 0 is reserved as the null sentinel; real blocks start at 1.
            usedblocks: AtomicU32::new(1),
            freelist: FreelistDirectory::new(),
            counters: CounterDirectory::new(),
            backend,
            tracker,
            config,
        }
    }

    fn block(&self, slab: u32) -> Option<&Block> {
        let ptr = self.blocks[slab as usize].load(Ordering::Acquire);
        if ptr.is_null() {
            None
        } else {
            // SAFETY: non-null entries are published once, via `newblock`,
            // and never replaced or freed before `SharedState` itself
            // tears down.
            Some(unsafe { &*ptr })
        }
    }

    fn block_or_panic(&self, slab: u32) -> &Block {
        self.block(slab)
            .expect("handle references a slab with no published block")
    }

    /// The master block's chunk capacity, for a slave block mirroring it.
    pub(crate) fn block_total(&self, slab: u32) -> u32 {
        self.block_or_panic(slab).total()
    }

    fn chunk_ptr(&self, handle: H, allocsize: usize) -> NonNull<u8> {
        self.block_or_panic(handle.slab())
            .chunk_ptr(handle.chunk(), allocsize)
    }

    /// # Safety
    /// `handle` must currently be linked into a freelist chain (its
    /// payload holds a previously-written next-link, not live data).
    unsafe fn read_link(&self, handle: H, allocsize: usize) -> H {
        let ptr = self.chunk_ptr(handle, allocsize).as_ptr().cast::<H::Raw>();
        H::from_raw(ptr.read())
    }

    /// # Safety
    /// `handle` must be exclusively owned by the caller (about to be
    /// pushed onto a freelist, not concurrently read as live data).
    unsafe fn write_link(&self, handle: H, next: H, allocsize: usize) {
        let ptr = self.chunk_ptr(handle, allocsize).as_ptr().cast::<H::Raw>();
        ptr.write(next.to_raw());
    }

    /// # Safety
    /// `handle` must be exclusively owned by the caller.
    unsafe fn zero_chunk(&self, handle: H, allocsize: usize) {
        let ptr = self.chunk_ptr(handle, allocsize).as_ptr();
        ptr.write_bytes(0, allocsize);
    }

    /// Reserve `emptyblocks_batch` consecutive slab indices, returning the
    /// first and caching the rest. Exceeding the slab index space is a
    /// structural violation, not a recoverable error, so this panics.
    fn reserve_slab_batch(&self, emptyblocks: &mut Vec<u32>) -> u32 {
        let batch = self.config.emptyblocks_batch;
        let first = self.usedblocks.fetch_add(batch, Ordering::Relaxed);
        assert!(
            u64::from(first) + u64::from(batch) <= u64::from(H::MAX_SLABS),
            "slab index space exhausted: usedblocks would exceed 2^{}",
            H::SLAB_BITS
        );
        for i in (1..batch).rev() {
            emptyblocks.push(first + i);
        }
        first
    }

    fn newblock(
        &self,
        size: usize,
        allocsize: usize,
        current_blocksize: usize,
        emptyblocks: &mut Vec<u32>,
    ) -> Result<(u32, usize)> {
        let slab = emptyblocks
            .pop()
            .unwrap_or_else(|| self.reserve_slab_batch(emptyblocks));

        let blocksize = current_blocksize
            .max(allocsize)
            .min(self.config.block_byte_ceiling);
        let max_total = (1u32 << Block::TOTAL_BITS) - 1;
        let total = (u32::try_from(blocksize / allocsize).unwrap_or(max_total)).clamp(1, max_total);
        let bytes = total as usize * allocsize;

        let data = self.backend.alloc(bytes)?;
        // SAFETY: `data` is a fresh, zero-filled, exclusively-owned
        // `bytes`-byte region just obtained from `self.backend`.
        let block = unsafe { Block::new(data, bytes, total, size as u32) };
        self.tracker.on_block_created(slab, bytes);
        self.counters.record_block(size, total);
        log::debug!(
            "[Pool::newblock] size={size} slab={slab} total={total} bytes={bytes}"
        );

        let raw = Box::into_raw(Box::new(block));
        // Release: publishes the block so readers that acquire-load
        // `blocks[slab]` see a fully-initialised `Block`.
        self.blocks[slab as usize].store(raw, Ordering::Release);

        let next_blocksize = blocksize
            .saturating_mul(self.config.block_growth_factor)
            .min(self.config.block_byte_ceiling);
        Ok((slab, next_blocksize))
    }
}

impl<H: Handle> Drop for SharedState<H> {
    fn drop(&mut self) {
        log::debug!(
            "[SharedState::drop] tearing down pool, usedblocks={}",
            self.usedblocks.load(Ordering::Relaxed)
        );
        for slot in self.blocks.iter() {
            let raw = slot.load(Ordering::Relaxed);
            if raw.is_null() {
                continue;
            }
            // SAFETY: exclusive access during teardown; every non-null
            // entry was published via `Box::into_raw` in `newblock`.
            let block = unsafe { Box::from_raw(raw) };
            let bytes = block.bytes();
            let data = block.data_ptr();
            drop(block);
            // SAFETY: `data`/`bytes` are exactly the pair handed back by
            // `self.backend.alloc` when this block was created.
            unsafe { self.backend.drop(data, bytes) };
        }
    }
}

/// A thread-cooperative slab allocator handing out fixed-size chunks
/// identified by opaque `(slab, chunk, tag)` handles.
///
/// Cloning shares the underlying slabs and freelists; each clone still
/// gets its own per-thread reuse cache. See the crate-level docs for the
/// allocation algorithm.
pub struct Pool<H: Handle = Handle32> {
    shared: Arc<SharedState<H>>,
}

impl<H: Handle> Clone for Pool<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<H: Handle> Default for Pool<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Handle> Pool<H> {
    /// A pool over the system allocator, no accessibility instrumentation,
    /// default tuning.
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// A pool over the system allocator with custom tuning.
    pub fn with_config(config: PoolConfig) -> Self {
        Self::with_collaborators(Arc::new(SystemBackend), Arc::new(NullTracker), config)
    }

    /// Full control over the backing allocator and accessibility tracker.
    pub fn with_collaborators(
        backend: Arc<dyn BackingAllocator>,
        tracker: Arc<dyn AccessTracker<H>>,
        config: PoolConfig,
    ) -> Self {
        Self {
            shared: Arc::new(SharedState::new(backend, tracker, config)),
        }
    }

    fn shared_key(&self) -> usize {
        Arc::as_ptr(&self.shared) as usize
    }

    fn initial_blocksize(&self, allocsize: usize) -> usize {
        (allocsize.saturating_mul(64))
            .max(4096)
            .min(self.shared.config.block_byte_ceiling)
    }

    /// Allocate `size` bytes, returning a handle to a zero-filled chunk
    /// exclusively owned by the caller. `0 < size <= 2^24 - 1`.
    ///
    /// # Errors
    /// Propagates [`PoolError::Exhausted`] if a fresh block is needed and
    /// the backing allocator cannot supply one.
    pub fn allocate(&self, size: usize) -> Result<H> {
        debug_assert!(size > 0, "allocate requires a nonzero size");
        debug_assert!(
            size < (1usize << Block::ITEMSIZE_BITS),
            "size exceeds the 24-bit itemsize budget"
        );

        let allocsize = align(size, std::mem::size_of::<H::Raw>());
        let key = self.shared_key();

        POOL_STATE.with(|cell| {
            let mut states = cell.borrow_mut();
            let thread_state = states.entry(key).or_default();

            loop {
                {
                    let local = thread_state
                        .classes
                        .entry(size)
                        .or_insert_with(|| SizeClassLocal::fresh(self.initial_blocksize(allocsize)));

                    // 1. Private touse.
                    if local.touse_count > 0 {
                        let head = H::from_bits(local.touse_head);
                        // SAFETY: `head` is the touse list's current head,
                        // linked by a prior `free` call.
                        let next = unsafe { self.shared.read_link(head, allocsize) };
                        local.touse_head = next.to_bits();
                        local.touse_count -= 1;
                        // SAFETY: `head` just left `touse`, exclusively
                        // owned by this call now.
                        unsafe { self.shared.zero_chunk(head, allocsize) };
                        let addr = self.shared.chunk_ptr(head, allocsize);
                        self.shared.tracker.on_allocate(head, size as u32, addr);
                        self.shared.counters.get(size).record_allocate();
                        return Ok(head);
                    }

                    // 2. Promote tofree, retry step 1 next iteration.
                    if local.tofree_count > 0 {
                        local.touse_head = local.tofree_head;
                        local.touse_count = local.tofree_count;
                        local.tofree_head = 0;
                        local.tofree_count = 0;
                        continue;
                    }

                    // 3. Bump-allocate in the active block.
                    if local.active != 0 {
                        if let Some(block) = self.shared.block(local.active) {
                            if let Some(idx) = block.bump() {
                                let handle = H::new(local.active, idx, 0);
                                let addr = self.shared.chunk_ptr(handle, allocsize);
                                self.shared.tracker.on_allocate(handle, size as u32, addr);
                                self.shared.counters.get(size).record_allocate();
                                return Ok(handle);
                            }
                        }
                    }
                }

                // 4. Steal from the shared freelist, retry step 1.
                if let Some((head, count)) = self.shared.freelist.pop(size) {
                    log::trace!("[Pool::allocate] size={size} stole {count} chunks from shared freelist");
                    let local = thread_state
                        .classes
                        .get_mut(&size)
                        .expect("inserted at the top of this iteration");
                    local.touse_head = head.to_bits();
                    local.touse_count = count;
                    continue;
                }

                // 5. Fresh block; loop back around to bump-allocate from it.
                let blocksize = thread_state.classes[&size].blocksize;
                let (slab, next_blocksize) =
                    self.shared
                        .newblock(size, allocsize, blocksize, &mut thread_state.emptyblocks)?;
                let local = thread_state
                    .classes
                    .get_mut(&size)
                    .expect("inserted at the top of this iteration");
                local.active = slab;
                local.blocksize = next_blocksize;
            }
        })
    }

    /// Return `handle` to the pool. A null handle is a silent no-op.
    ///
    /// The caller must not dereference `handle` again; its payload is
    /// overwritten with freelist linkage.
    pub fn free(&self, handle: H) {
        if handle.is_null() {
            return;
        }

        let size = self.shared.block_or_panic(handle.slab()).itemsize() as usize;
        let allocsize = align(size, std::mem::size_of::<H::Raw>());

        self.shared.tracker.on_free(handle);
        self.shared.counters.get(size).record_free();

        let key = self.shared_key();
        POOL_STATE.with(|cell| {
            let mut states = cell.borrow_mut();
            let thread_state = states.entry(key).or_default();
            let local = thread_state
                .classes
                .entry(size)
                .or_insert_with(|| SizeClassLocal::fresh(self.initial_blocksize(allocsize)));

            if local.touse_count < self.shared.config.touse_hot_limit {
                // SAFETY: `handle` is being relinquished by its exclusive
                // owner; nothing else still holds it.
                unsafe { self.shared.write_link(handle, H::from_bits(local.touse_head), allocsize) };
                local.touse_head = handle.to_bits();
                local.touse_count += 1;
            } else {
                // SAFETY: see above.
                unsafe { self.shared.write_link(handle, H::from_bits(local.tofree_head), allocsize) };
                local.tofree_head = handle.to_bits();
                local.tofree_count += 1;

                if local.tofree_count >= self.shared.config.spill_threshold {
                    log::debug!(
                        "[Pool::free] size={size} spilling {} chunks to shared freelist",
                        local.tofree_count
                    );
                    self.shared
                        .freelist
                        .push(size, H::from_bits(local.tofree_head), local.tofree_count);
                    local.tofree_head = 0;
                    local.tofree_count = 0;
                }
            }
        });
    }

    /// Resolve `handle` to a machine pointer to its payload. O(1), no
    /// locks; stable across any sequence of allocations/frees that do not
    /// themselves free `handle`.
    pub fn dereference(&self, handle: H) -> NonNull<u8> {
        let block = self.shared.block_or_panic(handle.slab());
        let allocsize = align(block.itemsize() as usize, std::mem::size_of::<H::Raw>());
        block.chunk_ptr(handle.chunk(), allocsize)
    }

    /// The `size` argument originally passed to the `allocate` call that
    /// produced `handle`.
    pub fn size(&self, handle: H) -> u32 {
        self.shared.block_or_panic(handle.slab()).itemsize()
    }

    /// A snapshot of per-size-class occupancy.
    pub fn stats(&self) -> PoolStats {
        self.shared.counters.snapshot(std::mem::size_of::<H::Raw>())
    }

    pub(crate) fn shared_state(&self) -> &Arc<SharedState<H>> {
        &self.shared
    }
}

impl<H: Handle> Drop for Pool<H> {
    /// Returns this thread's cached `touse`/`tofree` chains to the shared
    /// freelist before this clone goes away, so a sibling `Pool` clone
    /// sharing the same state, on this thread or another, can reuse them.
    /// Harmless if a sibling on this same thread is still alive: it simply
    /// rebuilds its local cache via the normal allocate path.
    fn drop(&mut self) {
        let key = self.shared_key();
        POOL_STATE.with(|cell| {
            let mut states = cell.borrow_mut();
            if let Some(thread_state) = states.remove(&key) {
                for (size, local) in thread_state.classes {
                    if local.touse_count > 0 {
                        self.shared
                            .freelist
                            .push(size, H::from_bits(local.touse_head), local.touse_count);
                    }
                    if local.tofree_count > 0 {
                        self.shared
                            .freelist
                            .push(size, H::from_bits(local.tofree_head), local.tofree_count);
                    }
                }
            }
        });
    }
}
