// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The shared, lock-free freelist directory.
//!
//! Each per-thread `tofree` list that overflows is wrapped as a
//! [`FreelistNode`] and Treiber-stack-pushed onto a slot selected by byte
//! size. Sizes below 4096 index a flat array directly; sizes at or above
//! 4096 go through a two-level lookup (`size / 4096`, `size % 4096`) whose
//! second level is installed lazily via CAS, so a workload that only ever
//! touches a handful of small sizes never pays for a fully-allocated
//! table sized to every possible byte size.

use super::handle::Handle;
use crossbeam_utils::CachePadded;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Sizes `< SMALL_DIRECT_LIMIT` are indexed directly; larger sizes go
/// through the two-level lookup.
const SMALL_DIRECT_LIMIT: usize = 4096;
/// Width of both the top-level and leaf-level arrays in the two-level
/// lookup, chosen so `size / LARGE_LEAF_WIDTH` and `size % LARGE_LEAF_WIDTH`
/// both stay within the pool's 2^24-byte size ceiling.
const LARGE_LEAF_WIDTH: usize = 4096;

/// A chain of chunks reclaimed by one thread and handed to the shared
/// pool. `head`/`count` describe the reclaimed-chunk stack exactly as a
/// thread-local `touse`/`tofree` list does; `next` chains nodes together
/// so multiple spills for the same size accumulate instead of clobbering
/// each other.
pub(crate) struct FreelistNode<H: Handle> {
    pub(crate) head: H,
    pub(crate) count: u32,
    next: AtomicPtr<FreelistNode<H>>,
}

impl<H: Handle> FreelistNode<H> {
    fn new(head: H, count: u32) -> Self {
        Self {
            head,
            count,
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

struct LargeLeaf<H: Handle> {
    slots: [CachePadded<AtomicPtr<FreelistNode<H>>>; LARGE_LEAF_WIDTH],
}

impl<H: Handle> LargeLeaf<H> {
    fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| CachePadded::new(AtomicPtr::new(ptr::null_mut()))),
        }
    }
}

/// The global, size-indexed freelist directory shared by every thread
/// using one pool's shared state.
///
/// Slots are cache-line padded: distinct size classes spill/steal
/// concurrently from independent threads, and an unpadded array would put
/// several classes' heads on the same cache line, turning every CAS into
/// contention across unrelated size classes.
pub(crate) struct FreelistDirectory<H: Handle> {
    small: Box<[CachePadded<AtomicPtr<FreelistNode<H>>>]>,
    large_top: Box<[CachePadded<AtomicPtr<LargeLeaf<H>>>]>,
    _marker: PhantomData<H>,
}

impl<H: Handle> FreelistDirectory<H> {
    pub(crate) fn new() -> Self {
        Self {
            small: (0..SMALL_DIRECT_LIMIT)
                .map(|_| CachePadded::new(AtomicPtr::new(ptr::null_mut())))
                .collect(),
            large_top: (0..LARGE_LEAF_WIDTH)
                .map(|_| CachePadded::new(AtomicPtr::new(ptr::null_mut())))
                .collect(),
            _marker: PhantomData,
        }
    }

    /// Resolve the atomic slot for `size`, lazily installing the
    /// second-level leaf for large sizes on first use.
    fn slot(&self, size: usize) -> &AtomicPtr<FreelistNode<H>> {
        if size < SMALL_DIRECT_LIMIT {
            return &self.small[size];
        }

        let top_index = size / LARGE_LEAF_WIDTH;
        let leaf_index = size % LARGE_LEAF_WIDTH;
        let top = &self.large_top[top_index];

        let mut leaf_ptr = top.load(Ordering::Acquire);
        if leaf_ptr.is_null() {
            let speculative = Box::into_raw(Box::new(LargeLeaf::<H>::new()));
            match top.compare_exchange(
                ptr::null_mut(),
                speculative,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => leaf_ptr = speculative,
                Err(actual) => {
                    // Lost the race to install the leaf; discard our
                    // speculative allocation and use the winner's.
                    // SAFETY: `speculative` was never published, so we
                    // hold the only reference to it.
                    unsafe {
                        drop(Box::from_raw(speculative));
                    }
                    leaf_ptr = actual;
                }
            }
        }

        // SAFETY: once installed, a leaf is never replaced or freed while
        // the directory is alive.
        let leaf = unsafe { &*leaf_ptr };
        &leaf.slots[leaf_index]
    }

    /// Treiber-stack push: prepend `node` onto the chain for `size`.
    pub(crate) fn push(&self, size: usize, head: H, count: u32) {
        let node = Box::into_raw(Box::new(FreelistNode::new(head, count)));
        let slot = self.slot(size);
        loop {
            let current_head = slot.load(Ordering::Acquire);
            // SAFETY: `node` was just allocated and is not yet published;
            // writing its `next` before the CAS is race-free.
            unsafe {
                (*node).next.store(current_head, Ordering::Relaxed);
            }
            if slot
                .compare_exchange(current_head, node, Ordering::Release, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Treiber-stack pop: detach and return the most recently spilled
    /// chain for `size`, or `None` if the shared pool has nothing for
    /// this size.
    pub(crate) fn pop(&self, size: usize) -> Option<(H, u32)> {
        let slot = self.slot(size);
        loop {
            let current_head = slot.load(Ordering::Acquire);
            if current_head.is_null() {
                return None;
            }
            // SAFETY: nodes are only freed after being exclusively
            // detached by a successful CAS below, so a node visible via
            // `current_head` is still live.
            let next = unsafe { (*current_head).next.load(Ordering::Acquire) };
            if slot
                .compare_exchange(current_head, next, Ordering::Release, Ordering::Acquire)
                .is_ok()
            {
                // SAFETY: we exclusively own `current_head` now; no other
                // thread can observe or free it.
                let node = unsafe { Box::from_raw(current_head) };
                return Some((node.head, node.count));
            }
        }
    }
}

impl<H: Handle> Drop for FreelistDirectory<H> {
    fn drop(&mut self) {
        for slot in self.small.iter() {
            free_chain(slot.load(Ordering::Relaxed));
        }
        for top in self.large_top.iter() {
            let leaf_ptr = top.load(Ordering::Relaxed);
            if leaf_ptr.is_null() {
                continue;
            }
            // SAFETY: exclusive access during drop; no concurrent readers.
            let leaf = unsafe { Box::from_raw(leaf_ptr) };
            for slot in leaf.slots.iter() {
                free_chain(slot.load(Ordering::Relaxed));
            }
        }
    }
}

fn free_chain<H: Handle>(mut node: *mut FreelistNode<H>) {
    while !node.is_null() {
        // SAFETY: exclusive access during directory teardown.
        let owned = unsafe { Box::from_raw(node) };
        node = owned.next.load(Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rt::handle::Handle32;

    #[test]
    fn pop_on_empty_directory_is_none() {
        let dir = FreelistDirectory::<Handle32>::new();
        assert!(dir.pop(32).is_none());
        assert!(dir.pop(8192).is_none());
    }

    #[test]
    fn push_then_pop_small_size_round_trips() {
        let dir = FreelistDirectory::<Handle32>::new();
        let h = Handle32::new(3, 9, 0);
        dir.push(64, h, 5);
        let (popped, count) = dir.pop(64).expect("node should be present");
        assert_eq!(popped, h);
        assert_eq!(count, 5);
        assert!(dir.pop(64).is_none());
    }

    #[test]
    fn push_then_pop_large_size_installs_leaf_lazily() {
        let dir = FreelistDirectory::<Handle32>::new();
        let h = Handle32::new(10, 1, 0);
        dir.push(8192, h, 1);
        let (popped, count) = dir.pop(8192).expect("node should be present");
        assert_eq!(popped, h);
        assert_eq!(count, 1);
    }

    #[test]
    fn multiple_spills_chain_in_lifo_order() {
        let dir = FreelistDirectory::<Handle32>::new();
        dir.push(32, Handle32::new(1, 0, 0), 1);
        dir.push(32, Handle32::new(2, 0, 0), 2);
        let (first, _) = dir.pop(32).expect("present");
        assert_eq!(first.slab(), 2);
        let (second, _) = dir.pop(32).expect("present");
        assert_eq!(second.slab(), 1);
        assert!(dir.pop(32).is_none());
    }
}
