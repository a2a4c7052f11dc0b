// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Valgrind-style accessibility bookkeeping.
//!
//! Treated as a side-channel over the allocator boundary: every invariant
//! the pool promises holds whether or not this is wired in. The trait is
//! always compiled so `master`/`slave` never need a `cfg` of their own;
//! the `dashmap`-backed implementation that actually records anything is
//! gated behind the `accessibility-checks` feature.

use std::ptr::NonNull;

use super::handle::Handle;

/// Per-handle accessibility state a tracker may record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkAccess {
    /// Payload bytes must not be touched (fresh block, or after free).
    NoAccess,
    /// Live allocation, tagged with a human-readable identifier
    /// containing slab, chunk, and address.
    Allocated { label: String },
    /// Freed; re-allocation must clear this before reuse.
    Deleted { label: String },
}

/// Receives notifications for the three lifecycle events a tracker cares
/// about: block creation, allocation, and free.
pub trait AccessTracker<H: Handle>: Send + Sync {
    /// A fresh block was carved from the backing allocator; its entire
    /// payload starts out inaccessible.
    fn on_block_created(&self, slab: u32, bytes: usize);

    /// `handle` was just returned by `allocate`/`materialise`, covering
    /// `size` bytes starting at `addr`.
    fn on_allocate(&self, handle: H, size: u32, addr: NonNull<u8>);

    /// `handle` was just returned to a freelist (thread-local or shared).
    fn on_free(&self, handle: H);
}

/// The default tracker: every hook is a no-op, compiled unconditionally so
/// `Pool`/`SlavePool` have something to hold even when no instrumentation
/// is attached.
#[derive(Debug, Default)]
pub struct NullTracker;

impl<H: Handle> AccessTracker<H> for NullTracker {
    fn on_block_created(&self, _slab: u32, _bytes: usize) {}
    fn on_allocate(&self, _handle: H, _size: u32, _addr: NonNull<u8>) {}
    fn on_free(&self, _handle: H) {}
}

#[cfg(feature = "accessibility-checks")]
mod shadow {
    use super::*;
    use dashmap::DashMap;
    use std::sync::RwLock;

    /// Per-slab accessibility table, keyed by chunk index within the slab.
    /// One `DashMap` entry per slab that has ever had a chunk touched.
    #[derive(Debug, Default)]
    pub struct ShadowTable {
        slabs: DashMap<u32, RwLock<std::collections::HashMap<u32, ChunkAccess>>>,
    }

    impl ShadowTable {
        pub fn new() -> Self {
            Self::default()
        }

        /// Snapshot of a chunk's current accessibility state, for tests
        /// and diagnostics.
        pub fn state(&self, slab: u32, chunk: u32) -> Option<ChunkAccess> {
            self.slabs
                .get(&slab)?
                .read()
                .ok()?
                .get(&chunk)
                .cloned()
        }
    }

    impl<H: Handle> AccessTracker<H> for ShadowTable {
        fn on_block_created(&self, slab: u32, _bytes: usize) {
            self.slabs.entry(slab).or_default();
        }

        fn on_allocate(&self, handle: H, size: u32, addr: NonNull<u8>) {
            let label = format!(
                "alloc(slab={}, chunk={}, size={}, addr={:p})",
                handle.slab(),
                handle.chunk(),
                size,
                addr
            );
            let entry = self.slabs.entry(handle.slab()).or_default();
            if let Ok(mut map) = entry.write() {
                map.insert(handle.chunk(), ChunkAccess::Allocated { label });
            }
        }

        fn on_free(&self, handle: H) {
            let label = format!("deleted(slab={}, chunk={})", handle.slab(), handle.chunk());
            let entry = self.slabs.entry(handle.slab()).or_default();
            if let Ok(mut map) = entry.write() {
                map.insert(handle.chunk(), ChunkAccess::Deleted { label });
            }
        }
    }
}

#[cfg(feature = "accessibility-checks")]
pub use shadow::ShadowTable;
