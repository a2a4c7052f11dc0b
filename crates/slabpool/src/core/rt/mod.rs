// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime primitives: handle encoding, block/slab headers, the shared
//! freelist directory, the master and slave pools, and their supporting
//! collaborators (backing allocator, accessibility instrumentation,
//! statistics).

pub mod access;
pub mod backend;
pub mod block;
pub mod freelist;
pub mod handle;
pub mod master;
pub mod slave;
pub mod stats;

pub use access::{AccessTracker, ChunkAccess, NullTracker};
pub use backend::{BackingAllocator, SystemBackend};
pub use block::align;
pub use handle::{Handle, Handle32, Handle64};
pub use master::Pool;
pub use slave::SlavePool;
pub use stats::{PoolStats, SizeClassStats};

#[cfg(feature = "accessibility-checks")]
pub use access::ShadowTable;
