// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # slabpool
//!
//! A thread-cooperative slab allocator handing out small, fixed-size
//! memory chunks identified by compact **opaque handles** rather than raw
//! machine addresses. Targets workloads that allocate millions of short,
//! size-classified objects and benefit from cache-friendly LIFO reuse,
//! stable identity independent of machine address, and cheap
//! handle-to-address conversion.
//!
//! ## Quick start
//!
//! ```
//! use slabpool::Pool;
//!
//! let pool = Pool::new();
//! let handle = pool.allocate(32).expect("system allocator has memory");
//!
//! // SAFETY: `handle` was just allocated and is exclusively owned here.
//! unsafe {
//!     pool.dereference(handle).as_ptr().write_bytes(0xAB, 32);
//! }
//!
//! pool.free(handle);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------+
//! |                     Pool<H>                         |
//! |   thread-local touse/tofree/active per size class   |
//! +-----------------------------------------------------+
//! |                  SharedState<H>                      |
//! |  block table | usedblocks | shared freelist dir.    |
//! +-----------------------------------------------------+
//! |                  BackingAllocator                    |
//! |            (SystemBackend over std::alloc)           |
//! +-----------------------------------------------------+
//! ```
//!
//! A [`SlavePool`] attaches lazily-materialised shadow storage to the same
//! handle space without the master needing to know slaves exist.
//!
//! ## Key types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Pool`] | The master allocator: `allocate`/`free`/`dereference` |
//! | [`SlavePool`] | Auxiliary allocator keyed by the master's handles |
//! | [`Handle`] | Opaque `(slab, chunk, tag)` object identity |
//! | [`Handle32`] / [`Handle64`] | Concrete handle layouts |
//! | [`PoolConfig`] | Construction-time tuning knobs |
//! | [`PoolError`] | The one fallible path: backing allocator exhaustion |
//!
//! ## Features
//!
//! - `accessibility-checks`: wires a `dashmap`-backed shadow table that
//!   records each chunk's allocate/free lifecycle, for catching
//!   use-after-free and double-free bugs in debug builds.

/// Allocator internals: handle encoding, blocks, freelists, master/slave
/// pools, and their collaborators.
pub mod core;
/// Construction-time tuning for [`Pool`].
pub mod config;
/// Error types for the allocator's one fallible path.
pub mod error;

pub use config::{PoolConfig, PoolConfigBuilder};
pub use core::rt::{
    align, AccessTracker, BackingAllocator, ChunkAccess, Handle, Handle32, Handle64, NullTracker,
    Pool, PoolStats, SizeClassStats, SlavePool, SystemBackend,
};
pub use error::{PoolError, Result};

#[cfg(feature = "accessibility-checks")]
pub use core::rt::ShadowTable;
