// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types.
//!
//! The pool is largely infallible on its fast paths. A null-handle `free`
//! is a silent no-op, and most structural violations (freeing a sentinel
//! block, exceeding the slab-index space) are fatal assertions rather than
//! recoverable errors, since the design assumes a single-pool lifecycle
//! without recovery. The one exception is the backing allocator running
//! out of memory, which this crate surfaces as [`PoolError`] so a caller
//! can at least log and abort cleanly instead of the process dying inside
//! an allocator call with no context.

use std::fmt;

/// Errors a [`crate::Pool`] can return.
#[derive(Debug)]
pub enum PoolError {
    /// The backing allocator could not satisfy a request for `requested`
    /// bytes. This is the one failure path the pool propagates to the
    /// caller rather than treating as a fatal assertion.
    Exhausted {
        /// Bytes requested from the backing allocator.
        requested: usize,
    },
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Exhausted { requested } => {
                write!(
                    f,
                    "backing allocator could not satisfy a {requested}-byte request"
                )
            }
        }
    }
}

impl std::error::Error for PoolError {}

/// Result alias used throughout the crate's fallible paths.
pub type Result<T> = std::result::Result<T, PoolError>;
