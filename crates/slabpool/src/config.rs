// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pool tuning configuration.
//!
//! This crate has no on-disk or wire configuration; tuning is a
//! construction-time concern. The builder style mirrors
//! `Participant::builder()`-style construction seen elsewhere in this
//! codebase: fluent setters over a plain struct, finished with `build()`.

/// Tuning knobs for a [`crate::Pool`].
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub(crate) touse_hot_limit: u32,
    pub(crate) spill_threshold: u32,
    pub(crate) emptyblocks_batch: u32,
    pub(crate) block_growth_factor: usize,
    pub(crate) block_byte_ceiling: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            // Entries touse holds before new frees spill to tofree, keeping
            // the hot reuse path warm.
            touse_hot_limit: 4096,
            // Entries tofree accumulates before spilling wholesale to the
            // shared pool.
            spill_threshold: 4096,
            // Consecutive slab indices claimed per usedblocks.fetch_add.
            emptyblocks_batch: 16,
            // blocksize quadruples after each new block, amortising header
            // overhead over progressively larger regions.
            block_growth_factor: 4,
            // Upper bound on a size class's blocksize: 16 MiB, matching
            // this crate's own per-object size ceiling.
            block_byte_ceiling: 16 * 1024 * 1024,
        }
    }
}

impl PoolConfig {
    /// Start from the default tuning.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder(Self::default())
    }
}

/// Fluent builder for [`PoolConfig`].
#[derive(Debug, Clone, Copy)]
pub struct PoolConfigBuilder(PoolConfig);

impl PoolConfigBuilder {
    /// Entries kept in `touse` before new frees spill to `tofree`.
    pub fn touse_hot_limit(mut self, limit: u32) -> Self {
        self.0.touse_hot_limit = limit;
        self
    }

    /// Entries `tofree` accumulates before spilling wholesale to the
    /// shared pool.
    pub fn spill_threshold(mut self, threshold: u32) -> Self {
        self.0.spill_threshold = threshold;
        self
    }

    /// Consecutive slab indices reserved per `usedblocks.fetch_add`.
    pub fn emptyblocks_batch(mut self, batch: u32) -> Self {
        self.0.emptyblocks_batch = batch;
        self
    }

    /// Multiplier applied to a size class's `blocksize` after each new
    /// block, amortising header overhead.
    pub fn block_growth_factor(mut self, factor: usize) -> Self {
        self.0.block_growth_factor = factor;
        self
    }

    /// Upper bound on a size class's `blocksize`, in bytes.
    pub fn block_byte_ceiling(mut self, ceiling: usize) -> Self {
        self.0.block_byte_ceiling = ceiling;
        self
    }

    pub fn build(self) -> PoolConfig {
        self.0
    }
}
