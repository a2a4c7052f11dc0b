// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scenario: repeatedly allocate 32-byte chunks, sometimes freeing the
//! oldest, for many iterations; free everything outstanding at the end
//! and expect zero used chunks in stats (the Conservation law).

use slabpool::Pool;
use std::collections::VecDeque;

#[test]
fn sequential_churn_converges_to_zero_used() {
    let pool: Pool = Pool::new();
    let mut outstanding: VecDeque<_> = VecDeque::new();

    for i in 0..32_768u32 {
        let handle = pool.allocate(32).expect("system allocator has memory");
        outstanding.push_back(handle);

        if i % 3 == 0 {
            if let Some(oldest) = outstanding.pop_front() {
                pool.free(oldest);
            }
        }
    }

    while let Some(handle) = outstanding.pop_front() {
        pool.free(handle);
    }

    assert_eq!(pool.stats().total_used(), 0);
}
