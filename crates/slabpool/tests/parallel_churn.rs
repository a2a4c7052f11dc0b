// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scenario: three threads each run the sequential-churn workload on
//! clones of the same pool; after all threads join and every outstanding
//! handle is freed, stats must show zero used.

use slabpool::Pool;
use std::collections::VecDeque;
use std::thread;

#[test]
fn parallel_churn_across_three_threads_converges_to_zero_used() {
    let _ = env_logger::try_init();
    let pool: Pool = Pool::new();

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let pool = pool.clone();
            thread::spawn(move || {
                let mut outstanding: VecDeque<_> = VecDeque::new();
                for i in 0..32_768u32 {
                    let handle = pool.allocate(32).expect("system allocator has memory");
                    outstanding.push_back(handle);
                    // Occasionally free a handle other than the oldest, so
                    // threads race on shared-freelist steals/spills rather
                    // than only ever hitting each one's own touse/bump path.
                    if i % 3 == 0 {
                        let pick = fastrand::usize(..outstanding.len());
                        let freed = outstanding.remove(pick).expect("pick is within bounds");
                        pool.free(freed);
                    }
                }
                while let Some(handle) = outstanding.pop_front() {
                    pool.free(handle);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker thread should not panic");
    }

    assert_eq!(pool.stats().total_used(), 0);
}
