// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scenario: thread A allocates then frees 8192 chunks of size 32
//! (forcing a `tofree` spill to the shared pool); thread B then allocates
//! 4096 chunks of size 32. B's allocations must succeed without creating
//! more than one new block beyond A's, demonstrating shared-freelist
//! reuse across threads.

use slabpool::Pool;
use std::thread;

#[test]
fn spill_on_thread_a_is_reused_by_thread_b() {
    let pool: Pool = Pool::new();

    let a_pool = pool.clone();
    thread::spawn(move || {
        let handles: Vec<_> = (0..8192)
            .map(|_| a_pool.allocate(32).expect("system allocator has memory"))
            .collect();
        for handle in handles {
            a_pool.free(handle);
        }
    })
    .join()
    .expect("thread A should not panic");

    let chunks_held_after_a = pool
        .stats()
        .classes
        .iter()
        .find(|c| c.size == 32)
        .map(|c| c.chunks_held)
        .expect("size class 32 is registered after thread A's blocks");

    let b_pool = pool.clone();
    thread::spawn(move || {
        let handles: Vec<_> = (0..4096)
            .map(|_| b_pool.allocate(32).expect("reused from A's shared spill"))
            .collect();
        for handle in handles {
            b_pool.free(handle);
        }
    })
    .join()
    .expect("thread B should not panic");

    let chunks_held_after_b = pool
        .stats()
        .classes
        .iter()
        .find(|c| c.size == 32)
        .map(|c| c.chunks_held)
        .expect("size class 32 still registered after thread B");

    assert_eq!(
        chunks_held_after_a, chunks_held_after_b,
        "thread B should satisfy its allocations entirely from A's shared-freelist spill"
    );
}
