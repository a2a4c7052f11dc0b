// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scenario: allocate 100 chunks of size 8 from the master; for each write
//! `i` into the first 4 bytes, materialise a slave at 4 bytes, write `i`
//! into the slave's first 4 bytes; reading back through both pools must
//! return `i` for every `i`.

use slabpool::{Pool, SlavePool, SystemBackend};
use std::sync::Arc;

#[test]
fn materialise_round_trip_preserves_both_payloads() {
    let pool: Pool = Pool::new();
    let slave: SlavePool<slabpool::Handle32> = SlavePool::new(&pool, Arc::new(SystemBackend));

    let handles: Vec<_> = (0..100)
        .map(|_| pool.allocate(8).expect("system allocator has memory"))
        .collect();

    for (i, &handle) in handles.iter().enumerate() {
        let i = i as u32;
        // SAFETY: `handle` is exclusively owned and its 8-byte payload is
        // wide enough for a u32 write.
        unsafe {
            pool.dereference(handle).as_ptr().cast::<u32>().write(i);
        }
        slave
            .materialise(handle, 4, true)
            .expect("system allocator has memory");
        // SAFETY: just materialised at 4 bytes.
        unsafe {
            slave.dereference(handle).as_ptr().cast::<u32>().write(i);
        }
    }

    for (i, &handle) in handles.iter().enumerate() {
        let expected = i as u32;
        // SAFETY: both regions are still live and untouched by anything
        // else.
        let from_master = unsafe { pool.dereference(handle).as_ptr().cast::<u32>().read() };
        let from_slave = unsafe { slave.dereference(handle).as_ptr().cast::<u32>().read() };
        assert_eq!(from_master, expected);
        assert_eq!(from_slave, expected);
    }
}
