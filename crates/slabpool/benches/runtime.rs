// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::unreadable_literal)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use slabpool::{Pool, SlavePool, SystemBackend};
use std::sync::Arc;

// ============================================================================
// Pool benchmarks
// ============================================================================

/// `allocate` + `free` on a 16-byte size class, hitting the thread-local
/// `touse` reuse path after the first iteration.
fn bench_allocate_free_16b(c: &mut Criterion) {
    let pool: Pool = Pool::new();
    c.bench_function("pool_allocate_free_16b", |b| {
        b.iter(|| {
            let handle = pool.allocate(black_box(16)).unwrap();
            pool.free(black_box(handle));
        })
    });
}

/// `allocate` + `free` on a 256-byte size class.
fn bench_allocate_free_256b(c: &mut Criterion) {
    let pool: Pool = Pool::new();
    c.bench_function("pool_allocate_free_256b", |b| {
        b.iter(|| {
            let handle = pool.allocate(black_box(256)).unwrap();
            pool.free(black_box(handle));
        })
    });
}

/// `allocate` + `free` on a 1KB size class.
fn bench_allocate_free_1kb(c: &mut Criterion) {
    let pool: Pool = Pool::new();
    c.bench_function("pool_allocate_free_1kb", |b| {
        b.iter(|| {
            let handle = pool.allocate(black_box(1024)).unwrap();
            pool.free(black_box(handle));
        })
    });
}

/// `dereference`, repeated on a single live handle — the no-lock read path.
fn bench_dereference(c: &mut Criterion) {
    let pool: Pool = Pool::new();
    let handle = pool.allocate(256).unwrap();
    c.bench_function("pool_dereference", |b| {
        b.iter(|| {
            black_box(pool.dereference(black_box(handle)));
        })
    });
}

/// Pure bump-allocation: fresh chunks, no reuse, approximating step 3 of
/// the allocate algorithm in isolation (no `free` call in the loop keeps
/// `touse`/`tofree` empty so every call bumps a block's `allocated` mark).
fn bench_bump_allocate_only(c: &mut Criterion) {
    c.bench_function("pool_bump_allocate_only", |b| {
        b.iter_batched(
            Pool::<slabpool::Handle32>::new,
            |pool| {
                for _ in 0..1000 {
                    black_box(pool.allocate(black_box(64)).unwrap());
                }
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

// ============================================================================
// Shared-freelist spill/steal benchmarks
// ============================================================================

/// Forces a `tofree` spill to the shared pool every 4096 frees (default
/// `spill_threshold`), then keeps allocating so steals dominate.
fn bench_spill_and_steal(c: &mut Criterion) {
    let pool: Pool = Pool::new();
    let warm: Vec<_> = (0..8192).map(|_| pool.allocate(32).unwrap()).collect();
    for h in warm {
        pool.free(h);
    }

    c.bench_function("pool_spill_and_steal_32b", |b| {
        b.iter(|| {
            let handle = pool.allocate(black_box(32)).unwrap();
            pool.free(black_box(handle));
        })
    });
}

// ============================================================================
// Slave pool benchmarks
// ============================================================================

/// `materialise` + `dereference` on a slave pool attached to a master,
/// reusing a single already-materialised slab so the cost measured is the
/// steady-state indexing path, not block installation.
fn bench_slave_materialise_and_dereference(c: &mut Criterion) {
    let pool: Pool = Pool::new();
    let slave: SlavePool<slabpool::Handle32> = SlavePool::new(&pool, Arc::new(SystemBackend));
    let handle = pool.allocate(8).unwrap();
    slave.materialise(handle, 4, true).unwrap();

    c.bench_function("slave_materialise_and_dereference", |b| {
        b.iter(|| {
            slave.materialise(black_box(handle), 4, false).unwrap();
            black_box(slave.dereference(black_box(handle)));
        })
    });
}

criterion_group!(
    pool_benches,
    bench_allocate_free_16b,
    bench_allocate_free_256b,
    bench_allocate_free_1kb,
    bench_dereference,
    bench_bump_allocate_only,
);

criterion_group!(freelist_benches, bench_spill_and_steal);

criterion_group!(slave_benches, bench_slave_materialise_and_dereference);

criterion_main!(pool_benches, freelist_benches, slave_benches);
