//! Pooled versus system allocation.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tinypool_abi::{LibcHeap, tinypool_allocate, tinypool_deallocate};
use tinypool_bench::{SIZES, mixed_sizes};
use tinypool_core::{AllocatorConfig, PoolAllocator};

fn quiet_pool() -> PoolAllocator<LibcHeap> {
    PoolAllocator::with_config(LibcHeap::new(), AllocatorConfig::default().with_log_capacity(0))
}

fn bench_alloc_free_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_free_cycle");

    for &size in SIZES {
        group.bench_with_input(BenchmarkId::new("pool", size), &size, |b, &sz| {
            let mut pool = quiet_pool();
            b.iter(|| {
                let p = pool.allocate(criterion::black_box(sz)).unwrap();
                pool.deallocate(p, sz).unwrap();
            });
        });
        group.bench_with_input(BenchmarkId::new("libc", size), &size, |b, &sz| {
            b.iter(|| unsafe {
                let p = libc::malloc(criterion::black_box(sz));
                libc::free(p);
            });
        });
        group.bench_with_input(BenchmarkId::new("abi", size), &size, |b, &sz| {
            b.iter(|| unsafe {
                let p = tinypool_allocate(criterion::black_box(sz));
                tinypool_deallocate(p, sz);
            });
        });
    }
    group.finish();
}

fn bench_alloc_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_burst");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("pool_1000x64B", |b| {
        let mut pool = quiet_pool();
        let mut held = Vec::with_capacity(1000);
        b.iter(|| {
            for _ in 0..1000 {
                held.push(pool.allocate(64).unwrap());
            }
            for p in held.drain(..) {
                pool.deallocate(p, 64).unwrap();
            }
        });
    });

    group.bench_function("libc_1000x64B", |b| {
        let mut held = Vec::with_capacity(1000);
        b.iter(|| unsafe {
            for _ in 0..1000 {
                held.push(libc::malloc(64));
            }
            for p in held.drain(..) {
                libc::free(p);
            }
        });
    });

    group.finish();
}

fn bench_mixed_small(c: &mut Criterion) {
    let mut sizes = Vec::new();
    mixed_sizes(1000, 128, &mut sizes);
    let mut group = c.benchmark_group("mixed_small");
    group.throughput(Throughput::Elements(sizes.len() as u64));

    group.bench_function("pool", |b| {
        let mut pool = quiet_pool();
        let mut held = Vec::with_capacity(sizes.len());
        b.iter(|| {
            for &n in &sizes {
                held.push((pool.allocate(n).unwrap(), n));
            }
            for (p, n) in held.drain(..) {
                pool.deallocate(p, n).unwrap();
            }
        });
    });

    group.bench_function("libc", |b| {
        let mut held = Vec::with_capacity(sizes.len());
        b.iter(|| unsafe {
            for &n in &sizes {
                held.push(libc::malloc(n));
            }
            for p in held.drain(..) {
                libc::free(p);
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_alloc_free_cycle,
    bench_alloc_burst,
    bench_mixed_small
);
criterion_main!(benches);
