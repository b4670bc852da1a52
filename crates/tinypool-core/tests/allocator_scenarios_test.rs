//! End-to-end allocator scenarios against a simulated system heap.

use std::collections::{HashMap, HashSet};

use tinypool_core::{
    AllocError, AllocatorConfig, MAX_SMALL_SIZE, NUM_SIZE_CLASSES, PoolAllocator, SimulatedHeap,
    freelist_index, round_up,
};

fn lcg(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

fn logged(heap: SimulatedHeap) -> PoolAllocator<SimulatedHeap> {
    PoolAllocator::with_config(heap, AllocatorConfig::default().with_logging())
}

fn count_events(pool: &PoolAllocator<SimulatedHeap>, event: &str) -> usize {
    pool.lifecycle_logs().filter(|r| r.event == event).count()
}

#[test]
fn push_pop_pair_is_observable_for_every_small_size() {
    let mut pool = PoolAllocator::new(SimulatedHeap::new());
    for n in 1..=MAX_SMALL_SIZE {
        let index = freelist_index(n);
        let p = pool.allocate(n).unwrap();
        let before = pool.free_list_len(index);
        pool.deallocate(p, n).unwrap();
        assert_eq!(pool.free_list_len(index), before + 1, "n={n}");
        // The push is visible to the next call on the same instance.
        assert_eq!(pool.allocate(n).unwrap(), p, "n={n}");
        assert_eq!(pool.free_list_len(index), before, "n={n}");
    }
    assert!(pool.verify().is_ok());
}

#[test]
fn large_requests_are_pass_through() {
    let mut pool = PoolAllocator::new(SimulatedHeap::new());
    for n in [MAX_SMALL_SIZE + 1, 200, 4096, 1 << 20] {
        let p = pool.allocate(n).unwrap();
        assert_eq!(pool.system().region_len(p), Some(n));
        pool.deallocate(p, n).unwrap();
        assert_eq!(pool.system().region_len(p), None);
    }
    assert_eq!(pool.heap_size(), 0);
    assert_eq!(pool.system().live_bytes(), 0);
}

#[test]
fn threshold_separates_tiers() {
    let mut pool = PoolAllocator::new(SimulatedHeap::new());
    let small = pool.allocate(128).unwrap();
    assert!(pool.heap_size() > 0);
    assert_eq!(pool.system().region_len(small), None);

    let heap = pool.heap_size();
    let large = pool.allocate(129).unwrap();
    assert_eq!(pool.heap_size(), heap);
    assert_eq!(pool.system().region_len(large), Some(129));
}

#[test]
fn classification_is_idempotent() {
    for x in 1..=10_000usize {
        assert_eq!(freelist_index(round_up(x)), freelist_index(x));
    }
}

#[test]
fn twenty_five_small_allocations_refill_twice_grow_once() {
    let mut pool = logged(SimulatedHeap::new());
    let mut seen = HashSet::new();
    for call in 1..=25 {
        let p = pool.allocate(8).unwrap();
        assert!(seen.insert(p), "call {call} reused a live block");
        if call == 20 {
            assert_eq!(pool.free_list_len(0), 0);
            assert_eq!(count_events(&pool, "refill"), 1);
        }
    }
    assert_eq!(count_events(&pool, "refill"), 2);
    assert_eq!(count_events(&pool, "pool_grow"), 1);
    let grants: Vec<&str> = pool
        .lifecycle_logs()
        .filter(|r| r.event == "refill")
        .map(|r| r.details.as_str())
        .collect();
    assert_eq!(grants, vec!["granted=20 listed=19", "granted=20 listed=19"]);
    assert_eq!(pool.free_list_len(0), 15);
    assert_eq!(pool.heap_size(), 320);
}

#[test]
fn large_round_trip_leaves_free_lists_untouched() {
    let mut pool = PoolAllocator::new(SimulatedHeap::new());
    // Populate a few lists first so the comparison is not trivially empty.
    let a = pool.allocate(8).unwrap();
    let b = pool.allocate(72).unwrap();
    pool.deallocate(a, 8).unwrap();
    pool.deallocate(b, 72).unwrap();

    let before = pool.free_lists().lens();
    let p = pool.allocate(200).unwrap();
    pool.deallocate(p, 200).unwrap();
    assert_eq!(pool.free_lists().lens(), before);
}

#[test]
fn exhausted_pool_scavenges_freed_block() {
    let mut pool = PoolAllocator::new(SimulatedHeap::new());
    let blocks: Vec<usize> = (0..20).map(|_| pool.allocate(64).unwrap()).collect();
    let p = blocks[11];
    pool.deallocate(p, 64).unwrap();
    assert_eq!(pool.free_list_len(7), 1);

    // Consume the rest of the pool.
    pool.allocate(128).unwrap();
    assert_eq!(pool.pool_remainder(), 0);

    pool.system_mut().fail_next(1);
    let q = pool.allocate(56).unwrap();
    assert_eq!(q, p);
    assert_eq!(pool.free_list_len(7), 0);
    assert!(pool.verify().is_ok());
}

#[test]
fn unrecoverable_exhaustion_is_a_typed_error() {
    let mut pool = PoolAllocator::new(SimulatedHeap::with_capacity(0));
    assert_eq!(
        pool.allocate(16),
        Err(AllocError::OutOfMemory { requested: 16 })
    );
    assert_eq!(
        pool.allocate(512),
        Err(AllocError::OutOfMemory { requested: 512 })
    );
    assert_eq!(pool.heap_size(), 0);
}

#[test]
fn capacity_bound_heap_falls_back_to_scavenging() {
    // Enough for the first growth of the 128-byte class and nothing else.
    let mut pool = logged(SimulatedHeap::with_capacity(5120));
    for _ in 0..20 {
        pool.allocate(128).unwrap();
    }
    // Drain the remainder so the next refill has to grow and is refused.
    while pool.pool_remainder() >= 128 {
        pool.allocate(128).unwrap();
    }
    let mut got = Vec::new();
    while let Ok(p) = pool.allocate(8) {
        got.push(p);
        if got.len() > 1000 {
            break;
        }
    }
    assert!(count_events(&pool, "scavenge") >= 1);
    assert!(pool.verify().is_ok());
}

#[test]
fn heap_size_is_monotone_under_deterministic_trace() {
    let mut pool = PoolAllocator::new(SimulatedHeap::new());
    let mut live: Vec<(usize, usize)> = Vec::new();
    let mut rng = 0xA5A5_5A5A_DEAD_BEEFu64;
    let mut last_heap = 0usize;

    for _ in 0..3000 {
        let r = lcg(&mut rng);
        match r % 3 {
            0 => {
                let size = ((r >> 8) as usize % (MAX_SMALL_SIZE * 2)).max(1);
                let p = pool.allocate(size).unwrap();
                live.push((p, size));
            }
            1 if !live.is_empty() => {
                let idx = (r as usize) % live.len();
                let (p, size) = live.swap_remove(idx);
                let frees_before = pool.free_lists().total_free();
                let heap_before = pool.heap_size();
                pool.deallocate(p, size).unwrap();
                assert_eq!(pool.heap_size(), heap_before);
                if size <= MAX_SMALL_SIZE {
                    assert_eq!(pool.free_lists().total_free(), frees_before + 1);
                }
            }
            2 if !live.is_empty() => {
                let idx = (r as usize) % live.len();
                let (p, old) = live[idx];
                let new = ((r >> 16) as usize % (MAX_SMALL_SIZE * 2)).max(1);
                live[idx] = (pool.reallocate(p, old, new).unwrap(), new);
            }
            _ => {}
        }
        assert!(pool.heap_size() >= last_heap);
        last_heap = pool.heap_size();

        // Live small blocks never overlap each other.
        let mut owners: HashMap<usize, usize> = HashMap::new();
        for &(p, size) in &live {
            if size <= MAX_SMALL_SIZE {
                assert!(owners.insert(p, size).is_none(), "block {p:#x} handed out twice");
                assert!(pool.free_lists().free_class_of(p).is_none());
            }
        }
    }
    assert!(pool.verify().is_ok());
    let lens = pool.free_lists().lens();
    assert_eq!(lens.len(), NUM_SIZE_CLASSES);
    assert_eq!(lens.iter().sum::<usize>(), pool.free_lists().total_free());
}
