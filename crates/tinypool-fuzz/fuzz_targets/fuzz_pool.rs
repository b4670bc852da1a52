#![no_main]
use libfuzzer_sys::fuzz_target;
use tinypool_core::{
    AllocError, AllocatorConfig, FreeViolation, PoolAllocator, SimulatedHeap, ValidationMode,
};

// Each 4-byte chunk is one operation: opcode, two size bytes, selector.
fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    let config = AllocatorConfig::default()
        .with_validation(ValidationMode::Hardened)
        .with_refill_batch(usize::from(data[0] % 32) + 1)
        .with_log_capacity(64);
    let heap = SimulatedHeap::with_capacity(1 << 20);
    let mut pool = PoolAllocator::with_config(heap, config);
    let mut live: Vec<(usize, usize)> = Vec::new();

    for chunk in data[1..].chunks_exact(4) {
        let size = (usize::from(u16::from_le_bytes([chunk[1], chunk[2]])) % 512) + 1;
        let pick = usize::from(chunk[3]);

        match chunk[0] % 6 {
            0 | 1 => {
                if let Ok(addr) = pool.allocate(size) {
                    assert!(live.iter().all(|&(p, _)| p != addr), "block handed out twice");
                    live.push((addr, size));
                }
            }
            2 => {
                if !live.is_empty() {
                    let (addr, n) = live.swap_remove(pick % live.len());
                    pool.deallocate(addr, n).expect("valid free rejected");
                }
            }
            3 => {
                if !live.is_empty() {
                    let idx = pick % live.len();
                    let (addr, old) = live[idx];
                    match pool.reallocate(addr, old, size) {
                        Ok(fresh) => live[idx] = (fresh, size),
                        Err(AllocError::OutOfMemory { .. }) => {
                            live.swap_remove(idx);
                        }
                        Err(err) => panic!("unexpected reallocate error: {err}"),
                    }
                }
            }
            4 => {
                // Freeing a block twice must be rejected and leave the lists intact.
                if let Some(&(addr, n)) = live.get(pick % live.len().max(1)) {
                    let before = pool.free_lists().total_free();
                    let _ = pool.deallocate(addr, n);
                    live.retain(|&(p, _)| p != addr);
                    let err = pool.deallocate(addr, n).unwrap_err();
                    assert!(matches!(
                        err,
                        AllocError::InvalidFree {
                            reason: FreeViolation::DoubleFree | FreeViolation::UnknownPointer,
                            ..
                        }
                    ));
                    assert!(pool.free_lists().total_free() <= before + 1);
                }
            }
            _ => pool.system_mut().fail_next(usize::from(chunk[3] % 3)),
        }

        pool.verify().expect("free-list invariants broken");
        let _ = pool.drain_lifecycle_logs();
    }

    for (addr, n) in live {
        pool.deallocate(addr, n).expect("valid free rejected");
    }
    pool.verify().expect("free-list invariants broken");
});
