//! Deterministic randomized workload.
//!
//! Drives allocate, deallocate and reallocate from a 64-bit LCG so every run
//! with the same seed makes the same calls. After each step the free-list
//! invariants are verified and no live small block may sit on a free list
//! or share its address with another live block.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tinypool_core::{
    AllocError, AllocatorConfig, MAX_SMALL_SIZE, PoolAllocator, SimulatedHeap, ValidationMode,
};

use crate::error::HarnessError;
use crate::trace::PoolSummary;

#[derive(Debug, Clone)]
pub struct StressConfig {
    pub ops: usize,
    pub seed: u64,
    /// Largest request size; values above 128 exercise the delegated tier.
    pub max_size: usize,
    pub validation: ValidationMode,
    /// Refuse one system request in every `fail_every` steps (0 disables).
    pub fail_every: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            ops: 10_000,
            seed: 0x5eed,
            max_size: 2 * MAX_SMALL_SIZE,
            validation: ValidationMode::Strict,
            fail_every: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressSummary {
    pub ops: usize,
    pub seed: u64,
    pub allocations: u64,
    pub deallocations: u64,
    pub reallocations: u64,
    /// Allocations that returned out of memory (only with failure injection).
    pub out_of_memory: u64,
    pub peak_live: usize,
    pub final_live: usize,
    /// Lifecycle events by name.
    pub events: BTreeMap<String, u64>,
    pub pool: PoolSummary,
}

struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 16
    }

    fn below(&mut self, bound: usize) -> usize {
        (self.next() % bound as u64) as usize
    }
}

/// Runs the workload described by `config`.
pub fn run_stress(config: &StressConfig) -> Result<StressSummary, HarnessError> {
    let alloc_config = AllocatorConfig::default()
        .with_validation(config.validation)
        .with_log_capacity(1024);
    let mut pool = PoolAllocator::with_config(SimulatedHeap::new(), alloc_config);
    let mut rng = Lcg(config.seed);
    let mut live: Vec<(usize, usize)> = Vec::new();
    let mut events: BTreeMap<String, u64> = BTreeMap::new();
    let max_size = config.max_size.max(1);

    let mut summary = StressSummary {
        ops: config.ops,
        seed: config.seed,
        allocations: 0,
        deallocations: 0,
        reallocations: 0,
        out_of_memory: 0,
        peak_live: 0,
        final_live: 0,
        events: BTreeMap::new(),
        pool: PoolSummary::capture(&pool),
    };

    for step in 0..config.ops {
        if config.fail_every > 0 && step % config.fail_every == 0 {
            pool.system_mut().fail_next(1);
        }
        let roll = rng.below(10);
        if live.is_empty() || roll < 5 {
            let size = rng.below(max_size) + 1;
            match pool.allocate(size) {
                Ok(addr) => live.push((addr, size)),
                Err(AllocError::OutOfMemory { .. }) => summary.out_of_memory += 1,
                Err(err) => return Err(err.into()),
            }
            summary.allocations += 1;
        } else if roll < 8 {
            let (addr, size) = live.swap_remove(rng.below(live.len()));
            pool.deallocate(addr, size)?;
            summary.deallocations += 1;
        } else {
            let idx = rng.below(live.len());
            let (addr, old) = live[idx];
            let new = rng.below(max_size) + 1;
            match pool.reallocate(addr, old, new) {
                Ok(fresh) => live[idx] = (fresh, new),
                Err(AllocError::OutOfMemory { .. }) => {
                    // The old block was released before the failed allocation.
                    live.swap_remove(idx);
                    summary.out_of_memory += 1;
                }
                Err(err) => return Err(err.into()),
            }
            summary.reallocations += 1;
        }
        summary.peak_live = summary.peak_live.max(live.len());

        pool.verify()
            .map_err(|violation| HarnessError::Invariant { step, violation })?;
        check_live_blocks(&pool, &live, step)?;
        for record in pool.drain_lifecycle_logs() {
            *events.entry(record.event.to_string()).or_default() += 1;
        }
    }

    summary.final_live = live.len();
    summary.events = events;
    summary.pool = PoolSummary::capture(&pool);
    Ok(summary)
}

fn check_live_blocks(
    pool: &PoolAllocator<SimulatedHeap>,
    live: &[(usize, usize)],
    step: usize,
) -> Result<(), HarnessError> {
    let mut seen = HashSet::with_capacity(live.len());
    for &(addr, size) in live {
        if !seen.insert(addr) {
            return Err(HarnessError::LiveBlock {
                step,
                addr,
                reason: "handed out twice",
            });
        }
        if size <= MAX_SMALL_SIZE && pool.free_lists().free_class_of(addr).is_some() {
            return Err(HarnessError::LiveBlock {
                step,
                addr,
                reason: "live block is also on a free list",
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_summary() {
        let config = StressConfig {
            ops: 2_000,
            ..StressConfig::default()
        };
        let a = run_stress(&config).unwrap();
        let b = run_stress(&config).unwrap();
        assert_eq!(a.pool, b.pool);
        assert_eq!(a.events, b.events);
        assert_eq!(a.allocations + a.deallocations + a.reallocations, 2_000);
    }

    #[test]
    fn hardened_mode_runs_clean() {
        let config = StressConfig {
            ops: 1_500,
            seed: 42,
            validation: ValidationMode::Hardened,
            ..StressConfig::default()
        };
        let summary = run_stress(&config).unwrap();
        assert_eq!(summary.out_of_memory, 0);
        assert!(summary.events.get("refill").copied().unwrap_or(0) > 0);
        assert!(summary.events.get("invalid_free").is_none());
    }

    #[test]
    fn injected_failures_are_survivable() {
        let config = StressConfig {
            ops: 3_000,
            seed: 7,
            max_size: MAX_SMALL_SIZE,
            fail_every: 3,
            ..StressConfig::default()
        };
        let summary = run_stress(&config).unwrap();
        assert!(summary.pool.system_refusals > 0);
        assert!(summary.events.contains_key("pool_grow"));
    }
}
