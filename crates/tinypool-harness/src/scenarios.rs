//! Named end-to-end scenarios.
//!
//! Each scenario drives a fresh allocator over a [`SimulatedHeap`] through a
//! fixed sequence and records named checks of its observable state. A
//! scenario fails if any check fails; allocator errors that the sequence does
//! not expect abort it with [`HarnessError::Alloc`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tinypool_core::{
    AllocError, AllocatorConfig, MAX_SMALL_SIZE, PoolAllocator, SimulatedHeap, freelist_index,
    round_up,
};

use crate::error::HarnessError;

/// Scenario names accepted by [`run_scenario`].
pub const SCENARIOS: &[&str] = &[
    "push-pop",
    "large-passthrough",
    "tier-boundary",
    "classify",
    "refill-batch",
    "scavenge",
    "out-of-memory",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub passed: bool,
    pub checks: Vec<Check>,
}

impl ScenarioReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            checks: Vec::new(),
        }
    }

    fn check(&mut self, name: &str, passed: bool, detail: impl Into<String>) {
        self.passed &= passed;
        self.checks.push(Check {
            name: name.to_string(),
            passed,
            detail: detail.into(),
        });
    }

    fn check_eq<T: PartialEq + std::fmt::Debug>(&mut self, name: &str, actual: T, expected: T) {
        let detail = format!("actual={actual:?} expected={expected:?}");
        self.check(name, actual == expected, detail);
    }
}

/// Runs the scenario called `name`.
pub fn run_scenario(name: &str) -> Result<ScenarioReport, HarnessError> {
    let mut report = ScenarioReport::new(name);
    match name {
        "push-pop" => push_pop(&mut report)?,
        "large-passthrough" => large_passthrough(&mut report)?,
        "tier-boundary" => tier_boundary(&mut report)?,
        "classify" => classify(&mut report),
        "refill-batch" => refill_batch(&mut report)?,
        "scavenge" => scavenge(&mut report)?,
        "out-of-memory" => out_of_memory(&mut report),
        other => return Err(HarnessError::UnknownScenario(other.to_string())),
    }
    Ok(report)
}

fn fresh() -> PoolAllocator<SimulatedHeap> {
    logged(SimulatedHeap::new())
}

fn logged(heap: SimulatedHeap) -> PoolAllocator<SimulatedHeap> {
    PoolAllocator::with_config(heap, AllocatorConfig::default().with_logging())
}

fn push_pop(report: &mut ScenarioReport) -> Result<(), HarnessError> {
    let mut pool = fresh();
    let mut failures = Vec::new();
    for n in 1..=MAX_SMALL_SIZE {
        let index = freelist_index(n);
        let p = pool.allocate(n)?;
        let before = pool.free_list_len(index);
        pool.deallocate(p, n)?;
        let pushed = pool.free_list_len(index) == before + 1;
        let popped = pool.allocate(n)? == p && pool.free_list_len(index) == before;
        if !(pushed && popped) {
            failures.push(n);
        }
    }
    report.check(
        "push_then_pop_visible_on_same_instance",
        failures.is_empty(),
        format!("failing sizes: {failures:?}"),
    );
    report.check("invariants", pool.verify().is_ok(), "");
    Ok(())
}

fn large_passthrough(report: &mut ScenarioReport) -> Result<(), HarnessError> {
    let mut pool = fresh();
    let a = pool.allocate(8)?;
    pool.deallocate(a, 8)?;
    let before = pool.free_lists().lens();
    let heap = pool.heap_size();

    let p = pool.allocate(200)?;
    report.check_eq("system_region_len", pool.system().region_len(p), Some(200));
    pool.deallocate(p, 200)?;
    report.check_eq("system_region_released", pool.system().region_len(p), None);
    report.check_eq("list_counts_unchanged", pool.free_lists().lens(), before);
    report.check_eq("heap_size_unchanged", pool.heap_size(), heap);
    Ok(())
}

fn tier_boundary(report: &mut ScenarioReport) -> Result<(), HarnessError> {
    let mut pool = fresh();
    let small = pool.allocate(128)?;
    report.check_eq("128_is_pooled", pool.system().region_len(small), None);
    let heap = pool.heap_size();
    let large = pool.allocate(129)?;
    report.check_eq("129_is_delegated", pool.system().region_len(large), Some(129));
    report.check_eq("129_does_not_grow_pool", pool.heap_size(), heap);
    Ok(())
}

fn classify(report: &mut ScenarioReport) {
    let bad: Vec<usize> = (1..=4096)
        .filter(|&x| freelist_index(round_up(x)) != freelist_index(x))
        .collect();
    report.check(
        "classification_idempotent",
        bad.is_empty(),
        format!("mismatches: {bad:?}"),
    );
    report.check_eq("round_up_1", round_up(1), 8);
    report.check_eq("round_up_9", round_up(9), 16);
    report.check_eq("index_128", freelist_index(128), 15);
}

fn refill_batch(report: &mut ScenarioReport) -> Result<(), HarnessError> {
    let mut pool = fresh();
    let mut seen = HashSet::new();
    let mut reused = false;
    for _ in 0..25 {
        reused |= !seen.insert(pool.allocate(8)?);
    }
    let count = |event: &str| pool.lifecycle_logs().filter(|r| r.event == event).count();
    report.check_eq("refills", count("refill"), 2);
    report.check_eq("pool_growths", count("pool_grow"), 1);
    report.check_eq("heap_size", pool.heap_size(), 320);
    report.check_eq("list0_len", pool.free_list_len(0), 15);
    report.check("no_live_address_reused", !reused, "");
    Ok(())
}

fn scavenge(report: &mut ScenarioReport) -> Result<(), HarnessError> {
    let mut pool = fresh();
    let blocks = (0..20)
        .map(|_| pool.allocate(64))
        .collect::<Result<Vec<_>, _>>()?;
    let freed = blocks[5];
    pool.deallocate(freed, 64)?;
    // A 128-byte refill takes the rest of the pool.
    pool.allocate(128)?;
    report.check_eq("pool_exhausted", pool.pool_remainder(), 0);

    pool.system_mut().fail_next(1);
    let heap = pool.heap_size();
    // Class 6 is empty and growth is refused: the class 7 block is adopted.
    let got = pool.allocate(56)?;
    report.check_eq("returns_freed_block", got, freed);
    let scavenges = pool.lifecycle_logs().filter(|r| r.event == "scavenge").count();
    report.check_eq("scavenge_records", scavenges, 1);
    report.check_eq("class7_empty", pool.free_list_len(7), 0);
    report.check_eq("heap_size_unchanged", pool.heap_size(), heap);
    report.check("invariants", pool.verify().is_ok(), "");
    Ok(())
}

fn out_of_memory(report: &mut ScenarioReport) {
    let mut pool = logged(SimulatedHeap::with_capacity(0));
    report.check_eq(
        "small_request_fails_typed",
        pool.allocate(16),
        Err(AllocError::OutOfMemory { requested: 16 }),
    );
    report.check_eq(
        "large_request_fails_typed",
        pool.allocate(1024),
        Err(AllocError::OutOfMemory { requested: 1024 }),
    );
    let oom = pool.lifecycle_logs().filter(|r| r.event == "oom").count();
    report.check_eq("oom_records", oom, 2);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_scenario_passes() {
        for name in SCENARIOS {
            let report = run_scenario(name).unwrap();
            let failed: Vec<&Check> = report.checks.iter().filter(|c| !c.passed).collect();
            assert!(report.passed, "{name}: {failed:?}");
            assert!(!report.checks.is_empty());
        }
    }

    #[test]
    fn unknown_scenario_is_an_error() {
        assert!(matches!(
            run_scenario("nope"),
            Err(HarnessError::UnknownScenario(name)) if name == "nope"
        ));
    }
}
