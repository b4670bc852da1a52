//! Shared workloads for the tinypool benchmarks.

/// Request sizes spanning both tiers.
pub const SIZES: &[usize] = &[8, 24, 64, 128, 256, 1024];

/// Fills `out` with `count` sizes in `1..=max` from a fixed LCG sequence.
pub fn mixed_sizes(count: usize, max: usize, out: &mut Vec<usize>) {
    out.clear();
    let mut state = 0x9e37_79b9_7f4a_7c15u64;
    for _ in 0..count {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        out.push(((state >> 33) as usize % max.max(1)) + 1);
    }
}
