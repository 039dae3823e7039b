//! Benchmark profiles for the keel memory subsystem.
//!
//! Provides the context sizings the micro-benchmarks construct, kept here
//! so every bench measures against the same reservation shape.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use keel_alloc::AllocConfig;

/// Context sizing used by the micro-benchmarks.
///
/// 32 MiB arena: 4 MiB scratch, 8 MiB staging, 16 MiB slab — the same
/// proportions as the default config at half the reservation, so a bench
/// run stays light on memory.
pub fn bench_config() -> AllocConfig {
    AllocConfig {
        arena_bytes: 32 << 20,
        arena_align: 64,
        scratch_bytes: 4 << 20,
        staging_bytes: 8 << 20,
        slab_bytes: 16 << 20,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_alloc::MemoryContext;

    #[test]
    fn bench_config_constructs() {
        assert!(MemoryContext::new(bench_config()).is_ok());
    }
}
