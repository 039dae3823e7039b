//! Sizing configuration for the memory context.

/// Sizing for a [`MemoryContext`](crate::MemoryContext).
///
/// All values are immutable after construction; the context validates them
/// when it is built. The arena reservation is rounded up to a power of two,
/// so the three carved ranges may leave headroom — that headroom stays
/// available for collaborators that carve their own ranges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocConfig {
    /// Requested arena reservation in bytes (rounded up to a power of two).
    pub arena_bytes: usize,

    /// Alignment of the arena base and of every carved range.
    ///
    /// Must be a power of two. Alignments of a page or more switch the
    /// reservation to the page-backed path.
    pub arena_align: usize,

    /// Bytes carved for the per-frame scratch allocator.
    pub scratch_bytes: usize,

    /// Bytes carved for the double-buffered staging allocator.
    ///
    /// Split at the midpoint, so this must be even.
    pub staging_bytes: usize,

    /// Bytes carved for the segmented slab.
    ///
    /// Must be a power of two of at least
    /// [`MIN_SLAB_BYTES`](crate::slab::MIN_SLAB_BYTES).
    pub slab_bytes: usize,
}

impl AllocConfig {
    /// Default arena reservation: 64 MiB.
    pub const DEFAULT_ARENA_BYTES: usize = 64 << 20;

    /// Default arena alignment: one cache line.
    pub const DEFAULT_ARENA_ALIGN: usize = 64;

    /// Default scratch carve: 4 MiB.
    pub const DEFAULT_SCRATCH_BYTES: usize = 4 << 20;

    /// Default staging carve: 8 MiB (4 MiB per side).
    pub const DEFAULT_STAGING_BYTES: usize = 8 << 20;

    /// Default slab carve: 16 MiB.
    pub const DEFAULT_SLAB_BYTES: usize = 16 << 20;

    /// Build a config with the default sizing.
    pub fn new() -> Self {
        Self {
            arena_bytes: Self::DEFAULT_ARENA_BYTES,
            arena_align: Self::DEFAULT_ARENA_ALIGN,
            scratch_bytes: Self::DEFAULT_SCRATCH_BYTES,
            staging_bytes: Self::DEFAULT_STAGING_BYTES,
            slab_bytes: Self::DEFAULT_SLAB_BYTES,
        }
    }

    /// The arena length after power-of-two rounding.
    pub fn rounded_arena_bytes(&self) -> usize {
        self.arena_bytes.next_power_of_two()
    }
}

impl Default for AllocConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fit_the_default_arena() {
        let config = AllocConfig::default();
        let carved = config.scratch_bytes + config.staging_bytes + config.slab_bytes;
        assert!(carved <= config.rounded_arena_bytes());
    }

    #[test]
    fn rounding_is_a_power_of_two() {
        let config = AllocConfig {
            arena_bytes: 40 << 20,
            ..AllocConfig::default()
        };
        assert_eq!(config.rounded_arena_bytes(), 64 << 20);
    }
}
