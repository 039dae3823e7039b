//! Tag-keyed pool of separately-acquired typed blocks.
//!
//! [`TaggedPool`] serves collaborators that want a named, fixed-count block
//! of real typed objects rather than raw bytes: each entry is keyed by an
//! opaque [`PoolTag`], owns its own heap acquisition (deliberately outside
//! the arena, since tagged blocks have independent lifetimes), and records
//! the drop capability of its element type so release runs destructors
//! once per element.

use std::any::Any;
use std::mem;

use indexmap::IndexMap;

use keel_core::{AllocError, AllocSpec, PoolTag};

/// One pool entry: the layout it was created with, the owning block, and
/// the recorded drop capability.
struct PoolEntry {
    spec: AllocSpec,
    /// Type-erased owning block (a `Vec<T>` behind `dyn Any`).
    block: Box<dyn Any>,
    /// Whether elements run drop glue on release (`std::mem::needs_drop`).
    needs_drop: bool,
}

/// Pool of tagged, separately-acquired typed blocks.
///
/// At most one entry exists per tag; the entry is created on the first
/// acquire call for that tag and destroyed on [`release`](TaggedPool::release).
/// Entries iterate and tear down in insertion order (`IndexMap`, not
/// `HashMap`, for deterministic order — the same choice the rest of the
/// subsystem makes for its tables).
pub struct TaggedPool {
    entries: IndexMap<PoolTag, PoolEntry>,
}

impl TaggedPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Acquire the single object registered under `spec.tag`.
    ///
    /// `spec.count` is ignored; the entry holds exactly one element.
    pub fn acquire_one<T: Default + 'static>(
        &mut self,
        spec: AllocSpec,
    ) -> Result<&mut T, AllocError> {
        let slice = self.acquire_slice::<T>(spec, 1)?;
        Ok(&mut slice[0])
    }

    /// Acquire the `spec.count`-element block registered under `spec.tag`.
    pub fn acquire_many<T: Default + 'static>(
        &mut self,
        spec: AllocSpec,
    ) -> Result<&mut [T], AllocError> {
        let count = spec.count as usize;
        self.acquire_slice::<T>(spec, count)
    }

    /// Get-or-create path shared by the acquire calls.
    fn acquire_slice<T: Default + 'static>(
        &mut self,
        spec: AllocSpec,
        count: usize,
    ) -> Result<&mut [T], AllocError> {
        if count == 0 {
            return Err(AllocError::InvalidArgument {
                reason: format!("zero-element acquisition for tag {}", spec.tag),
            });
        }
        if spec.size as usize != mem::size_of::<T>() || spec.align as usize != mem::align_of::<T>()
        {
            return Err(AllocError::InvalidArgument {
                reason: format!(
                    "spec says {} bytes @ align {} but the element type is {} bytes @ align {}",
                    spec.size,
                    spec.align,
                    mem::size_of::<T>(),
                    mem::align_of::<T>()
                ),
            });
        }

        if !self.entries.contains_key(&spec.tag) {
            let mut block: Vec<T> = Vec::new();
            block
                .try_reserve_exact(count)
                .map_err(|_| AllocError::OutOfMemory {
                    requested: count.saturating_mul(mem::size_of::<T>()),
                    available: 0,
                })?;
            block.resize_with(count, T::default);
            self.entries.insert(
                spec.tag,
                PoolEntry {
                    // Normalise the recorded count so single-object entries
                    // report their real size.
                    spec: AllocSpec {
                        count: count as u32,
                        ..spec
                    },
                    block: Box::new(block),
                    needs_drop: mem::needs_drop::<T>(),
                },
            );
        }

        let entry = self
            .entries
            .get_mut(&spec.tag)
            .expect("entry exists: inserted above if missing");
        let block = entry
            .block
            .downcast_mut::<Vec<T>>()
            .ok_or_else(|| AllocError::InvalidArgument {
                reason: format!("tag {} is bound to a different element type", spec.tag),
            })?;
        if block.len() != count {
            return Err(AllocError::InvalidArgument {
                reason: format!(
                    "tag {} already holds {} elements, re-acquire asked for {count}",
                    spec.tag,
                    block.len()
                ),
            });
        }
        Ok(block.as_mut_slice())
    }

    /// Shared view of the block registered under `tag`.
    ///
    /// Returns `None` if the tag is unknown or bound to a different type.
    pub fn get<T: 'static>(&self, tag: PoolTag) -> Option<&[T]> {
        self.entries
            .get(&tag)?
            .block
            .downcast_ref::<Vec<T>>()
            .map(Vec::as_slice)
    }

    /// Mutable view of the block registered under `tag`.
    pub fn get_mut<T: 'static>(&mut self, tag: PoolTag) -> Option<&mut [T]> {
        self.entries
            .get_mut(&tag)?
            .block
            .downcast_mut::<Vec<T>>()
            .map(Vec::as_mut_slice)
    }

    /// Release the entry registered under `tag`.
    ///
    /// Element destructors run once per element, then the block is freed.
    /// Releasing an unknown tag reports `UnknownAllocation` instead of
    /// silently doing nothing, which would mask caller bugs.
    pub fn release(&mut self, tag: PoolTag) -> Result<(), AllocError> {
        match self.entries.shift_remove(&tag) {
            Some(_entry) => Ok(()),
            None => Err(AllocError::UnknownAllocation {
                detail: format!("no pool entry for tag {tag}"),
            }),
        }
    }

    /// Whether an entry exists for `tag`.
    pub fn contains(&self, tag: PoolTag) -> bool {
        self.entries.contains_key(&tag)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The spec an entry was created with.
    pub fn entry_spec(&self, tag: PoolTag) -> Option<AllocSpec> {
        self.entries.get(&tag).map(|e| e.spec)
    }

    /// Whether an entry's elements carry drop glue.
    pub fn entry_needs_drop(&self, tag: PoolTag) -> Option<bool> {
        self.entries.get(&tag).map(|e| e.needs_drop)
    }

    /// Total payload bytes across all live entries.
    pub fn memory_bytes(&self) -> usize {
        self.entries
            .values()
            .map(|e| e.spec.total_bytes().unwrap_or(usize::MAX))
            .sum()
    }
}

impl Default for TaggedPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    thread_local! {
        static DROPS: Cell<u32> = const { Cell::new(0) };
    }

    #[derive(Default)]
    struct Counted {
        _payload: u64,
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            DROPS.with(|d| d.set(d.get() + 1));
        }
    }

    #[test]
    fn acquire_creates_default_initialised_block() {
        let mut pool = TaggedPool::new();
        let spec = AllocSpec::of::<u32>(PoolTag(1), 8);
        let block = pool.acquire_many::<u32>(spec).unwrap();
        assert_eq!(block.len(), 8);
        assert!(block.iter().all(|&v| v == 0));
    }

    #[test]
    fn acquire_one_returns_a_single_object() {
        let mut pool = TaggedPool::new();
        let spec = AllocSpec::of::<[f32; 3]>(PoolTag(2), 1);
        let obj = pool.acquire_one::<[f32; 3]>(spec).unwrap();
        obj[2] = 9.0;
        assert_eq!(pool.get::<[f32; 3]>(PoolTag(2)).unwrap()[0][2], 9.0);
    }

    #[test]
    fn reacquire_returns_the_same_block() {
        let mut pool = TaggedPool::new();
        let spec = AllocSpec::of::<u32>(PoolTag(3), 4);

        pool.acquire_many::<u32>(spec).unwrap()[0] = 77;
        let again = pool.acquire_many::<u32>(spec).unwrap();
        assert_eq!(again[0], 77);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn layout_mismatch_is_rejected() {
        let mut pool = TaggedPool::new();
        let mut spec = AllocSpec::of::<u32>(PoolTag(4), 4);
        spec.size = 2;
        let result = pool.acquire_many::<u32>(spec);
        assert!(matches!(result, Err(AllocError::InvalidArgument { .. })));
    }

    #[test]
    fn type_mismatch_on_reacquire_is_rejected() {
        let mut pool = TaggedPool::new();
        pool.acquire_many::<u32>(AllocSpec::of::<u32>(PoolTag(5), 4))
            .unwrap();
        // f32 has the same size and alignment as u32 but is a different type.
        let result = pool.acquire_many::<f32>(AllocSpec::of::<f32>(PoolTag(5), 4));
        assert!(matches!(result, Err(AllocError::InvalidArgument { .. })));
    }

    #[test]
    fn count_mismatch_on_reacquire_is_rejected() {
        let mut pool = TaggedPool::new();
        pool.acquire_many::<u32>(AllocSpec::of::<u32>(PoolTag(6), 4))
            .unwrap();
        let result = pool.acquire_many::<u32>(AllocSpec::of::<u32>(PoolTag(6), 8));
        assert!(matches!(result, Err(AllocError::InvalidArgument { .. })));
    }

    #[test]
    fn zero_count_is_rejected() {
        let mut pool = TaggedPool::new();
        let result = pool.acquire_many::<u32>(AllocSpec::of::<u32>(PoolTag(7), 0));
        assert!(matches!(result, Err(AllocError::InvalidArgument { .. })));
    }

    #[test]
    fn release_unknown_tag_is_an_error() {
        let mut pool = TaggedPool::new();
        let result = pool.release(PoolTag(99));
        assert!(matches!(result, Err(AllocError::UnknownAllocation { .. })));
    }

    #[test]
    fn release_runs_element_drops() {
        DROPS.with(|d| d.set(0));
        let mut pool = TaggedPool::new();
        pool.acquire_many::<Counted>(AllocSpec::of::<Counted>(PoolTag(8), 5))
            .unwrap();
        assert_eq!(pool.entry_needs_drop(PoolTag(8)), Some(true));

        pool.release(PoolTag(8)).unwrap();
        assert_eq!(DROPS.with(Cell::get), 5);
        assert!(!pool.contains(PoolTag(8)));
    }

    #[test]
    fn trivial_types_record_no_drop_capability() {
        let mut pool = TaggedPool::new();
        pool.acquire_many::<u64>(AllocSpec::of::<u64>(PoolTag(9), 2))
            .unwrap();
        assert_eq!(pool.entry_needs_drop(PoolTag(9)), Some(false));
    }

    #[test]
    fn released_tags_can_be_reused() {
        let mut pool = TaggedPool::new();
        let spec = AllocSpec::of::<u32>(PoolTag(10), 2);
        pool.acquire_many::<u32>(spec).unwrap()[0] = 5;
        pool.release(PoolTag(10)).unwrap();

        let fresh = pool.acquire_many::<u32>(spec).unwrap();
        assert_eq!(fresh[0], 0);
    }

    #[test]
    fn entry_spec_round_trips() {
        let mut pool = TaggedPool::new();
        let spec = AllocSpec::of::<u16>(PoolTag(11), 3);
        pool.acquire_many::<u16>(spec).unwrap();
        assert_eq!(pool.entry_spec(PoolTag(11)), Some(spec));
    }

    #[test]
    fn memory_bytes_sums_entries() {
        let mut pool = TaggedPool::new();
        pool.acquire_many::<u32>(AllocSpec::of::<u32>(PoolTag(12), 4))
            .unwrap();
        pool.acquire_many::<u64>(AllocSpec::of::<u64>(PoolTag(13), 2))
            .unwrap();
        assert_eq!(pool.memory_bytes(), 16 + 16);
    }
}
