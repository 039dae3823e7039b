//! Linear (stack) allocator: aligned bump pushes over a carved range.
//!
//! [`LinearAllocator`] is the per-frame scratch workhorse. It supports only
//! aligned append and bulk [`clear`](LinearAllocator::clear) — there is no
//! per-object free. The backing bytes live in the [`Arena`]; the allocator
//! holds an [`ArenaRange`] descriptor plus a cursor.

use keel_core::{AllocError, SizeAlign};

use crate::align::align_address;
use crate::arena::{Arena, ArenaRange};

/// Bump-push shared by the linear and double-buffered allocators.
///
/// Aligns `cursor` inside the window `[win_start, win_start + win_len)` of
/// the arena, records the pad amount in the byte immediately preceding the
/// data (when padding is non-zero), copies `src`, and returns the absolute
/// arena offset of the data plus the advanced cursor.
///
/// The pad record keeps enough information for an eventual unaligned free:
/// the stored byte is the low 8 bits of the padding, which is exact for
/// every alignment up to 256.
pub(crate) fn bump_push(
    arena: &mut Arena,
    win_start: usize,
    win_len: usize,
    cursor: usize,
    src: &[u8],
    req: SizeAlign,
) -> Result<(usize, usize), AllocError> {
    let size = req.size() as usize;
    let align = req.align() as usize;

    if align == 0 || !align.is_power_of_two() {
        return Err(AllocError::InvalidArgument {
            reason: format!("push alignment {align} is not a power of two"),
        });
    }
    if src.len() != size {
        return Err(AllocError::InvalidArgument {
            reason: format!(
                "source is {} bytes but the request says {size}",
                src.len()
            ),
        });
    }

    let abs_cursor = win_start + cursor;
    let aligned = align_address(abs_cursor, align);
    let padding = aligned - abs_cursor;
    let end = aligned + size;
    if end > win_start + win_len {
        return Err(AllocError::ContractViolation {
            reason: format!(
                "push of {size} bytes (align {align}) exceeds the remaining {} bytes",
                (win_start + win_len).saturating_sub(abs_cursor)
            ),
        });
    }

    if padding > 0 {
        arena.at_offset_mut(aligned - 1, 1)[0] = padding as u8;
    }
    arena.at_offset_mut(aligned, size).copy_from_slice(src);

    Ok((aligned, cursor + padding + size))
}

/// Bump-pointer allocator over a caller-supplied range.
///
/// The range is adopted, not allocated: the allocator's lifetime discipline
/// is that it must only ever be used with the arena the range was carved
/// from (the [`MemoryContext`](crate::MemoryContext) owns both and wires
/// them together).
///
/// A push that would run past the range is rejected with
/// `ContractViolation` in every build profile; there is no unchecked
/// release-mode fast path that could corrupt adjacent ranges.
#[derive(Debug)]
pub struct LinearAllocator {
    range: ArenaRange,
    cursor: usize,
}

impl LinearAllocator {
    /// Adopt a carved range.
    pub fn new(range: ArenaRange) -> Self {
        Self { range, cursor: 0 }
    }

    /// Push `src` at the requested alignment.
    ///
    /// Returns the absolute arena offset of the copied data; read it back
    /// with [`Arena::at_offset`]. The cursor advances by the data size plus
    /// any alignment padding.
    pub fn push(
        &mut self,
        arena: &mut Arena,
        src: &[u8],
        req: SizeAlign,
    ) -> Result<usize, AllocError> {
        let (offset, cursor) = bump_push(
            arena,
            self.range.offset(),
            self.range.len(),
            self.cursor,
            src,
            req,
        )?;
        self.cursor = cursor;
        Ok(offset)
    }

    /// Reset the cursor to the start of the range.
    ///
    /// All previous pushes become logically invalid; the bytes are not
    /// zeroed and will be overwritten by subsequent pushes.
    pub fn clear(&mut self) {
        self.cursor = 0;
    }

    /// Bytes consumed so far, including alignment padding.
    #[inline]
    pub fn used(&self) -> usize {
        self.cursor
    }

    /// Total capacity of the adopted range.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.range.len()
    }

    /// Bytes still available before the range is exhausted.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.range.len() - self.cursor
    }

    /// The adopted range descriptor.
    pub fn range(&self) -> ArenaRange {
        self.range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_arena_and_range(len: usize) -> (Arena, ArenaRange) {
        let mut arena = Arena::reserve(len.max(1024), 64).unwrap();
        let range = arena.carve(len, 64).unwrap();
        (arena, range)
    }

    #[test]
    fn first_push_lands_at_the_range_start() {
        let (mut arena, range) = make_arena_and_range(256);
        let mut lin = LinearAllocator::new(range);
        let off = lin.push(&mut arena, &[7; 8], SizeAlign::new(8, 8)).unwrap();
        assert_eq!(off, range.offset());
        assert_eq!(arena.at_offset(off, 8), &[7; 8]);
    }

    #[test]
    fn pushes_return_increasing_aligned_offsets() {
        let (mut arena, range) = make_arena_and_range(256);
        let mut lin = LinearAllocator::new(range);

        let a = lin.push(&mut arena, &[1; 3], SizeAlign::new(3, 1)).unwrap();
        let b = lin.push(&mut arena, &[2; 8], SizeAlign::new(8, 8)).unwrap();
        let c = lin.push(&mut arena, &[3; 4], SizeAlign::new(4, 4)).unwrap();

        assert!(a < b && b < c);
        assert_eq!(b % 8, 0);
        assert_eq!(c % 4, 0);
    }

    #[test]
    fn padding_is_recorded_before_the_data() {
        let (mut arena, range) = make_arena_and_range(256);
        let mut lin = LinearAllocator::new(range);

        lin.push(&mut arena, &[1; 3], SizeAlign::new(3, 1)).unwrap();
        let off = lin.push(&mut arena, &[2; 8], SizeAlign::new(8, 8)).unwrap();

        // 3 bytes used, next 8-aligned boundary is +5.
        let pad = arena.at_offset(off - 1, 1)[0];
        assert_eq!(pad, 5);
    }

    #[test]
    fn cursor_advances_by_size_plus_padding() {
        let (mut arena, range) = make_arena_and_range(256);
        let mut lin = LinearAllocator::new(range);

        lin.push(&mut arena, &[1; 3], SizeAlign::new(3, 1)).unwrap();
        lin.push(&mut arena, &[2; 8], SizeAlign::new(8, 8)).unwrap();
        assert_eq!(lin.used(), 16);
        assert_eq!(lin.remaining(), 240);
    }

    #[test]
    fn overflow_is_rejected_without_touching_neighbours() {
        let mut arena = Arena::reserve(1024, 64).unwrap();
        let range = arena.carve(32, 64).unwrap();
        let sentinel = arena.carve(8, 1).unwrap();
        arena
            .at_offset_mut(sentinel.offset(), 8)
            .copy_from_slice(&[0xAA; 8]);

        let mut lin = LinearAllocator::new(range);
        let result = lin.push(&mut arena, &[1; 64], SizeAlign::new(64, 8));
        assert!(matches!(result, Err(AllocError::ContractViolation { .. })));
        assert_eq!(lin.used(), 0);
        assert_eq!(arena.at_offset(sentinel.offset(), 8), &[0xAA; 8]);
    }

    #[test]
    fn exact_fit_succeeds() {
        let (mut arena, range) = make_arena_and_range(32);
        let mut lin = LinearAllocator::new(range);
        assert!(lin.push(&mut arena, &[9; 32], SizeAlign::new(32, 1)).is_ok());
        assert_eq!(lin.remaining(), 0);
    }

    #[test]
    fn clear_resets_to_the_first_address() {
        let (mut arena, range) = make_arena_and_range(256);
        let mut lin = LinearAllocator::new(range);

        let first = lin.push(&mut arena, &[1; 16], SizeAlign::new(16, 8)).unwrap();
        lin.push(&mut arena, &[2; 16], SizeAlign::new(16, 8)).unwrap();
        lin.clear();
        assert_eq!(lin.used(), 0);

        let again = lin.push(&mut arena, &[3; 16], SizeAlign::new(16, 8)).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn non_power_of_two_alignment_is_rejected() {
        let (mut arena, range) = make_arena_and_range(256);
        let mut lin = LinearAllocator::new(range);
        let result = lin.push(&mut arena, &[0; 4], SizeAlign::from_bits(4u64 << 32 | 3));
        assert!(matches!(result, Err(AllocError::InvalidArgument { .. })));
    }

    #[test]
    fn source_length_must_match_the_request() {
        let (mut arena, range) = make_arena_and_range(256);
        let mut lin = LinearAllocator::new(range);
        let result = lin.push(&mut arena, &[0; 4], SizeAlign::new(8, 8));
        assert!(matches!(result, Err(AllocError::InvalidArgument { .. })));
    }

    #[test]
    fn zero_size_push_is_valid() {
        let (mut arena, range) = make_arena_and_range(256);
        let mut lin = LinearAllocator::new(range);
        let off = lin.push(&mut arena, &[], SizeAlign::new(0, 8)).unwrap();
        assert_eq!(off % 8, 0);
        assert_eq!(lin.used(), 0);
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn in_capacity_sequences_always_succeed(
                sizes in proptest::collection::vec(1usize..32, 1..16),
            ) {
                let (mut arena, range) = make_arena_and_range(4096);
                let mut lin = LinearAllocator::new(range);
                let mut last = None;
                for size in sizes {
                    let src = vec![0x5A; size];
                    let off = lin
                        .push(&mut arena, &src, SizeAlign::new(size as u32, 8))
                        .unwrap();
                    prop_assert_eq!(off % 8, 0);
                    if let Some(prev) = last {
                        prop_assert!(off > prev);
                    }
                    last = Some(off);
                }
                prop_assert!(lin.used() <= lin.capacity());
            }
        }
    }
}
