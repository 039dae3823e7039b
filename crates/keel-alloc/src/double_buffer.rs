//! Double-buffered stack allocator for frame-to-frame scratch reuse.
//!
//! [`DoubleBufferAllocator`] packs two linear allocators into one carved
//! range, split at the midpoint. One half is "current" (consumed this
//! frame), the other is "next" (filled for the coming frame). The allocator
//! itself never flips the roles: the current/next designation is fixed at
//! construction, and callers swap their own notion of which side is
//! semantically active at each frame boundary (the
//! [`MemoryContext`](crate::MemoryContext) frame protocol does exactly
//! that).

use std::fmt;

use keel_core::{AllocError, SizeAlign};

use crate::arena::{Arena, ArenaRange};
use crate::linear::bump_push;

/// Which half of the double buffer an operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    /// The low half of the range.
    A,
    /// The high half of the range.
    B,
}

impl Side {
    /// The opposite side.
    #[inline]
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    #[inline]
    fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

/// Total capacity and the 1-bit current-side selector, packed in one word.
///
/// Bit layout: capacity in bits 63..=1, selector in bit 0 (0 = side A is
/// current, 1 = side B is current). The selector is written once at
/// construction and only ever read afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferWord(u64);

impl BufferWord {
    pub(crate) fn new(capacity: usize, current: Side) -> Self {
        debug_assert!(
            (capacity as u64) < (1 << 63),
            "capacity must fit in 63 bits"
        );
        Self((capacity as u64) << 1 | current.index() as u64)
    }

    /// Total capacity of the double buffer (both halves).
    #[inline]
    pub fn capacity(&self) -> usize {
        (self.0 >> 1) as usize
    }

    /// The side designated "current" at construction.
    #[inline]
    pub fn current(&self) -> Side {
        if self.0 & 1 == 0 {
            Side::A
        } else {
            Side::B
        }
    }

    /// The raw packed word.
    #[inline]
    pub fn bits(&self) -> u64 {
        self.0
    }
}

/// Two bump allocators sharing one carved range, split at the midpoint.
///
/// Each side's cursor stays within its half; the halves never overlap.
/// A single push must stay under half the total capacity; larger requests
/// are rejected as `ContractViolation` in every build profile, not just
/// under debug assertions.
#[derive(Debug)]
pub struct DoubleBufferAllocator {
    range: ArenaRange,
    cursors: [usize; 2],
    word: BufferWord,
}

impl DoubleBufferAllocator {
    /// Adopt a carved range and split it at the midpoint.
    ///
    /// The range length must be even so the halves are equal; side A starts
    /// as "current".
    pub fn new(range: ArenaRange) -> Result<Self, AllocError> {
        if range.len() == 0 || range.len() % 2 != 0 {
            return Err(AllocError::InvalidArgument {
                reason: format!(
                    "double buffer range must have even non-zero length (got {})",
                    range.len()
                ),
            });
        }
        Ok(Self {
            range,
            cursors: [0, 0],
            word: BufferWord::new(range.len(), Side::A),
        })
    }

    /// Capacity of one half.
    #[inline]
    pub fn half_capacity(&self) -> usize {
        self.word.capacity() / 2
    }

    /// Total capacity of both halves.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.word.capacity()
    }

    /// The side designated "current" at construction.
    #[inline]
    pub fn current_side(&self) -> Side {
        self.word.current()
    }

    /// The packed capacity/selector word.
    #[inline]
    pub fn word(&self) -> BufferWord {
        self.word
    }

    /// Bytes used on the given side.
    #[inline]
    pub fn used(&self, side: Side) -> usize {
        self.cursors[side.index()]
    }

    fn push_side(
        &mut self,
        arena: &mut Arena,
        side: Side,
        src: &[u8],
        req: SizeAlign,
    ) -> Result<usize, AllocError> {
        let half = self.half_capacity();
        if req.size() as usize >= half {
            return Err(AllocError::ContractViolation {
                reason: format!(
                    "push of {} bytes must be less than half the region capacity ({half})",
                    req.size()
                ),
            });
        }
        let idx = side.index();
        let win_start = self.range.offset() + idx * half;
        let (offset, cursor) = bump_push(arena, win_start, half, self.cursors[idx], src, req)?;
        self.cursors[idx] = cursor;
        Ok(offset)
    }

    /// Push onto the side designated "current" at construction.
    pub fn push_current(
        &mut self,
        arena: &mut Arena,
        src: &[u8],
        req: SizeAlign,
    ) -> Result<usize, AllocError> {
        self.push_side(arena, self.word.current(), src, req)
    }

    /// Push onto the complement of the "current" side.
    pub fn push_next(
        &mut self,
        arena: &mut Arena,
        src: &[u8],
        req: SizeAlign,
    ) -> Result<usize, AllocError> {
        self.push_side(arena, self.word.current().other(), src, req)
    }

    /// Push onto an explicit side.
    ///
    /// This is the primitive the frame protocol uses once the caller's own
    /// notion of "active" has diverged from the construction-time selector.
    pub fn push_on(
        &mut self,
        arena: &mut Arena,
        side: Side,
        src: &[u8],
        req: SizeAlign,
    ) -> Result<usize, AllocError> {
        self.push_side(arena, side, src, req)
    }

    /// Reset the "current" side's cursor to zero.
    pub fn clear_current(&mut self) {
        self.cursors[self.word.current().index()] = 0;
    }

    /// Reset the "next" side's cursor to zero.
    pub fn clear_next(&mut self) {
        self.cursors[self.word.current().other().index()] = 0;
    }

    /// Reset an explicit side's cursor to zero.
    pub fn clear_on(&mut self, side: Side) {
        self.cursors[side.index()] = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_buffer(len: usize) -> (Arena, DoubleBufferAllocator) {
        let mut arena = Arena::reserve(len.max(2048), 64).unwrap();
        let range = arena.carve(len, 64).unwrap();
        let buf = DoubleBufferAllocator::new(range).unwrap();
        (arena, buf)
    }

    #[test]
    fn word_packs_capacity_and_selector() {
        let (_, buf) = make_buffer(1024);
        assert_eq!(buf.word().capacity(), 1024);
        assert_eq!(buf.word().current(), Side::A);
        assert_eq!(buf.word().bits(), 1024 << 1);
    }

    #[test]
    fn halves_split_at_the_midpoint() {
        // 1024-byte region: 16 bytes @8 on current, 32 @16 on next.
        // Addresses must land on opposite sides of the midpoint and
        // satisfy their alignments.
        let (mut arena, mut buf) = make_buffer(1024);

        let cur = buf
            .push_current(&mut arena, &[1; 16], SizeAlign::new(16, 8))
            .unwrap();
        let next = buf
            .push_next(&mut arena, &[2; 32], SizeAlign::new(32, 16))
            .unwrap();

        assert!(next >= cur + 512);
        assert_eq!(cur % 8, 0);
        assert_eq!(next % 16, 0);
    }

    #[test]
    fn sides_do_not_observe_each_other() {
        let (mut arena, mut buf) = make_buffer(1024);

        buf.push_current(&mut arena, &[1; 64], SizeAlign::new(64, 8))
            .unwrap();
        assert_eq!(buf.used(Side::A), 64);
        assert_eq!(buf.used(Side::B), 0);

        buf.push_next(&mut arena, &[2; 32], SizeAlign::new(32, 8))
            .unwrap();
        assert_eq!(buf.used(Side::A), 64);
        assert_eq!(buf.used(Side::B), 32);

        buf.clear_next();
        assert_eq!(buf.used(Side::A), 64);
        assert_eq!(buf.used(Side::B), 0);
    }

    #[test]
    fn clear_current_restores_the_first_address() {
        let (mut arena, mut buf) = make_buffer(1024);

        let first = buf
            .push_current(&mut arena, &[1; 16], SizeAlign::new(16, 8))
            .unwrap();
        buf.push_current(&mut arena, &[2; 16], SizeAlign::new(16, 8))
            .unwrap();

        buf.clear_current();
        let again = buf
            .push_current(&mut arena, &[3; 16], SizeAlign::new(16, 8))
            .unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn half_capacity_pushes_are_rejected() {
        let (mut arena, mut buf) = make_buffer(1024);
        let result = buf.push_current(&mut arena, &[0; 512], SizeAlign::new(512, 8));
        assert!(matches!(result, Err(AllocError::ContractViolation { .. })));
    }

    #[test]
    fn side_overflow_is_rejected() {
        let (mut arena, mut buf) = make_buffer(1024);
        buf.push_current(&mut arena, &[1; 300], SizeAlign::new(300, 4))
            .unwrap();
        let result = buf.push_current(&mut arena, &[2; 300], SizeAlign::new(300, 4));
        assert!(matches!(result, Err(AllocError::ContractViolation { .. })));
    }

    #[test]
    fn push_on_targets_the_named_side() {
        let (mut arena, mut buf) = make_buffer(1024);
        let b = buf
            .push_on(&mut arena, Side::B, &[9; 8], SizeAlign::new(8, 8))
            .unwrap();
        assert!(b >= buf.range.offset() + 512);
        assert_eq!(buf.used(Side::B), 8);
    }

    #[test]
    fn odd_length_ranges_are_rejected() {
        let mut arena = Arena::reserve(2048, 64).unwrap();
        let range = arena.carve(1023, 1).unwrap();
        assert!(matches!(
            DoubleBufferAllocator::new(range),
            Err(AllocError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn data_round_trips_on_both_sides() {
        let (mut arena, mut buf) = make_buffer(1024);
        let cur = buf
            .push_current(&mut arena, &[0xAB; 4], SizeAlign::new(4, 4))
            .unwrap();
        let next = buf
            .push_next(&mut arena, &[0xCD; 4], SizeAlign::new(4, 4))
            .unwrap();
        assert_eq!(arena.at_offset(cur, 4), &[0xAB; 4]);
        assert_eq!(arena.at_offset(next, 4), &[0xCD; 4]);
    }
}
