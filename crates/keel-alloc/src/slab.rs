//! Segmented slab allocator for fixed-size object churn.
//!
//! [`SegmentedSlab`] buckets same-layout objects into size classes. Its
//! carved range is partitioned into three regions:
//!
//! ```text
//! [ index table | scratch pad | slab ]
//!   256 entries   counters      chunks, carved lazily, never returned
//! ```
//!
//! Each index entry resolves one size class to a chunk of equal-size
//! blocks. The bookkeeping lives *inside* the slab bytes themselves:
//! a free block's first four bytes are the offset of the next free block
//! (a `NIL`-terminated, address-ordered chain), while an occupied block
//! carries a 16-byte header — validation magic, size-class index,
//! drop-hook id, owning tag — immediately before the object. All in-bytes
//! records are little-endian offset words, so the intrusive design of the
//! allocator survives without a single raw pointer.

use std::fmt;

use keel_core::{AllocError, PoolTag};

use crate::align::align_word;
use crate::arena::{Arena, ArenaRange};

/// Minimum slab range length: 1 MiB.
pub const MIN_SLAB_BYTES: usize = 1 << 20;

/// Number of size-class entries in the index table.
pub const INDEX_CAPACITY: usize = 256;

/// Objects per chunk targeted by the size-class scaling.
pub const OBJECTS_PER_CHUNK: usize = 64;

/// Bytes per index entry: chunk-offset word + class word.
const INDEX_ENTRY_BYTES: usize = 16;

/// Scratch-pad partition length. Holds the persistent diagnostic counters.
const SCRATCH_PAD_BYTES: usize = 64;

/// Occupied-block header length: magic, class, drop hook, tag.
const HEADER_BYTES: u32 = 16;

/// Chunk control header length: free-list head + owning tag.
const CHUNK_HEADER_BYTES: u32 = 16;

/// Offset where the scratch pad starts, relative to the range.
const SCRATCH_PAD_START: usize = INDEX_CAPACITY * INDEX_ENTRY_BYTES;

/// Offset where the chunk region starts, relative to the range.
const REGION_START: usize = SCRATCH_PAD_START + SCRATCH_PAD_BYTES;

/// Counter slots within the scratch pad.
const STAT_ALLOCATIONS: usize = SCRATCH_PAD_START;
const STAT_FREES: usize = SCRATCH_PAD_START + 8;
const STAT_CHUNKS: usize = SCRATCH_PAD_START + 16;

/// Free-list terminator.
const NIL: u32 = u32::MAX;

/// "No drop hook" sentinel in block headers.
const NO_HOOK: u16 = u16::MAX;

/// Validation marker stamped into occupied block headers.
///
/// Set if and only if the block is occupied; cleared on free. A free call
/// that does not find this marker is rejected as `UnknownAllocation`.
const BLOCK_MAGIC: u32 = 0xA110_CB10;

/// Largest representable class alignment (15 bits in the class word).
const MAX_CLASS_ALIGN: u32 = 1 << 14;

/// Packed index-entry word: 48-bit object size | 15-bit alignment | 1-bit
/// chunk-full flag.
///
/// Bit layout: size in bits 63..=16, alignment in bits 15..=1, full flag in
/// bit 0. An all-zero word marks a vacant index entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClassWord(u64);

impl ClassWord {
    pub(crate) fn new(size: u64, align: u16, full: bool) -> Self {
        debug_assert!(size < 1 << 48, "class size must fit in 48 bits");
        debug_assert!(align < 1 << 15, "class alignment must fit in 15 bits");
        Self(size << 16 | u64::from(align) << 1 | u64::from(full))
    }

    pub(crate) fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Recorded object size.
    #[inline]
    pub fn size(&self) -> u64 {
        self.0 >> 16
    }

    /// Recorded object alignment.
    #[inline]
    pub fn align(&self) -> u16 {
        ((self.0 >> 1) & 0x7fff) as u16
    }

    /// Whether the chunk's free list is empty.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.0 & 1 == 1
    }

    /// The same word with the full flag replaced.
    #[inline]
    pub(crate) fn with_full(self, full: bool) -> Self {
        Self(self.0 & !1 | u64::from(full))
    }

    /// The raw packed word.
    #[inline]
    pub fn bits(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClassWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes @ align {}{}",
            self.size(),
            self.align(),
            if self.is_full() { " (full)" } else { "" }
        )
    }
}

/// Size and alignment of the objects a slab class serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectLayout {
    size: u32,
    align: u32,
}

impl ObjectLayout {
    /// Describe objects of `size` bytes at a power-of-two `align`.
    pub fn new(size: u32, align: u32) -> Self {
        Self { size, align }
    }

    /// The layout of a concrete type.
    pub fn of<T>() -> Self {
        Self {
            size: std::mem::size_of::<T>() as u32,
            align: std::mem::align_of::<T>() as u32,
        }
    }

    /// Object size in bytes.
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Object alignment in bytes.
    #[inline]
    pub fn align(&self) -> u32 {
        self.align
    }
}

/// Reference to an occupied block's object bytes.
///
/// The offset is relative to the slab's carved range and stays stable for
/// the life of the allocation — chunks never move and are never returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use]
pub struct SlabRef(u32);

impl SlabRef {
    /// Offset of the object within the slab's range.
    #[inline]
    pub fn offset(&self) -> u32 {
        self.0
    }
}

/// Drop capability invoked on an object's bytes when its block is freed.
pub type DropHook = fn(&mut [u8]);

/// Identifies a registered [`DropHook`]; stamped into occupied headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DropHookId(u16);

/// Decoded occupied-block header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    /// Tag recorded at allocation time.
    pub tag: PoolTag,
    /// Index of the owning size class.
    pub class_index: u16,
    /// Drop hook recorded at allocation time, if any.
    pub drop_hook: Option<DropHookId>,
}

/// Persistent slab counters, stored in the scratch-pad partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlabStats {
    /// Blocks handed out since construction.
    pub allocations: u64,
    /// Blocks returned since construction.
    pub frees: u64,
    /// Chunks carved since construction.
    pub chunks: u64,
}

impl SlabStats {
    /// Blocks currently occupied.
    pub fn live(&self) -> u64 {
        self.allocations - self.frees
    }
}

/// Block gap for a class: the distance from a block's start to its object.
///
/// The gap is at least the header size, and a multiple of the object
/// alignment, so the header always sits in the 16 bytes immediately before
/// the object.
fn class_gap(align: u32) -> u32 {
    align.max(HEADER_BYTES)
}

/// Distance between consecutive blocks of a class. A multiple of the gap,
/// so every block start (and object) keeps the class alignment.
fn class_stride(size: u32, align: u32) -> u32 {
    let gap = class_gap(align);
    gap + align_word(u64::from(size), u64::from(gap)) as u32
}

/// Payload budget for one chunk: the object size rounded up to the next
/// power of two, scaled to hold [`OBJECTS_PER_CHUNK`] objects.
fn chunk_payload_bytes(size: u32) -> u64 {
    u64::from(size).next_power_of_two() * OBJECTS_PER_CHUNK as u64
}

/// Number of blocks a chunk of the given layout holds.
///
/// Exposed so tests and capacity planning can reason about chunk
/// granularity without carving anything.
pub fn blocks_per_chunk(layout: ObjectLayout) -> usize {
    let stride = class_stride(layout.size, layout.align);
    (chunk_payload_bytes(layout.size) / u64::from(stride)) as usize
}

/// Segmented slab allocator for fixed-size objects.
///
/// Chunks are carved from the slab region lazily on the first allocation
/// for a given (size, alignment, tag) combination and never returned —
/// there is no compaction and no whole-slab reset; the slab lives as long
/// as its context. Individual blocks cycle free → occupied → free
/// indefinitely.
#[derive(Debug)]
pub struct SegmentedSlab {
    range: ArenaRange,
    /// Bump cursor for carving chunks, relative to the range start.
    chunk_cursor: u32,
    /// Index entries in use. Entries fill left-to-right and are never
    /// reordered or reclaimed.
    class_count: usize,
    /// Registered drop hooks, addressed by the id stamped in headers.
    drop_hooks: Vec<DropHook>,
}

impl SegmentedSlab {
    /// Adopt a carved range and lay out the three partitions.
    ///
    /// The range length must be a power of two of at least
    /// [`MIN_SLAB_BYTES`]. The index table and scratch pad are
    /// zero-initialised; every index entry starts vacant.
    pub fn new(range: ArenaRange, arena: &mut Arena) -> Result<Self, AllocError> {
        if !range.len().is_power_of_two() || range.len() < MIN_SLAB_BYTES {
            return Err(AllocError::InvalidArgument {
                reason: format!(
                    "slab range must be a power of two of at least {MIN_SLAB_BYTES} bytes (got {})",
                    range.len()
                ),
            });
        }
        if range.len() > u32::MAX as usize {
            return Err(AllocError::InvalidArgument {
                reason: format!("slab range of {} bytes exceeds offset-word range", range.len()),
            });
        }

        arena.at_offset_mut(range.offset(), REGION_START).fill(0);

        Ok(Self {
            range,
            chunk_cursor: REGION_START as u32,
            class_count: 0,
            drop_hooks: Vec::new(),
        })
    }

    /// The adopted range descriptor.
    pub fn range(&self) -> ArenaRange {
        self.range
    }

    /// Number of size-class entries in use.
    pub fn class_count(&self) -> usize {
        self.class_count
    }

    /// Register a drop capability for later use in allocations.
    pub fn register_drop_hook(&mut self, hook: DropHook) -> Result<DropHookId, AllocError> {
        if self.drop_hooks.len() >= usize::from(NO_HOOK) {
            return Err(AllocError::InvalidArgument {
                reason: "drop hook registry is full".into(),
            });
        }
        let id = DropHookId(self.drop_hooks.len() as u16);
        self.drop_hooks.push(hook);
        Ok(id)
    }

    /// Allocate one block for an object of the given layout.
    ///
    /// Scans the index table for an existing, non-full class whose recorded
    /// size and alignment match — and, when `match_tag` is set, whose chunk
    /// is owned by `tag`. On a hit the free-list head is popped; on a miss
    /// a fresh chunk is carved at the next index slot. The block header is
    /// stamped with the validation magic, class index, drop hook and tag;
    /// the returned [`SlabRef`] addresses the object bytes just after the
    /// header.
    ///
    /// A full index table or an exhausted slab region reports
    /// `OutOfMemory`.
    pub fn allocate(
        &mut self,
        arena: &mut Arena,
        layout: ObjectLayout,
        tag: PoolTag,
        match_tag: bool,
        drop_hook: Option<DropHookId>,
    ) -> Result<SlabRef, AllocError> {
        if layout.size == 0 {
            return Err(AllocError::InvalidArgument {
                reason: "cannot allocate zero-size objects from the slab".into(),
            });
        }
        if !layout.align.is_power_of_two() || layout.align > MAX_CLASS_ALIGN {
            return Err(AllocError::InvalidArgument {
                reason: format!(
                    "slab alignment {} must be a power of two up to {MAX_CLASS_ALIGN}",
                    layout.align
                ),
            });
        }
        if let Some(DropHookId(id)) = drop_hook {
            if usize::from(id) >= self.drop_hooks.len() {
                return Err(AllocError::InvalidArgument {
                    reason: format!("drop hook {id} is not registered"),
                });
            }
        }

        // Existing, non-full class with a matching layout (and tag)?
        let mut target = None;
        for idx in 0..self.class_count {
            let word = self.entry_word(arena, idx);
            if word.size() != u64::from(layout.size)
                || u32::from(word.align()) != layout.align
                || word.is_full()
            {
                continue;
            }
            if match_tag {
                let chunk_off = self.entry_chunk(arena, idx);
                if self.load_u64(arena, chunk_off + 8) != tag.0 {
                    continue;
                }
            }
            target = Some(idx);
            break;
        }

        let idx = match target {
            Some(idx) => idx,
            None => self.carve_chunk(arena, layout, tag)?,
        };

        let block_off = self
            .pop_block(arena, idx)
            .expect("scanned or fresh chunk has a free block");

        let gap = class_gap(layout.align);
        let object_off = block_off + gap;
        self.store_u32(arena, object_off - 16, BLOCK_MAGIC);
        self.store_u16(arena, object_off - 12, idx as u16);
        self.store_u16(
            arena,
            object_off - 10,
            drop_hook.map_or(NO_HOOK, |DropHookId(id)| id),
        );
        self.store_u64(arena, object_off - 8, tag.0);

        self.bump_counter(arena, STAT_ALLOCATIONS);
        Ok(SlabRef(object_off))
    }

    /// Return a block to its chunk's free list.
    ///
    /// The header immediately preceding the object is validated first: a
    /// missing magic marker (foreign offset, double free) is rejected as
    /// `UnknownAllocation` rather than silently ignored. The drop hook
    /// recorded at allocation time runs on the object bytes, the marker is
    /// cleared, the block is spliced back preserving ascending address
    /// order, and the chunk's full flag is cleared.
    pub fn free(&mut self, arena: &mut Arena, r: SlabRef) -> Result<(), AllocError> {
        let (idx, word) = self.validate_live(arena, r)?;
        let object_off = r.0;

        let drop_id = self.load_u16(arena, object_off - 10);
        let chunk_off = self.entry_chunk(arena, idx);
        let gap = class_gap(u32::from(word.align()));
        let block_off = object_off - gap;

        // Destructor first, while the object bytes are still intact.
        if drop_id != NO_HOOK {
            if let Some(&hook) = self.drop_hooks.get(usize::from(drop_id)) {
                let abs = self.range.offset() + object_off as usize;
                hook(arena.at_offset_mut(abs, word.size() as usize));
            }
        }

        // Clear the header: the marker must never survive on a free block.
        let abs_header = self.range.offset() + (object_off - 16) as usize;
        arena.at_offset_mut(abs_header, 16).fill(0);

        // Splice back preserving ascending address order. An empty free
        // list (the chunk was fully occupied) makes the freed block the
        // new head; so does a block below the current head.
        let head = self.load_u32(arena, chunk_off);
        if head == NIL || block_off < head {
            self.store_u32(arena, block_off, head);
            self.store_u32(arena, chunk_off, block_off);
        } else {
            let mut cur = head;
            loop {
                let next = self.load_u32(arena, cur);
                if next == NIL || next > block_off {
                    self.store_u32(arena, block_off, next);
                    self.store_u32(arena, cur, block_off);
                    break;
                }
                cur = next;
            }
        }

        let word = self.entry_word(arena, idx);
        self.set_entry_word(arena, idx, word.with_full(false));

        self.bump_counter(arena, STAT_FREES);
        Ok(())
    }

    /// Decode the header of a live block.
    pub fn header(&self, arena: &Arena, r: SlabRef) -> Result<BlockHeader, AllocError> {
        let (idx, _) = self.validate_live(arena, r)?;
        let drop_id = self.load_u16(arena, r.0 - 10);
        let tag = self.load_u64(arena, r.0 - 8);
        Ok(BlockHeader {
            tag: PoolTag(tag),
            class_index: idx as u16,
            drop_hook: (drop_id != NO_HOOK).then_some(DropHookId(drop_id)),
        })
    }

    /// Shared view of a live block's object bytes.
    pub fn block<'a>(&self, arena: &'a Arena, r: SlabRef) -> Result<&'a [u8], AllocError> {
        let (_, word) = self.validate_live(arena, r)?;
        let abs = self.range.offset() + r.0 as usize;
        Ok(arena.at_offset(abs, word.size() as usize))
    }

    /// Mutable view of a live block's object bytes.
    pub fn block_mut<'a>(
        &self,
        arena: &'a mut Arena,
        r: SlabRef,
    ) -> Result<&'a mut [u8], AllocError> {
        let (_, word) = self.validate_live(arena, r)?;
        let abs = self.range.offset() + r.0 as usize;
        Ok(arena.at_offset_mut(abs, word.size() as usize))
    }

    /// The class word of an index entry, for diagnostics and tests.
    pub fn class_word(&self, arena: &Arena, idx: usize) -> Option<ClassWord> {
        (idx < self.class_count).then(|| self.entry_word(arena, idx))
    }

    /// Read the persistent counters from the scratch pad.
    pub fn stats(&self, arena: &Arena) -> SlabStats {
        SlabStats {
            allocations: self.load_stat(arena, STAT_ALLOCATIONS),
            frees: self.load_stat(arena, STAT_FREES),
            chunks: self.load_stat(arena, STAT_CHUNKS),
        }
    }

    // ── internals ──────────────────────────────────────────────────────

    /// Validate that `r` addresses a live block; returns its class index
    /// and class word.
    fn validate_live(&self, arena: &Arena, r: SlabRef) -> Result<(usize, ClassWord), AllocError> {
        let off = r.0;
        if (off as usize) < REGION_START + CHUNK_HEADER_BYTES as usize
            || off as usize > self.range.len()
        {
            return Err(AllocError::UnknownAllocation {
                detail: format!("offset {off} is outside the slab region"),
            });
        }
        if self.load_u32(arena, off - 16) != BLOCK_MAGIC {
            return Err(AllocError::UnknownAllocation {
                detail: format!("no live block header at offset {off}"),
            });
        }
        let idx = usize::from(self.load_u16(arena, off - 12));
        if idx >= self.class_count {
            return Err(AllocError::UnknownAllocation {
                detail: format!("block at offset {off} names an unknown size class {idx}"),
            });
        }
        let word = self.entry_word(arena, idx);
        if u64::from(off) + word.size() > self.range.len() as u64 {
            return Err(AllocError::UnknownAllocation {
                detail: format!("block at offset {off} runs past the slab region"),
            });
        }
        Ok((idx, word))
    }

    /// Carve a fresh chunk for `layout` at the next free index slot.
    fn carve_chunk(
        &mut self,
        arena: &mut Arena,
        layout: ObjectLayout,
        tag: PoolTag,
    ) -> Result<usize, AllocError> {
        let gap = class_gap(layout.align);
        let stride = class_stride(layout.size, layout.align);
        let block_count = (chunk_payload_bytes(layout.size) / u64::from(stride)) as u32;

        if self.class_count == INDEX_CAPACITY {
            return Err(AllocError::OutOfMemory {
                requested: (u64::from(gap) + u64::from(block_count) * u64::from(stride)) as usize,
                available: self.range.len() - self.chunk_cursor as usize,
            });
        }
        if block_count == 0 {
            return Err(AllocError::ContractViolation {
                reason: format!(
                    "layout {} bytes @ align {} yields a chunk with no blocks",
                    layout.size, layout.align
                ),
            });
        }
        debug_assert!(block_count > 2, "chunk must hold more than two blocks");

        let chunk_off = align_word(u64::from(self.chunk_cursor), u64::from(gap)) as u32;
        let total = u64::from(gap) + u64::from(block_count) * u64::from(stride);
        let end = u64::from(chunk_off) + total;
        if end > self.range.len() as u64 {
            return Err(AllocError::OutOfMemory {
                requested: total as usize,
                available: self.range.len() - self.chunk_cursor as usize,
            });
        }

        // Chunk header: free-list head, reserved word, owning tag.
        let blocks_base = chunk_off + gap;
        self.store_u32(arena, chunk_off, blocks_base);
        self.store_u32(arena, chunk_off + 4, 0);
        self.store_u64(arena, chunk_off + 8, tag.0);

        // Thread every block into the free list in ascending address order.
        for i in 0..block_count {
            let block = blocks_base + i * stride;
            let next = if i + 1 < block_count {
                block + stride
            } else {
                NIL
            };
            self.store_u32(arena, block, next);
        }

        let idx = self.class_count;
        self.set_entry_chunk(arena, idx, chunk_off);
        self.set_entry_word(
            arena,
            idx,
            ClassWord::new(u64::from(layout.size), layout.align as u16, false),
        );

        self.class_count += 1;
        self.chunk_cursor = end as u32;
        self.bump_counter(arena, STAT_CHUNKS);
        Ok(idx)
    }

    /// Pop the head of a chunk's free list; sets the full flag when the
    /// last block goes out.
    fn pop_block(&mut self, arena: &mut Arena, idx: usize) -> Option<u32> {
        let chunk_off = self.entry_chunk(arena, idx);
        let head = self.load_u32(arena, chunk_off);
        if head == NIL {
            return None;
        }
        let next = self.load_u32(arena, head);
        self.store_u32(arena, chunk_off, next);
        if next == NIL {
            let word = self.entry_word(arena, idx);
            self.set_entry_word(arena, idx, word.with_full(true));
        }
        Some(head)
    }

    fn entry_chunk(&self, arena: &Arena, idx: usize) -> u32 {
        self.load_u64(arena, (idx * INDEX_ENTRY_BYTES) as u32) as u32
    }

    fn entry_word(&self, arena: &Arena, idx: usize) -> ClassWord {
        ClassWord::from_bits(self.load_u64(arena, (idx * INDEX_ENTRY_BYTES + 8) as u32))
    }

    fn set_entry_chunk(&self, arena: &mut Arena, idx: usize, chunk_off: u32) {
        self.store_u64(arena, (idx * INDEX_ENTRY_BYTES) as u32, u64::from(chunk_off));
    }

    fn set_entry_word(&self, arena: &mut Arena, idx: usize, word: ClassWord) {
        self.store_u64(arena, (idx * INDEX_ENTRY_BYTES + 8) as u32, word.bits());
    }

    fn load_stat(&self, arena: &Arena, slot: usize) -> u64 {
        self.load_u64(arena, slot as u32)
    }

    fn bump_counter(&self, arena: &mut Arena, slot: usize) {
        let v = self.load_u64(arena, slot as u32);
        self.store_u64(arena, slot as u32, v + 1);
    }

    fn load_u16(&self, arena: &Arena, rel: u32) -> u16 {
        let b = arena.at_offset(self.range.offset() + rel as usize, 2);
        u16::from_le_bytes([b[0], b[1]])
    }

    fn store_u16(&self, arena: &mut Arena, rel: u32, v: u16) {
        arena
            .at_offset_mut(self.range.offset() + rel as usize, 2)
            .copy_from_slice(&v.to_le_bytes());
    }

    fn load_u32(&self, arena: &Arena, rel: u32) -> u32 {
        let b = arena.at_offset(self.range.offset() + rel as usize, 4);
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    fn store_u32(&self, arena: &mut Arena, rel: u32, v: u32) {
        arena
            .at_offset_mut(self.range.offset() + rel as usize, 4)
            .copy_from_slice(&v.to_le_bytes());
    }

    fn load_u64(&self, arena: &Arena, rel: u32) -> u64 {
        let b = arena.at_offset(self.range.offset() + rel as usize, 8);
        u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
    }

    fn store_u64(&self, arena: &mut Arena, rel: u32, v: u64) {
        arena
            .at_offset_mut(self.range.offset() + rel as usize, 8)
            .copy_from_slice(&v.to_le_bytes());
    }
}
