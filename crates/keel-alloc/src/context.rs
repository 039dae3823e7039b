//! The owning memory context: every allocator, one explicit object.
//!
//! [`MemoryContext`] replaces the process-wide singleton allocators of
//! older engine designs with an explicitly constructed object: the
//! top-level frame-loop driver creates it, passes it (or its
//! [`parts`](MemoryContext::parts)) to collaborators, and drops it when
//! the loop ends — lifetime and teardown order are visible in the code
//! instead of implied by static initialisation order.
//!
//! The context also carries the frame protocol the double buffer needs:
//! the buffer itself never flips, so the context tracks which side is
//! semantically active, clears the write side at
//! [`begin_frame`](MemoryContext::begin_frame), and swaps its own notion
//! of the active side at [`end_frame`](MemoryContext::end_frame).

use keel_core::{AllocError, PoolTag, SizeAlign};

use crate::align::align_address;
use crate::arena::Arena;
use crate::config::AllocConfig;
use crate::double_buffer::{DoubleBufferAllocator, Side};
use crate::linear::LinearAllocator;
use crate::slab::{BlockHeader, DropHook, DropHookId, ObjectLayout, SegmentedSlab, SlabRef, SlabStats};
use crate::tagged_pool::TaggedPool;

/// Split-borrow view of every part of the context.
///
/// Hot-path collaborators that want to wire allocators and arena together
/// themselves borrow all parts at once instead of going through the
/// convenience methods.
pub struct ContextParts<'a> {
    /// The reservation every range indexes into.
    pub arena: &'a mut Arena,
    /// Per-frame scratch allocator.
    pub scratch: &'a mut LinearAllocator,
    /// Double-buffered staging allocator.
    pub staging: &'a mut DoubleBufferAllocator,
    /// Segmented slab for fixed-size object churn.
    pub slab: &'a mut SegmentedSlab,
    /// Tag-keyed pool of typed blocks.
    pub pool: &'a mut TaggedPool,
}

/// Write access for one frame.
///
/// Created by [`MemoryContext::begin_frame`]; dropped before
/// [`MemoryContext::end_frame`]. Scratch pushes and staging writes go
/// through the scope so they always target the correct side.
#[must_use]
pub struct FrameScope<'a> {
    arena: &'a mut Arena,
    scratch: &'a mut LinearAllocator,
    staging: &'a mut DoubleBufferAllocator,
    write: Side,
}

impl FrameScope<'_> {
    /// Push per-frame scratch data; discarded at the next `begin_frame`.
    pub fn push_scratch(&mut self, src: &[u8], req: SizeAlign) -> Result<usize, AllocError> {
        self.scratch.push(self.arena, src, req)
    }

    /// Stage data for the next frame on the write side of the double
    /// buffer.
    pub fn stage(&mut self, src: &[u8], req: SizeAlign) -> Result<usize, AllocError> {
        self.staging.push_on(self.arena, self.write, src, req)
    }

    /// The side this frame's staging writes land on.
    pub fn staged_side(&self) -> Side {
        self.write
    }

    /// Read bytes previously pushed or staged, by absolute arena offset.
    pub fn read(&self, offset: usize, len: usize) -> &[u8] {
        self.arena.at_offset(offset, len)
    }
}

/// Owner of the arena and every allocator carved from it.
pub struct MemoryContext {
    scratch: LinearAllocator,
    staging: DoubleBufferAllocator,
    slab: SegmentedSlab,
    pool: TaggedPool,
    /// The reservation everything above indexes into; declared last so
    /// teardown order reads explicitly: bookkeeping first, bytes last.
    arena: Arena,
    config: AllocConfig,
    /// The staging side the frame protocol currently treats as active
    /// (readable). Writes go to the other side.
    active: Side,
    frame: u64,
}

impl MemoryContext {
    /// Reserve the arena, carve every range, and construct the allocators.
    ///
    /// Sizing problems are reported as `InvalidArgument` before anything
    /// is reserved; a failed reservation reports `OutOfMemory`.
    pub fn new(config: AllocConfig) -> Result<Self, AllocError> {
        if !config.arena_align.is_power_of_two() {
            return Err(AllocError::InvalidArgument {
                reason: format!(
                    "arena alignment {} is not a power of two",
                    config.arena_align
                ),
            });
        }

        // Exact carve feasibility: replay the carve cursor including
        // alignment padding.
        let mut cursor = 0usize;
        for bytes in [config.scratch_bytes, config.staging_bytes, config.slab_bytes] {
            if bytes == 0 {
                return Err(AllocError::InvalidArgument {
                    reason: "every carved range must be non-zero".into(),
                });
            }
            cursor = align_address(cursor, config.arena_align) + bytes;
        }
        if cursor > config.rounded_arena_bytes() {
            return Err(AllocError::InvalidArgument {
                reason: format!(
                    "carves need {cursor} bytes but the arena rounds to {}",
                    config.rounded_arena_bytes()
                ),
            });
        }

        let mut arena = Arena::reserve(config.arena_bytes, config.arena_align)?;
        let scratch_range = arena.carve(config.scratch_bytes, config.arena_align)?;
        let staging_range = arena.carve(config.staging_bytes, config.arena_align)?;
        let slab_range = arena.carve(config.slab_bytes, config.arena_align)?;

        let scratch = LinearAllocator::new(scratch_range);
        let staging = DoubleBufferAllocator::new(staging_range)?;
        let slab = SegmentedSlab::new(slab_range, &mut arena)?;
        let active = staging.current_side();

        Ok(Self {
            scratch,
            staging,
            slab,
            pool: TaggedPool::new(),
            arena,
            config,
            active,
            frame: 0,
        })
    }

    /// Borrow every part at once for hand-wired hot paths.
    pub fn parts(&mut self) -> ContextParts<'_> {
        ContextParts {
            arena: &mut self.arena,
            scratch: &mut self.scratch,
            staging: &mut self.staging,
            slab: &mut self.slab,
            pool: &mut self.pool,
        }
    }

    /// Begin a frame: reset the scratch allocator and the staging side
    /// this frame will write, then hand out write access.
    pub fn begin_frame(&mut self) -> FrameScope<'_> {
        self.scratch.clear();
        let write = self.active.other();
        self.staging.clear_on(write);
        FrameScope {
            arena: &mut self.arena,
            scratch: &mut self.scratch,
            staging: &mut self.staging,
            write,
        }
    }

    /// End a frame: what was staged becomes the active side.
    pub fn end_frame(&mut self) {
        self.active = self.active.other();
        self.frame += 1;
    }

    /// Frames completed so far.
    pub fn frame_index(&self) -> u64 {
        self.frame
    }

    /// The staging side currently holding the active (readable) data.
    pub fn active_side(&self) -> Side {
        self.active
    }

    /// Allocate a slab block.
    pub fn slab_allocate(
        &mut self,
        layout: ObjectLayout,
        tag: PoolTag,
        match_tag: bool,
        drop_hook: Option<DropHookId>,
    ) -> Result<SlabRef, AllocError> {
        self.slab
            .allocate(&mut self.arena, layout, tag, match_tag, drop_hook)
    }

    /// Free a slab block.
    pub fn slab_free(&mut self, r: SlabRef) -> Result<(), AllocError> {
        self.slab.free(&mut self.arena, r)
    }

    /// Shared view of a live slab block's object bytes.
    pub fn slab_block(&self, r: SlabRef) -> Result<&[u8], AllocError> {
        self.slab.block(&self.arena, r)
    }

    /// Mutable view of a live slab block's object bytes.
    pub fn slab_block_mut(&mut self, r: SlabRef) -> Result<&mut [u8], AllocError> {
        self.slab.block_mut(&mut self.arena, r)
    }

    /// Decode a live slab block's header.
    pub fn slab_header(&self, r: SlabRef) -> Result<BlockHeader, AllocError> {
        self.slab.header(&self.arena, r)
    }

    /// The slab's persistent counters.
    pub fn slab_stats(&self) -> SlabStats {
        self.slab.stats(&self.arena)
    }

    /// Register a drop capability with the slab.
    pub fn register_drop_hook(&mut self, hook: DropHook) -> Result<DropHookId, AllocError> {
        self.slab.register_drop_hook(hook)
    }

    /// The tagged pool.
    pub fn pool(&self) -> &TaggedPool {
        &self.pool
    }

    /// The tagged pool, mutably.
    pub fn pool_mut(&mut self) -> &mut TaggedPool {
        &mut self.pool
    }

    /// Read-only view of the arena.
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// The configuration the context was built with.
    pub fn config(&self) -> &AllocConfig {
        &self.config
    }

    /// Total bytes held: the arena reservation plus pool blocks.
    pub fn memory_bytes(&self) -> usize {
        self.arena.memory_bytes() + self.pool.memory_bytes()
    }
}
