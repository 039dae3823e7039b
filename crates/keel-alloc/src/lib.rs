//! Frame-loop allocators for real-time interactive applications.
//!
//! keel avoids general-purpose heap traffic on hot paths (per-frame scratch
//! data, staging uploads, small fixed-size object churn) by layering four
//! allocation strategies over one large pre-reserved region:
//!
//! ```text
//! MemoryContext (owning orchestrator, created by the frame-loop driver)
//! ├── Arena               — the single reservation; carves ArenaRanges at startup
//! ├── LinearAllocator     — bump scratch over a carved range, bulk clear
//! ├── DoubleBufferAllocator — two linear halves, current/next staging roles
//! ├── SegmentedSlab       — size-classed chunks, intrusive in-bytes free lists
//! └── TaggedPool          — tag-keyed, separately-acquired typed blocks
//! ```
//!
//! Sub-allocators never hold borrows into the arena: they store
//! [`ArenaRange`] index descriptors and take `&mut Arena` per call, so the
//! borrow checker enforces the "never outlive the arena" contract
//! structurally and the whole crate stays free of `unsafe`.
//!
//! Everything here is single-threaded: one logical owner (the
//! simulation/render loop) drives every call, nothing suspends, and every
//! operation either completes or reports an [`AllocError`](keel_core::AllocError)
//! synchronously.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod align;
pub mod arena;
pub mod config;
pub mod context;
pub mod double_buffer;
pub mod linear;
pub mod slab;
pub mod tagged_pool;

// Public re-exports for the primary API surface.
pub use arena::{Arena, ArenaRange};
pub use config::AllocConfig;
pub use context::{ContextParts, FrameScope, MemoryContext};
pub use double_buffer::{BufferWord, DoubleBufferAllocator, Side};
pub use linear::LinearAllocator;
pub use slab::{
    BlockHeader, ClassWord, DropHook, DropHookId, ObjectLayout, SegmentedSlab, SlabRef, SlabStats,
    MIN_SLAB_BYTES,
};
pub use tagged_pool::TaggedPool;
