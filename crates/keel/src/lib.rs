//! keel: frame-loop memory for real-time interactive applications.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the keel sub-crates. For most users, adding `keel` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use keel::prelude::*;
//!
//! // The frame-loop driver owns the context; collaborators borrow it.
//! let mut ctx = MemoryContext::new(AllocConfig::default()).unwrap();
//!
//! // Per-frame scratch data, reset at every frame boundary.
//! let mut frame = ctx.begin_frame();
//! let pos = frame
//!     .push_scratch(&7u32.to_le_bytes(), SizeAlign::of::<u32>())
//!     .unwrap();
//! assert_eq!(frame.read(pos, 4), &7u32.to_le_bytes()[..]);
//!
//! // Staged data becomes readable on the active side next frame.
//! let staged = frame.stage(&[1u8, 2, 3, 4], SizeAlign::new(4, 4)).unwrap();
//! drop(frame);
//! ctx.end_frame();
//! assert_eq!(ctx.arena().at_offset(staged, 4), &[1, 2, 3, 4]);
//!
//! // Fixed-size object churn goes through the segmented slab.
//! let layout = ObjectLayout::of::<[f32; 3]>();
//! let block = ctx.slab_allocate(layout, PoolTag(0xC0FFEE), false, None).unwrap();
//! ctx.slab_block_mut(block).unwrap().fill(0x11);
//! ctx.slab_free(block).unwrap();
//! assert_eq!(ctx.slab_stats().live(), 0);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`alloc`] | `keel-alloc` | Arena, allocators, memory context |
//! | [`types`] | `keel-core` | Tags, packed conventions, error enumeration |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Arena, allocators, and the memory context (`keel-alloc`).
pub use keel_alloc as alloc;

/// Core types: tags, packed conventions, errors (`keel-core`).
pub use keel_core as types;

pub mod prelude {
    //! Single-import surface for typical users.

    pub use keel_alloc::{
        AllocConfig, Arena, ArenaRange, DoubleBufferAllocator, LinearAllocator, MemoryContext,
        ObjectLayout, SegmentedSlab, Side, SlabRef, TaggedPool,
    };
    pub use keel_core::{AllocError, AllocSpec, PoolTag, SizeAlign};
}
