//! Core types for the keel frame-loop memory subsystem.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! vocabulary shared by every allocator in the workspace: opaque allocation
//! tags, the packed size/alignment calling convention, the tagged-pool
//! allocation spec, and the subsystem-wide error enumeration.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod packed;

pub use error::AllocError;
pub use id::PoolTag;
pub use packed::{AllocSpec, SizeAlign};
