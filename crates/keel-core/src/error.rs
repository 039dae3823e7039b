//! The subsystem-wide error enumeration.
//!
//! Every fallible operation in the allocator subsystem reports one of the
//! kinds below; success travels as `Ok`. There are no panics-as-API and no
//! retries — each operation is a one-shot synchronous action.

use std::error::Error;
use std::fmt;

/// Errors produced by the keel allocators.
///
/// `OutOfMemory` is the only kind a caller is expected to recover from
/// (fall back to a larger reservation or reject the request); the
/// remaining kinds indicate misuse and exist so that release builds report
/// the problem instead of silently corrupting adjacent memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// The underlying acquisition failed or the target region is exhausted.
    OutOfMemory {
        /// Number of bytes the failing request asked for.
        requested: usize,
        /// Bytes still available in the target region at the time of the
        /// request (zero when the platform acquisition itself failed).
        available: usize,
    },
    /// An allocator could not be constructed from the given inputs.
    CreationFailed {
        /// Human-readable construction failure description.
        reason: String,
    },
    /// A request parameter is malformed (zero count, layout mismatch,
    /// non-power-of-two alignment in a packed request, oversized field).
    InvalidArgument {
        /// What was wrong with the argument.
        reason: String,
    },
    /// A documented usage contract was violated (push past capacity,
    /// staging request at or above the half-buffer limit). Reported
    /// uniformly in every build profile.
    ContractViolation {
        /// The violated contract.
        reason: String,
    },
    /// A free/release named an allocation this allocator does not own
    /// (unknown tag, offset without a live block header, double free).
    UnknownAllocation {
        /// What the caller tried to release.
        detail: String,
    },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory {
                requested,
                available,
            } => {
                write!(
                    f,
                    "out of memory: requested {requested} bytes, {available} bytes available"
                )
            }
            Self::CreationFailed { reason } => {
                write!(f, "allocator creation failed: {reason}")
            }
            Self::InvalidArgument { reason } => {
                write!(f, "invalid argument: {reason}")
            }
            Self::ContractViolation { reason } => {
                write!(f, "contract violation: {reason}")
            }
            Self::UnknownAllocation { detail } => {
                write!(f, "unknown allocation: {detail}")
            }
        }
    }
}

impl Error for AllocError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_byte_counts() {
        let err = AllocError::OutOfMemory {
            requested: 4096,
            available: 128,
        };
        let text = err.to_string();
        assert!(text.contains("4096"));
        assert!(text.contains("128"));
    }

    #[test]
    fn display_includes_reason() {
        let err = AllocError::ContractViolation {
            reason: "push of 9000 bytes exceeds the remaining 8 bytes".into(),
        };
        assert!(err.to_string().contains("9000"));
    }

    #[test]
    fn errors_are_comparable() {
        let a = AllocError::InvalidArgument {
            reason: "zero count".into(),
        };
        let b = AllocError::InvalidArgument {
            reason: "zero count".into(),
        };
        assert_eq!(a, b);
    }
}
