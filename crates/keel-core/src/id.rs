//! Strongly-typed allocation tags.

use std::fmt;

/// Opaque 64-bit tag grouping allocations by owner.
///
/// Collaborating subsystems (renderer, scene, audio) pick their own tag
/// values — typically a hashed resource name or a subsystem constant — and
/// the allocators treat them as pure identity: tags are compared, never
/// interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolTag(pub u64);

impl fmt::Display for PoolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for PoolTag {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_as_hex() {
        assert_eq!(PoolTag(0xBEEF).to_string(), "0xbeef");
    }

    #[test]
    fn from_u64_round_trip() {
        let tag = PoolTag::from(42u64);
        assert_eq!(tag, PoolTag(42));
    }
}
