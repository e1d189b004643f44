//! Typed indices for entities, registered types and archetypes.
//!
//! Every id is a `u32` index with a reserved `NONE` sentinel. The newtypes
//! keep the four index spaces from being mixed up at call sites.

use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $name {
            /// Sentinel for "not assigned".
            pub const NONE: Self = Self(u32::MAX);

            #[inline]
            pub const fn new(index: u32) -> Self {
                Self(index)
            }

            #[inline]
            pub(crate) fn from_usize(index: usize) -> Self {
                assert!(
                    index < u32::MAX as usize,
                    concat!($label, " index {} exceeds the id space"),
                    index
                );
                Self(index as u32)
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            #[inline]
            pub const fn is_assigned(self) -> bool {
                self.0 != u32::MAX
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::NONE
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_assigned() {
                    write!(f, concat!($label, "#{}"), self.0)
                } else {
                    f.write_str(concat!($label, "#none"))
                }
            }
        }
    };
}

define_id!(
    /// Slot in the world's entity index. Freed ids are handed out again,
    /// lowest first.
    EntityId,
    "entity"
);
define_id!(
    /// Position of a component type in the registry's (size, key) ordering.
    CompTypeId,
    "component"
);
define_id!(
    /// Position of a tag type in the registry's key ordering.
    TagTypeId,
    "tag"
);
define_id!(
    /// Registration order of an archetype.
    ArchetypeId,
    "archetype"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unassigned() {
        assert_eq!(EntityId::default(), EntityId::NONE);
        assert!(!ArchetypeId::NONE.is_assigned());
        assert!(CompTypeId::new(0).is_assigned());
    }

    #[test]
    fn test_display() {
        assert_eq!(EntityId::new(7).to_string(), "entity#7");
        assert_eq!(TagTypeId::NONE.to_string(), "tag#none");
    }

    #[test]
    fn test_from_usize_roundtrips_index() {
        let id = ArchetypeId::from_usize(42);
        assert_eq!(id.index(), 42);
        assert_eq!(id.raw(), 42);
    }
}
