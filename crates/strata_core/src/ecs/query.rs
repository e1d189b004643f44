// query.rs - Read/write component queries
//
// A query names the components it reads, the components it writes, and
// tags that must be present. Resolving it against the registry produces a
// signature; every archetype whose signature is a superset matches.

use crate::ecs::storage::Bitmask;
use crate::ecs::{
    ArchetypeId, CompTypeId, Component, QueryError, Tag, TypeDescriptor, TypeRegistry, WorldError,
};
use std::cell::Cell;
use std::marker::PhantomData;

/// Writable components per query, bounded by the borrow tracking word.
pub const MAX_QUERY_WRITES: usize = u64::BITS as usize;

#[derive(Clone, Debug, Default)]
pub struct Query {
    reads: Vec<&'static TypeDescriptor>,
    writes: Vec<&'static TypeDescriptor>,
    tags: Vec<&'static TypeDescriptor>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `T` and hand it to the visitor read-only.
    pub fn read<T: Component>(mut self) -> Self {
        Self::push_unique(&mut self.reads, T::descriptor());
        self
    }

    /// Require `T` and hand it to the visitor mutably.
    pub fn write<T: Component>(mut self) -> Self {
        Self::push_unique(&mut self.writes, T::descriptor());
        self
    }

    /// Require tag `T`.
    pub fn tag<T: Tag>(mut self) -> Self {
        Self::push_unique(&mut self.tags, T::descriptor());
        self
    }

    pub fn reads(&self) -> &[&'static TypeDescriptor] {
        &self.reads
    }

    pub fn writes(&self) -> &[&'static TypeDescriptor] {
        &self.writes
    }

    pub fn tags(&self) -> &[&'static TypeDescriptor] {
        &self.tags
    }

    fn push_unique(list: &mut Vec<&'static TypeDescriptor>, descriptor: &'static TypeDescriptor) {
        if !list.iter().any(|d| d.same_type(descriptor)) {
            list.push(descriptor);
        }
    }

    pub(crate) fn resolve(&self, types: &TypeRegistry) -> Result<ResolvedQuery, WorldError> {
        if self.reads.is_empty() && self.writes.is_empty() {
            return Err(QueryError::Empty.into());
        }
        if let Some(both) = self
            .reads
            .iter()
            .find(|r| self.writes.iter().any(|w| w.same_type(r)))
        {
            return Err(QueryError::Overlap { name: both.name() }.into());
        }
        if self.writes.len() > MAX_QUERY_WRITES {
            return Err(QueryError::TooManyWrites {
                count: self.writes.len(),
                max: MAX_QUERY_WRITES,
            }
            .into());
        }

        let lookup = |descriptor: &'static TypeDescriptor| {
            types
                .component_id_of(descriptor)
                .map(|id| (id, descriptor))
                .ok_or(WorldError::UnregisteredComponent {
                    name: descriptor.name(),
                })
        };
        let reads = self.reads.iter().map(|&d| lookup(d)).collect::<Result<Vec<_>, _>>()?;
        let writes = self.writes.iter().map(|&d| lookup(d)).collect::<Result<Vec<_>, _>>()?;

        let num_components = types.num_components();
        let mut signature = Bitmask::with_len(types.signature_len());
        for (id, _) in reads.iter().chain(&writes) {
            signature.set(id.index());
        }
        for &tag in &self.tags {
            let id = types
                .tag_id_of(tag)
                .ok_or(WorldError::UnregisteredTag { name: tag.name() })?;
            signature.set(num_components + id.index());
        }

        Ok(ResolvedQuery {
            signature,
            reads,
            writes,
        })
    }
}

/// Query bound to one registry.
#[derive(Debug)]
pub(crate) struct ResolvedQuery {
    pub(crate) signature: Bitmask,
    pub(crate) reads: Vec<(CompTypeId, &'static TypeDescriptor)>,
    pub(crate) writes: Vec<(CompTypeId, &'static TypeDescriptor)>,
}

/// Address of one requested component in the current column.
#[derive(Clone, Copy)]
pub(crate) struct QuerySlot {
    pub(crate) descriptor: &'static TypeDescriptor,
    pub(crate) ptr: *mut u8,
}

/// Access to the requested components of one live column.
pub struct QueryRow<'a> {
    archetype: ArchetypeId,
    column: usize,
    reads: &'a [QuerySlot],
    writes: &'a [QuerySlot],
    borrowed: Cell<u64>,
    _world: PhantomData<&'a mut ()>,
}

impl<'a> QueryRow<'a> {
    pub(crate) fn new(
        archetype: ArchetypeId,
        column: usize,
        reads: &'a [QuerySlot],
        writes: &'a [QuerySlot],
    ) -> Self {
        Self {
            archetype,
            column,
            reads,
            writes,
            borrowed: Cell::new(0),
            _world: PhantomData,
        }
    }

    #[inline]
    pub fn archetype(&self) -> ArchetypeId {
        self.archetype
    }

    #[inline]
    pub fn column(&self) -> usize {
        self.column
    }

    /// Shared access to a component in the query's read set.
    pub fn read<T: Component>(&self) -> &T {
        let slot = self
            .reads
            .iter()
            .find(|s| s.descriptor.is::<T>())
            .unwrap_or_else(|| panic!("{} is not in the query's read set", T::NAME));
        // Safety: the slot points at a live T; reads are never handed out mutably.
        unsafe { &*slot.ptr.cast::<T>() }
    }

    /// Exclusive access to a component in the query's write set. Each write
    /// component can be borrowed once per row.
    #[allow(clippy::mut_from_ref)]
    pub fn write<T: Component>(&self) -> &mut T {
        let index = self
            .writes
            .iter()
            .position(|s| s.descriptor.is::<T>())
            .unwrap_or_else(|| panic!("{} is not in the query's write set", T::NAME));
        let bit = 1u64 << index;
        let borrowed = self.borrowed.get();
        assert!(borrowed & bit == 0, "{} is already borrowed mutably", T::NAME);
        self.borrowed.set(borrowed | bit);
        // Safety: the slot points at a live T and the bit above ensures this is
        // the only reference to it for the lifetime of this row.
        unsafe { &mut *self.writes[index].ptr.cast::<T>() }
    }
}
