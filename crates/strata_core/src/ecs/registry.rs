// registry.rs - Component and tag type registry
//
// Built once per world from a `TypeProvider`. Components are ordered by
// (size, key) and tags by key; the position in that order is the type's id.
// Because component ids follow the canonical row order, an archetype's row
// for a component is the count of present components with a lower id.

use crate::ecs::{
    ArchetypeId, CompTypeId, Component, Tag, TagTypeId, TypeDescriptor, TypeKind, WorldError,
};

/// Source of the types a world can store.
pub trait TypeProvider {
    fn component_types(&self) -> Vec<&'static TypeDescriptor>;
    fn tag_types(&self) -> Vec<&'static TypeDescriptor>;
}

/// Explicit list of types, built up by the caller.
#[derive(Clone, Debug, Default)]
pub struct TypeSet {
    components: Vec<&'static TypeDescriptor>,
    tags: Vec<&'static TypeDescriptor>,
}

impl TypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_component<T: Component>(mut self) -> Self {
        self.components.push(T::descriptor());
        self
    }

    pub fn with_tag<T: Tag>(mut self) -> Self {
        self.tags.push(T::descriptor());
        self
    }

    /// Add a descriptor, routed by its kind.
    pub fn with_descriptor(mut self, descriptor: &'static TypeDescriptor) -> Self {
        match descriptor.kind() {
            TypeKind::Component => self.components.push(descriptor),
            TypeKind::Tag => self.tags.push(descriptor),
        }
        self
    }
}

impl TypeProvider for TypeSet {
    fn component_types(&self) -> Vec<&'static TypeDescriptor> {
        self.components.clone()
    }

    fn tag_types(&self) -> Vec<&'static TypeDescriptor> {
        self.tags.clone()
    }
}

/// Where a type lives inside one archetype.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ArchetypeRecord {
    pub archetype: ArchetypeId,
    /// Row index for components; position among the archetype's tags for tags.
    pub row: usize,
}

/// Registered type plus the archetypes that contain it, sorted by archetype id.
#[derive(Debug)]
pub struct TypeDescription {
    descriptor: &'static TypeDescriptor,
    referenced_archetypes: Vec<ArchetypeRecord>,
}

pub type CompDescription = TypeDescription;
pub type TagDescription = TypeDescription;

impl TypeDescription {
    fn new(descriptor: &'static TypeDescriptor) -> Self {
        Self {
            descriptor,
            referenced_archetypes: Vec::new(),
        }
    }

    #[inline]
    pub fn descriptor(&self) -> &'static TypeDescriptor {
        self.descriptor
    }

    pub fn referenced_archetypes(&self) -> &[ArchetypeRecord] {
        &self.referenced_archetypes
    }

    /// Row of this type in `archetype`, by binary search.
    pub fn row_in(&self, archetype: ArchetypeId) -> Option<usize> {
        self.referenced_archetypes
            .binary_search_by_key(&archetype, |r| r.archetype)
            .ok()
            .map(|i| self.referenced_archetypes[i].row)
    }

    pub(crate) fn record(&mut self, archetype: ArchetypeId, row: usize) {
        let at = self
            .referenced_archetypes
            .partition_point(|r| r.archetype < archetype);
        debug_assert!(self
            .referenced_archetypes
            .get(at)
            .map_or(true, |r| r.archetype != archetype));
        self.referenced_archetypes
            .insert(at, ArchetypeRecord { archetype, row });
    }
}

#[derive(Debug)]
pub struct TypeRegistry {
    components: Vec<CompDescription>,
    tags: Vec<TagDescription>,
}

impl TypeRegistry {
    pub fn new(provider: &impl TypeProvider) -> Result<Self, WorldError> {
        let components = Self::collect(provider.component_types(), TypeKind::Component)?;
        let tags = Self::collect(provider.tag_types(), TypeKind::Tag)?;
        if components.is_empty() && tags.is_empty() {
            return Err(WorldError::NoTypesRegistered);
        }

        let component_names: Vec<_> = components.iter().map(|d| d.name()).collect();
        let tag_names: Vec<_> = tags.iter().map(|d| d.name()).collect();
        tracing::debug!(components = ?component_names, tags = ?tag_names, "type registry built");

        Ok(Self {
            components: components.into_iter().map(TypeDescription::new).collect(),
            tags: tags.into_iter().map(TypeDescription::new).collect(),
        })
    }

    /// Validate, deduplicate and sort one kind of descriptor.
    fn collect(
        mut descriptors: Vec<&'static TypeDescriptor>,
        kind: TypeKind,
    ) -> Result<Vec<&'static TypeDescriptor>, WorldError> {
        if let Some(wrong) = descriptors.iter().find(|d| d.kind() != kind) {
            return Err(WorldError::KindMismatch {
                name: wrong.name(),
                expected: kind,
                actual: wrong.kind(),
            });
        }

        match kind {
            TypeKind::Component => descriptors.sort_by_key(|d| (d.size(), d.key())),
            TypeKind::Tag => descriptors.sort_by_key(|d| d.key()),
        }
        descriptors.dedup_by(|a, b| a.same_type(b));

        let mut by_key: Vec<_> = descriptors.clone();
        by_key.sort_by_key(|d| d.key());
        if let Some(pair) = by_key.windows(2).find(|w| w[0].key() == w[1].key()) {
            return Err(WorldError::DuplicateTypeKey {
                kind,
                key: pair[0].key(),
                first: pair[0].name(),
                second: pair[1].name(),
            });
        }

        Ok(descriptors)
    }

    #[inline]
    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn num_tags(&self) -> usize {
        self.tags.len()
    }

    /// Width of every archetype signature.
    #[inline]
    pub fn signature_len(&self) -> usize {
        self.components.len() + self.tags.len()
    }

    pub fn components(&self) -> &[CompDescription] {
        &self.components
    }

    pub fn tags(&self) -> &[TagDescription] {
        &self.tags
    }

    pub fn component(&self, id: CompTypeId) -> &CompDescription {
        assert!(
            id.index() < self.components.len(),
            "{id} out of range ({} components)",
            self.components.len()
        );
        &self.components[id.index()]
    }

    pub fn tag(&self, id: TagTypeId) -> &TagDescription {
        assert!(
            id.index() < self.tags.len(),
            "{id} out of range ({} tags)",
            self.tags.len()
        );
        &self.tags[id.index()]
    }

    pub(crate) fn component_mut(&mut self, id: CompTypeId) -> &mut CompDescription {
        &mut self.components[id.index()]
    }

    pub(crate) fn tag_mut(&mut self, id: TagTypeId) -> &mut TagDescription {
        &mut self.tags[id.index()]
    }

    #[inline]
    pub fn is_component_id(&self, id: CompTypeId) -> bool {
        id.index() < self.components.len()
    }

    #[inline]
    pub fn is_tag_id(&self, id: TagTypeId) -> bool {
        id.index() < self.tags.len()
    }

    /// Binary search on (size, key), then confirm the Rust type matches.
    pub fn component_id_of(&self, descriptor: &TypeDescriptor) -> Option<CompTypeId> {
        let probe = (descriptor.size(), descriptor.key());
        let index = self
            .components
            .binary_search_by_key(&probe, |c| (c.descriptor.size(), c.descriptor.key()))
            .ok()?;
        self.components[index]
            .descriptor
            .same_type(descriptor)
            .then(|| CompTypeId::from_usize(index))
    }

    pub fn tag_id_of(&self, descriptor: &TypeDescriptor) -> Option<TagTypeId> {
        let index = self
            .tags
            .binary_search_by_key(&descriptor.key(), |t| t.descriptor.key())
            .ok()?;
        self.tags[index]
            .descriptor
            .same_type(descriptor)
            .then(|| TagTypeId::from_usize(index))
    }

    pub fn component_id<T: Component>(&self) -> Option<CompTypeId> {
        self.component_id_of(T::descriptor())
    }

    pub fn tag_id<T: Tag>(&self) -> Option<TagTypeId> {
        self.tag_id_of(T::descriptor())
    }
}
