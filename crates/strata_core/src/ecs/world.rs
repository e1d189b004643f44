// world.rs - Entity storage front door
//
// The world owns the type registry, every archetype and the entity index.
// Entities are placed in the archetype matching their component and tag set
// at spawn and never move.

use crate::config::WorldSettings;
use crate::ecs::query::{QuerySlot, ResolvedQuery};
use crate::ecs::storage::Archetype;
use crate::ecs::{
    ArchetypeId, ArchetypeRegistry, CompTypeId, Component, DynamicValue, EntityBuilder, EntityId,
    EntityIndex, EntityRecord, Query, QueryRow, ReferenceCollector, Tag, TagTypeId, TypeProvider,
    TypeRegistry, WorldError,
};
use strata_metrics::Counter;

/// Archetype-based entity storage.
pub struct World {
    settings: WorldSettings,
    types: TypeRegistry,
    archetypes: ArchetypeRegistry,
    entities: EntityIndex,
    counters: Counter,
}

impl World {
    /// Create a world that can store the provider's types.
    pub fn new(provider: &impl TypeProvider, settings: WorldSettings) -> Result<Self, WorldError> {
        settings.validate()?;
        Ok(Self {
            settings,
            types: TypeRegistry::new(provider)?,
            archetypes: ArchetypeRegistry::new(),
            entities: EntityIndex::new(),
            counters: Counter::new(),
        })
    }

    #[inline]
    pub fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    #[inline]
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Storage event counters (empty unless the `metrics` feature is on).
    #[inline]
    pub fn counters(&self) -> &Counter {
        &self.counters
    }

    #[inline]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().map(|(id, _)| id)
    }

    pub fn component_id<T: Component>(&self) -> Result<CompTypeId, WorldError> {
        self.types
            .component_id::<T>()
            .ok_or(WorldError::UnregisteredComponent { name: T::NAME })
    }

    pub fn tag_id<T: Tag>(&self) -> Result<TagTypeId, WorldError> {
        self.types
            .tag_id::<T>()
            .ok_or(WorldError::UnregisteredTag { name: T::NAME })
    }

    /// Spawn an entity, moving the builder's values into storage.
    pub fn spawn(&mut self, builder: EntityBuilder) -> Result<EntityId, WorldError> {
        let (values, tag_types) = builder.into_parts();

        let mut comps = Vec::with_capacity(values.len());
        for value in &values {
            let Some(descriptor) = value.descriptor() else {
                continue;
            };
            let id = self
                .types
                .component_id_of(descriptor)
                .ok_or(WorldError::UnregisteredComponent {
                    name: descriptor.name(),
                })?;
            if comps.contains(&id) {
                return Err(WorldError::DuplicateComponent {
                    name: descriptor.name(),
                });
            }
            comps.push(id);
        }
        let tags = tag_types
            .iter()
            .map(|&tag| {
                self.types
                    .tag_id_of(tag)
                    .ok_or(WorldError::UnregisteredTag { name: tag.name() })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let archetype_id = self.find_or_create_archetype(&comps, &tags);
        let chunk = self.settings.alloc_chunk_size;
        let archetype = self.archetype_mut(archetype_id);

        let column = match archetype.find_first_uninitialized_column(0) {
            Some(column) => column,
            None => archetype.add_uninitialized(chunk),
        };
        for (value, &comp) in values.into_iter().filter(DynamicValue::is_valid).zip(&comps) {
            let row = archetype.get_row_for(comp);
            let dst = archetype.ptr_at(row, column);
            // Safety: the column is not live, so dst holds no value, and the
            // row's type is the value's type.
            unsafe { value.move_into(dst) };
        }
        // Safety: the archetype's rows are exactly `comps`, all written above.
        unsafe { archetype.mark_initialized(column) };

        Ok(self.register_entity(archetype_id, column))
    }

    /// Spawn an entity with every listed component default-constructed.
    pub fn spawn_defaulted(
        &mut self,
        comps: &[CompTypeId],
        tags: &[TagTypeId],
    ) -> Result<EntityId, WorldError> {
        if let Some(&bad) = comps.iter().find(|&&c| !self.types.is_component_id(c)) {
            return Err(WorldError::UnknownComponentId(bad));
        }
        if let Some(&bad) = tags.iter().find(|&&t| !self.types.is_tag_id(t)) {
            return Err(WorldError::UnknownTagId(bad));
        }

        let archetype_id = self.find_or_create_archetype(comps, tags);
        let chunk = self.settings.alloc_chunk_size;
        let column = self
            .archetype_mut(archetype_id)
            .add_at_first_uninitialized(None, chunk);
        Ok(self.register_entity(archetype_id, column))
    }

    /// Spawn a copy of `source` into the same archetype.
    pub fn spawn_cloned(&mut self, source: EntityId) -> Result<EntityId, WorldError> {
        let record = self.record(source)?;
        let chunk = self.settings.alloc_chunk_size;
        let archetype = self.archetype_mut(record.archetype);

        // Snapshot first: growing the archetype may move its rows.
        let snapshot: Vec<DynamicValue> = archetype
            .rows()
            .iter()
            .enumerate()
            .map(|(row, r)| {
                // Safety: the source column is live in every row.
                unsafe { DynamicValue::from_raw(r.descriptor(), archetype.ptr_at(row, record.column)) }
            })
            .collect();
        let column = archetype.add_at_first_uninitialized(Some(&snapshot), chunk);

        Ok(self.register_entity(record.archetype, column))
    }

    /// Destroy an entity's values and free its id.
    pub fn destroy(&mut self, entity: EntityId) -> Result<(), WorldError> {
        let record = self
            .entities
            .remove(entity)
            .ok_or(WorldError::InvalidEntity(entity))?;
        let destroyed = self.archetype_mut(record.archetype).destruct_at(record.column);
        debug_assert!(destroyed, "{entity} pointed at a dead column");

        tracing::trace!(%entity, archetype = %record.archetype, column = record.column, "destroyed entity");
        strata_metrics::metrics! {
            self.counters.increment("entities_destroyed", 1);
        }
        Ok(())
    }

    #[inline]
    pub fn is_valid(&self, entity: EntityId) -> bool {
        self.entities.is_valid(entity)
    }

    pub fn archetype_of(&self, entity: EntityId) -> Result<ArchetypeId, WorldError> {
        Ok(self.record(entity)?.archetype)
    }

    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id)
    }

    /// Archetype holding exactly these components and tags, if one has been
    /// created. Never creates one.
    pub fn find_archetype(
        &self,
        comps: &[CompTypeId],
        tags: &[TagTypeId],
    ) -> Result<Option<ArchetypeId>, WorldError> {
        if let Some(&comp) = comps.iter().find(|&&c| !self.types.is_component_id(c)) {
            return Err(WorldError::UnknownComponentId(comp));
        }
        if let Some(&tag) = tags.iter().find(|&&t| !self.types.is_tag_id(t)) {
            return Err(WorldError::UnknownTagId(tag));
        }
        let signature = ArchetypeRegistry::signature_for(&self.types, comps, tags);
        Ok(self.archetypes.find(&signature))
    }

    /// Archetypes in creation order.
    pub fn archetypes(&self) -> impl Iterator<Item = &Archetype> + '_ {
        self.archetypes.iter()
    }

    /// `Ok(None)` when the entity's archetype has no `T`.
    pub fn get_component<T: Component>(&self, entity: EntityId) -> Result<Option<&T>, WorldError> {
        let record = self.record(entity)?;
        let comp = self.component_id::<T>()?;
        let archetype = self.archetype_ref(record.archetype);
        Ok(archetype
            .find_row_for(comp)
            .and_then(|row| archetype.get::<T>(row, record.column)))
    }

    pub fn get_component_mut<T: Component>(
        &mut self,
        entity: EntityId,
    ) -> Result<Option<&mut T>, WorldError> {
        let record = self.record(entity)?;
        let comp = self.component_id::<T>()?;
        let archetype = self.archetype_mut(record.archetype);
        Ok(match archetype.find_row_for(comp) {
            Some(row) => archetype.get_mut::<T>(row, record.column),
            None => None,
        })
    }

    pub fn has_component(&self, entity: EntityId, comp: CompTypeId) -> Result<bool, WorldError> {
        let record = self.record(entity)?;
        if !self.types.is_component_id(comp) {
            return Err(WorldError::UnknownComponentId(comp));
        }
        Ok(self.archetype_ref(record.archetype).has_component(comp))
    }

    pub fn has_tag(&self, entity: EntityId, tag: TagTypeId) -> Result<bool, WorldError> {
        let record = self.record(entity)?;
        if !self.types.is_tag_id(tag) {
            return Err(WorldError::UnknownTagId(tag));
        }
        let bit = self.types.num_components() + tag.index();
        Ok(self.archetype_ref(record.archetype).signature().test(bit))
    }

    /// Archetypes a query would visit, without visiting them.
    pub fn matching_archetypes(&self, query: &Query) -> Result<Vec<ArchetypeId>, WorldError> {
        let resolved = query.resolve(&self.types)?;
        Ok(self
            .archetypes
            .iter()
            .filter(|a| self.matches(&resolved, a))
            .map(Archetype::id)
            .collect())
    }

    /// Visit every live column of every matching archetype, in archetype
    /// creation order and then ascending column order. Returns the number of
    /// columns visited.
    pub fn run_query<F>(&mut self, query: &Query, mut visitor: F) -> Result<usize, WorldError>
    where
        F: FnMut(&QueryRow<'_>),
    {
        let resolved = query.resolve(&self.types)?;
        let mut visited = 0;
        let mut reads = Vec::with_capacity(resolved.reads.len());
        let mut writes = Vec::with_capacity(resolved.writes.len());

        for archetype in self.archetypes.iter() {
            if !self.matches(&resolved, archetype) {
                continue;
            }
            let read_rows: Vec<_> = resolved
                .reads
                .iter()
                .map(|&(id, descriptor)| (archetype.get_row_for(id), descriptor))
                .collect();
            let write_rows: Vec<_> = resolved
                .writes
                .iter()
                .map(|&(id, descriptor)| (archetype.get_row_for(id), descriptor))
                .collect();

            for column in archetype.initialized_columns() {
                let slot = |&(row, descriptor): &(usize, _)| QuerySlot {
                    descriptor,
                    ptr: archetype.ptr_at(row, column),
                };
                reads.clear();
                reads.extend(read_rows.iter().map(slot));
                writes.clear();
                writes.extend(write_rows.iter().map(slot));

                visitor(&QueryRow::new(archetype.id(), column, &reads, &writes));
                visited += 1;
            }
        }
        Ok(visited)
    }

    /// Report every stored type and every external reference held by live values.
    pub fn collect_references(&self, collector: &mut dyn ReferenceCollector) {
        for archetype in self.archetypes.iter() {
            archetype.collect_references(collector);
        }
    }

    fn matches(&self, resolved: &ResolvedQuery, archetype: &Archetype) -> bool {
        resolved
            .signature
            .is_subset_of(archetype.signature(), self.types.signature_len())
    }

    fn find_or_create_archetype(&mut self, comps: &[CompTypeId], tags: &[TagTypeId]) -> ArchetypeId {
        let before = self.archetypes.len();
        let id = self
            .archetypes
            .find_or_create(&mut self.types, comps, tags, &self.settings);
        if self.archetypes.len() != before {
            strata_metrics::metrics! {
                self.counters.increment("archetypes_created", 1);
            }
        }
        id
    }

    fn register_entity(&mut self, archetype: ArchetypeId, column: usize) -> EntityId {
        let entity = self.entities.insert(EntityRecord { archetype, column });
        tracing::trace!(%entity, %archetype, column, "spawned entity");
        strata_metrics::metrics! {
            self.counters.increment("entities_spawned", 1);
            self.counters
                .set("columns_allocated", self.archetypes.iter().map(Archetype::column_count).sum());
        }
        entity
    }

    fn record(&self, entity: EntityId) -> Result<EntityRecord, WorldError> {
        self.entities
            .get(entity)
            .ok_or(WorldError::InvalidEntity(entity))
    }

    fn archetype_ref(&self, id: ArchetypeId) -> &Archetype {
        match self.archetypes.get(id) {
            Some(archetype) => archetype,
            None => panic!("entity index points at missing {id}"),
        }
    }

    fn archetype_mut(&mut self, id: ArchetypeId) -> &mut Archetype {
        match self.archetypes.get_mut(id) {
            Some(archetype) => archetype,
            None => panic!("entity index points at missing {id}"),
        }
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entities.len())
            .field("archetypes", &self.archetypes.len())
            .field("settings", &self.settings)
            .finish()
    }
}
