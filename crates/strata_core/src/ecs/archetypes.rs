// archetypes.rs - Find-or-create for archetypes
//
// Archetypes are identified by their signature bitmask. Lookup is a linear
// scan for an exact match; a miss builds the archetype with canonical row
// order and records it on every involved component and tag.

use crate::config::WorldSettings;
use crate::ecs::storage::{Archetype, Bitmask};
use crate::ecs::{ArchetypeId, CompTypeId, TagTypeId, TypeRegistry};

#[derive(Debug, Default)]
pub struct ArchetypeRegistry {
    archetypes: Vec<Archetype>,
}

impl ArchetypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signature for a set of ids. Duplicates collapse and order does not matter.
    ///
    /// Panics on ids outside the registry.
    pub fn signature_for(types: &TypeRegistry, comps: &[CompTypeId], tags: &[TagTypeId]) -> Bitmask {
        let num_components = types.num_components();
        let mut signature = Bitmask::with_len(types.signature_len());
        for &comp in comps {
            assert!(types.is_component_id(comp), "{comp} is not registered");
            signature.set(comp.index());
        }
        for &tag in tags {
            assert!(types.is_tag_id(tag), "{tag} is not registered");
            signature.set(num_components + tag.index());
        }
        signature
    }

    /// Existing archetype with exactly this signature.
    pub fn find(&self, signature: &Bitmask) -> Option<ArchetypeId> {
        self.archetypes
            .iter()
            .find(|a| a.signature() == signature)
            .map(Archetype::id)
    }

    pub fn find_or_create(
        &mut self,
        types: &mut TypeRegistry,
        comps: &[CompTypeId],
        tags: &[TagTypeId],
        settings: &WorldSettings,
    ) -> ArchetypeId {
        let signature = Self::signature_for(types, comps, tags);
        if let Some(id) = self.find(&signature) {
            return id;
        }

        let num_components = types.num_components();
        let id = ArchetypeId::from_usize(self.archetypes.len());

        // Set bits come out in id order, which is (size, key) order for
        // components and key order for tags.
        let sorted_comps: Vec<CompTypeId> = signature
            .iter_ones()
            .take_while(|&bit| bit < num_components)
            .map(CompTypeId::from_usize)
            .collect();
        let sorted_tags: Vec<TagTypeId> = signature
            .iter_ones()
            .skip_while(|&bit| bit < num_components)
            .map(|bit| TagTypeId::from_usize(bit - num_components))
            .collect();

        let rows = sorted_comps
            .iter()
            .map(|&comp| (comp, types.component(comp).descriptor()))
            .collect();
        let mut archetype = Archetype::new(id, rows, signature, num_components);
        if settings.reserve_columns > 0 {
            archetype.add_uninitialized(settings.reserve_columns);
        }

        for (row, &comp) in sorted_comps.iter().enumerate() {
            types.component_mut(comp).record(id, row);
        }
        for (index, &tag) in sorted_tags.iter().enumerate() {
            types.tag_mut(tag).record(id, index);
        }

        let component_names: Vec<_> = sorted_comps
            .iter()
            .map(|&c| types.component(c).descriptor().name())
            .collect();
        let tag_names: Vec<_> = sorted_tags
            .iter()
            .map(|&t| types.tag(t).descriptor().name())
            .collect();
        tracing::debug!(archetype = %id, components = ?component_names, tags = ?tag_names, "created archetype");

        self.archetypes.push(archetype);
        id
    }

    pub fn get(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    pub fn get_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id.index())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// Archetypes in creation order.
    pub fn iter(&self) -> std::slice::Iter<'_, Archetype> {
        self.archetypes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::TypeSet;
    use crate::{define_component, define_tag};

    #[derive(Clone, Default, PartialEq)]
    struct A(u32);
    define_component!(A, 20, "A");

    #[derive(Clone, Default, PartialEq)]
    struct B([f32; 4]);
    define_component!(B, 10, "B");

    #[derive(Clone, Default, PartialEq)]
    struct C(u32);
    define_component!(C, 30, "C");

    #[derive(Clone, Default, PartialEq)]
    struct Marked;
    define_tag!(Marked, 1, "Marked");

    fn types() -> TypeRegistry {
        TypeRegistry::new(
            &TypeSet::new()
                .with_component::<B>()
                .with_component::<C>()
                .with_component::<A>()
                .with_tag::<Marked>(),
        )
        .unwrap()
    }

    fn ids(types: &TypeRegistry) -> (CompTypeId, CompTypeId, CompTypeId, TagTypeId) {
        (
            types.component_id::<A>().unwrap(),
            types.component_id::<B>().unwrap(),
            types.component_id::<C>().unwrap(),
            types.tag_id::<Marked>().unwrap(),
        )
    }

    #[test]
    fn test_order_and_duplicates_do_not_matter() {
        let mut types = types();
        let (a, b, c, _) = ids(&types);
        let settings = WorldSettings::default();
        let mut registry = ArchetypeRegistry::new();

        let first = registry.find_or_create(&mut types, &[a, b, c], &[], &settings);
        let second = registry.find_or_create(&mut types, &[c, b, a, a], &[], &settings);
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);

        let rows: Vec<_> = registry
            .get(first)
            .unwrap()
            .rows()
            .iter()
            .map(|r| r.descriptor().name())
            .collect();
        // Size first (A and C are 4 bytes), then key.
        assert_eq!(rows, ["A", "C", "B"]);
    }

    #[test]
    fn test_tags_distinguish_archetypes() {
        let mut types = types();
        let (a, _, _, marked) = ids(&types);
        let settings = WorldSettings::default();
        let mut registry = ArchetypeRegistry::new();

        let plain = registry.find_or_create(&mut types, &[a], &[], &settings);
        let tagged = registry.find_or_create(&mut types, &[a], &[marked], &settings);
        assert_ne!(plain, tagged);
        assert_eq!(registry.get(tagged).unwrap().row_count(), 1);
        assert_eq!(types.tag(marked).row_in(tagged), Some(0));
        assert_eq!(types.tag(marked).row_in(plain), None);
    }

    #[test]
    fn test_records_point_at_rows() {
        let mut types = types();
        let (a, b, c, _) = ids(&types);
        let settings = WorldSettings::default();
        let mut registry = ArchetypeRegistry::new();

        let abc = registry.find_or_create(&mut types, &[b, a, c], &[], &settings);
        let bc = registry.find_or_create(&mut types, &[b, c], &[], &settings);

        for archetype in [abc, bc] {
            let archetype_ref = registry.get(archetype).unwrap();
            let row = types.component(b).row_in(archetype).unwrap();
            assert_eq!(row, archetype_ref.get_row_for(b));
            assert!(archetype_ref.row(row).descriptor().is::<B>());
        }
        let records = types.component(c).referenced_archetypes();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].archetype, abc);
        assert_eq!(records[1].archetype, bc);
    }

    #[test]
    fn test_find_does_not_create() {
        let types = types();
        let (a, _, _, _) = ids(&types);
        let registry = ArchetypeRegistry::new();
        let signature = ArchetypeRegistry::signature_for(&types, &[a], &[]);
        assert_eq!(registry.find(&signature), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reserve_columns() {
        let mut types = types();
        let (a, _, _, _) = ids(&types);
        let settings = WorldSettings {
            reserve_columns: 16,
            ..WorldSettings::default()
        };
        let mut registry = ArchetypeRegistry::new();
        let id = registry.find_or_create(&mut types, &[a], &[], &settings);
        let archetype = registry.get(id).unwrap();
        assert_eq!(archetype.column_count(), 16);
        assert_eq!(archetype.live_count(), 0);
    }
}
