//! Entity index
//!
//! Maps entity ids to their (archetype, column) location. New entities take
//! the lowest free slot; removing an entity never renumbers the others.

use crate::ecs::{ArchetypeId, EntityId};
use std::collections::BTreeSet;

/// Where an entity's values live. Fixed for the entity's lifetime.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub archetype: ArchetypeId,
    pub column: usize,
}

#[derive(Debug, Default)]
pub struct EntityIndex {
    slots: Vec<Option<EntityRecord>>,
    free: BTreeSet<u32>,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record` in the lowest free slot.
    pub fn insert(&mut self, record: EntityRecord) -> EntityId {
        match self.free.pop_first() {
            Some(slot) => {
                debug_assert!(self.slots[slot as usize].is_none());
                self.slots[slot as usize] = Some(record);
                EntityId::new(slot)
            }
            None => {
                let id = EntityId::from_usize(self.slots.len());
                self.slots.push(Some(record));
                id
            }
        }
    }

    #[inline]
    pub fn is_valid(&self, id: EntityId) -> bool {
        matches!(self.slots.get(id.index()), Some(Some(_)))
    }

    #[inline]
    pub fn get(&self, id: EntityId) -> Option<EntityRecord> {
        self.slots.get(id.index()).copied().flatten()
    }

    /// Free the slot. Other ids are untouched.
    pub fn remove(&mut self, id: EntityId) -> Option<EntityRecord> {
        let record = self.slots.get_mut(id.index())?.take()?;
        self.free.insert(id.raw());
        Some(record)
    }

    /// Live entity count.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, EntityRecord)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|record| (EntityId::from_usize(i), record)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(column: usize) -> EntityRecord {
        EntityRecord {
            archetype: ArchetypeId::new(0),
            column,
        }
    }

    #[test]
    fn test_lowest_free_slot_reused() {
        let mut index = EntityIndex::new();
        let ids: Vec<_> = (0..3).map(|c| index.insert(at(c))).collect();
        assert_eq!(ids, [EntityId::new(0), EntityId::new(1), EntityId::new(2)]);

        assert_eq!(index.remove(EntityId::new(1)), Some(at(1)));
        assert!(!index.is_valid(EntityId::new(1)));
        assert_eq!(index.get(EntityId::new(0)), Some(at(0)));
        assert_eq!(index.get(EntityId::new(2)), Some(at(2)));

        assert_eq!(index.insert(at(7)), EntityId::new(1));
        assert_eq!(index.insert(at(8)), EntityId::new(3));
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_lowest_of_several_holes() {
        let mut index = EntityIndex::new();
        for c in 0..5 {
            index.insert(at(c));
        }
        index.remove(EntityId::new(3));
        index.remove(EntityId::new(0));
        assert_eq!(index.insert(at(9)), EntityId::new(0));
        assert_eq!(index.insert(at(9)), EntityId::new(3));
    }

    #[test]
    fn test_invalid_ids() {
        let mut index = EntityIndex::new();
        assert!(!index.is_valid(EntityId::NONE));
        assert_eq!(index.remove(EntityId::new(4)), None);
        let id = index.insert(at(0));
        assert_eq!(index.remove(id), Some(at(0)));
        assert_eq!(index.remove(id), None);
        assert!(index.is_empty());
    }

    #[test]
    fn test_iter_skips_holes() {
        let mut index = EntityIndex::new();
        for c in 0..3 {
            index.insert(at(c));
        }
        index.remove(EntityId::new(1));
        let live: Vec<_> = index.iter().map(|(id, _)| id.raw()).collect();
        assert_eq!(live, [0, 2]);
    }
}
