use std::collections::BTreeMap;
use std::collections::btree_map;

use crate::id::UniqueId;

pub trait Identified {
    fn unique_id(&self) -> UniqueId;
}

/// Hands the rejected entity back to the caller.
#[derive(Debug, thiserror::Error)]
#[error("entity {id} already present")]
pub struct DuplicateEntity<E> {
    pub id: UniqueId,
    pub entity: E,
}

/// Owns polymorphic simulation objects keyed by their [`UniqueId`].
///
/// Iteration runs in ascending id order and yields the objects themselves, so call
/// sites read the same as walking a [`super::Bucket`].
#[derive(Debug, Clone)]
pub struct EntityTable<E> {
    entities: BTreeMap<UniqueId, E>,
}

impl<E> Default for EntityTable<E> {
    fn default() -> Self {
        Self {
            entities: BTreeMap::new(),
        }
    }
}

impl<E: Identified> EntityTable<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity(&mut self, entity: E) -> Result<UniqueId, DuplicateEntity<E>> {
        let id = entity.unique_id();
        match self.entities.entry(id) {
            btree_map::Entry::Occupied(_) => Err(DuplicateEntity { id, entity }),
            btree_map::Entry::Vacant(slot) => {
                slot.insert(entity);
                Ok(id)
            }
        }
    }

    pub fn at_unique_id(&self, id: UniqueId) -> Option<&E> {
        self.entities.get(&id)
    }

    pub fn at_unique_id_mut(&mut self, id: UniqueId) -> Option<&mut E> {
        self.entities.get_mut(&id)
    }

    pub fn remove_entity(&mut self, id: UniqueId) -> Option<E> {
        self.entities.remove(&id)
    }

    /// Keeps only the entities for which `keep` returns true, handing back the rest.
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<E>
    where
        F: FnMut(&E) -> bool,
    {
        let doomed: Vec<UniqueId> = self
            .entities
            .values()
            .filter(|e| !keep(*e))
            .map(Identified::unique_id)
            .collect();

        doomed
            .into_iter()
            .filter_map(|id| self.entities.remove(&id))
            .collect()
    }

    pub fn contains(&self, id: UniqueId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> btree_map::Values<'_, UniqueId, E> {
        self.entities.values()
    }

    pub fn iter_mut(&mut self) -> btree_map::ValuesMut<'_, UniqueId, E> {
        self.entities.values_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = UniqueId> + '_ {
        self.entities.keys().copied()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }
}

impl<'a, E> IntoIterator for &'a EntityTable<E> {
    type Item = &'a E;
    type IntoIter = btree_map::Values<'a, UniqueId, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Thing {
        Rock { id: u32 },
        Tree { id: u32, height: f32 },
    }

    impl Identified for Thing {
        fn unique_id(&self) -> UniqueId {
            match self {
                Thing::Rock { id } | Thing::Tree { id, .. } => UniqueId(*id),
            }
        }
    }

    #[test]
    fn add_rejects_duplicates_and_returns_entity() {
        let mut table = EntityTable::new();
        table.add_entity(Thing::Rock { id: 3 }).unwrap();

        let err = table
            .add_entity(Thing::Tree { id: 3, height: 2.0 })
            .unwrap_err();
        assert_eq!(err.id, UniqueId(3));
        let source: &dyn std::error::Error = &err;
        assert_eq!(source.to_string(), format!("entity {} already present", UniqueId(3)));
        assert_eq!(err.entity, Thing::Tree { id: 3, height: 2.0 });
        assert_eq!(table.at_unique_id(UniqueId(3)), Some(&Thing::Rock { id: 3 }));
    }

    #[test]
    fn iteration_is_ordered_by_id() {
        let mut table = EntityTable::new();
        for id in [9, 2, 5] {
            table.add_entity(Thing::Rock { id }).unwrap();
        }
        let ids: Vec<u32> = table.iter().map(|t| t.unique_id().0).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn retain_hands_back_removed() {
        let mut table = EntityTable::new();
        table.add_entity(Thing::Rock { id: 1 }).unwrap();
        table
            .add_entity(Thing::Tree {
                id: 2,
                height: 4.0,
            })
            .unwrap();

        let removed = table.retain(|t| matches!(t, Thing::Rock { .. }));
        assert_eq!(removed.len(), 1);
        assert_eq!(table.len(), 1);
        assert!(table.at_unique_id(UniqueId(2)).is_none());
    }

    #[test]
    fn clone_is_deep() {
        let mut table = EntityTable::new();
        table
            .add_entity(Thing::Tree {
                id: 1,
                height: 1.0,
            })
            .unwrap();
        let copy = table.clone();

        if let Some(Thing::Tree { height, .. }) = table.at_unique_id_mut(UniqueId(1)) {
            *height = 8.0;
        }
        assert_eq!(
            copy.at_unique_id(UniqueId(1)),
            Some(&Thing::Tree {
                id: 1,
                height: 1.0
            })
        );
    }
}
