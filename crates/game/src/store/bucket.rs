use std::collections::HashMap;
use std::hash::Hash;

use crate::id::UniqueId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BucketError {
    #[error("id already stored at index {index}")]
    DuplicateId { index: usize },
}

/// Dense slot store: records live in a contiguous prefix `[0, first_invalid_index())`
/// and are addressable both by index and by their persistent id.
///
/// Only [`Bucket::remove_element`] reorders records, by moving the last valid record
/// into the freed slot.
#[derive(Debug, Clone)]
pub struct Bucket<T, K = UniqueId> {
    data: Vec<T>,
    ids: Vec<K>,
    index_of: HashMap<K, usize>,
}

impl<T, K> Default for Bucket<T, K>
where
    K: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, K> Bucket<T, K>
where
    K: Copy + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            ids: Vec::new(),
            index_of: HashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            ids: Vec::with_capacity(capacity),
            index_of: HashMap::with_capacity(capacity),
        }
    }

    pub fn add_element(&mut self, id: K, value: T) -> Result<usize, BucketError> {
        if let Some(&index) = self.index_of.get(&id) {
            return Err(BucketError::DuplicateId { index });
        }

        let index = self.data.len();
        self.data.push(value);
        self.ids.push(id);
        self.index_of.insert(id, index);
        Ok(index)
    }

    /// Moves the last valid record into the removed slot. Any index previously held for
    /// that last record is stale afterwards.
    pub fn remove_element(&mut self, id: K) -> Option<T> {
        let index = self.index_of.remove(&id)?;
        let last = self.data.len() - 1;

        let removed = self.data.swap_remove(index);
        self.ids.swap_remove(index);

        if index != last {
            let moved_id = self.ids[index];
            self.index_of.insert(moved_id, index);
        }

        Some(removed)
    }

    #[inline]
    pub fn first_invalid_index(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn contains(&self, id: K) -> bool {
        self.index_of.contains_key(&id)
    }

    pub fn index_of(&self, id: K) -> Option<usize> {
        self.index_of.get(&id).copied()
    }

    pub fn id_at(&self, index: usize) -> Option<K> {
        self.ids.get(index).copied()
    }

    pub fn at(&self, index: usize) -> Option<&T> {
        self.data.get(index)
    }

    pub fn at_mut(&mut self, index: usize) -> Option<&mut T> {
        self.data.get_mut(index)
    }

    pub fn at_unique_id(&self, id: K) -> Option<&T> {
        self.index_of.get(&id).map(|&index| &self.data[index])
    }

    pub fn at_unique_id_mut(&mut self, id: K) -> Option<&mut T> {
        match self.index_of.get(&id) {
            Some(&index) => Some(&mut self.data[index]),
            None => None,
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn ids(&self) -> &[K] {
        &self.ids
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.data.iter_mut()
    }

    pub fn iter_with_ids(&self) -> impl Iterator<Item = (K, &T)> {
        self.ids.iter().copied().zip(self.data.iter())
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.ids.clear();
        self.index_of.clear();
    }
}

impl<T, K> Bucket<T, K>
where
    T: Clone,
    K: Copy + Eq + Hash,
{
    /// Replaces `other`'s contents with a copy of the valid range, reusing its allocations.
    pub fn copy_valid_data_to(&self, other: &mut Bucket<T, K>) {
        other.data.clone_from(&self.data);
        other.ids.clone_from(&self.ids);
        other.index_of.clone_from(&self.index_of);
    }
}

impl<'a, T, K> IntoIterator for &'a Bucket<T, K>
where
    K: Copy + Eq + Hash,
{
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn check_invariants(bucket: &Bucket<u32>, expected: &HashSet<u32>) {
        assert_eq!(bucket.first_invalid_index(), expected.len());

        for &raw in expected {
            let id = UniqueId(raw);
            assert_eq!(bucket.at_unique_id(id), Some(&raw));
        }

        let mut seen = HashSet::new();
        for index in 0..bucket.first_invalid_index() {
            let id = bucket.id_at(index).unwrap();
            assert!(expected.contains(&id.0));
            assert_eq!(bucket.index_of(id), Some(index));
            assert!(seen.insert(id), "two ids alias index {index}");
        }
    }

    #[test]
    fn duplicate_add_reports_existing_index() {
        let mut bucket: Bucket<&str> = Bucket::new();
        bucket.add_element(UniqueId(4), "a").unwrap();
        bucket.add_element(UniqueId(9), "b").unwrap();

        assert_eq!(
            bucket.add_element(UniqueId(9), "c"),
            Err(BucketError::DuplicateId { index: 1 })
        );
        assert_eq!(bucket.at_unique_id(UniqueId(9)), Some(&"b"));
    }

    #[test]
    fn remove_swaps_last_into_hole() {
        let mut bucket: Bucket<char> = Bucket::new();
        for (raw, value) in [(1, 'a'), (2, 'b'), (3, 'c'), (4, 'd')] {
            bucket.add_element(UniqueId(raw), value).unwrap();
        }

        assert_eq!(bucket.remove_element(UniqueId(2)), Some('b'));
        assert_eq!(bucket.as_slice(), &['a', 'd', 'c']);
        assert_eq!(bucket.index_of(UniqueId(4)), Some(1));
        assert_eq!(bucket.first_invalid_index(), 3);

        assert_eq!(bucket.remove_element(UniqueId(3)), Some('c'));
        assert_eq!(bucket.as_slice(), &['a', 'd']);
        assert_eq!(bucket.remove_element(UniqueId(3)), None);
    }

    #[test]
    fn missing_lookups_return_none() {
        let bucket: Bucket<u8> = Bucket::new();
        assert!(bucket.at_unique_id(UniqueId(1)).is_none());
        assert!(bucket.at(0).is_none());
        assert!(bucket.id_at(0).is_none());
    }

    #[test]
    fn copy_valid_data_overwrites_target() {
        let mut source: Bucket<u32> = Bucket::new();
        source.add_element(UniqueId(1), 10).unwrap();
        source.add_element(UniqueId(2), 20).unwrap();

        let mut target: Bucket<u32> = Bucket::new();
        target.add_element(UniqueId(7), 70).unwrap();

        source.copy_valid_data_to(&mut target);
        assert_eq!(target.as_slice(), &[10, 20]);
        assert!(target.at_unique_id(UniqueId(7)).is_none());
        assert_eq!(target.at_unique_id(UniqueId(2)), Some(&20));
    }

    #[test]
    fn random_operations_keep_prefix_dense() {
        let mut rng = StdRng::seed_from_u64(0xB0C4E7);
        let mut bucket: Bucket<u32> = Bucket::new();
        let mut expected = HashSet::new();

        for _ in 0..2_000 {
            let raw = rng.gen_range(1..64u32);
            if rng.gen_bool(0.55) {
                let result = bucket.add_element(UniqueId(raw), raw);
                assert_eq!(result.is_ok(), expected.insert(raw));
            } else {
                let removed = bucket.remove_element(UniqueId(raw));
                assert_eq!(removed.is_some(), expected.remove(&raw));
            }
            check_invariants(&bucket, &expected);
        }
    }
}
