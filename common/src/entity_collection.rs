use std::hash::Hash;

use hashbrown::HashMap;
use serde::de::Error as SerdeError;
use serde::{Deserialize, Serialize};

use crate::is_debug;

pub trait EntityKey<K> {
    fn key(&self) -> &K;
}

/// Insertion-ordered entities with O(1) lookup by id.
#[derive(Debug, Clone)]
pub struct EntityCollection<K: Copy + Eq + Hash, V: EntityKey<K>> {
    items: Vec<V>,
    idx_by_key: HashMap<K, usize>,
}

impl<K, V> Default for EntityCollection<K, V>
where
    K: Copy + Eq + Hash,
    V: EntityKey<K>,
{
    fn default() -> Self {
        Self {
            items: Vec::new(),
            idx_by_key: HashMap::new(),
        }
    }
}

impl<K, V> EntityCollection<K, V>
where
    K: Copy + Eq + Hash,
    V: EntityKey<K>,
{
    /// Appends entities whose id is not present yet. Existing ids are left untouched.
    pub fn add_many(&mut self, values: impl IntoIterator<Item = V>) -> usize {
        let mut added = 0;
        for value in values {
            let key = *value.key();
            if self.idx_by_key.contains_key(&key) {
                continue;
            }
            self.idx_by_key.insert(key, self.items.len());
            self.items.push(value);
            added += 1;
        }
        added
    }

    /// Replaces an entity in place or appends it.
    pub fn upsert(&mut self, value: V) {
        let key = *value.key();
        match self.idx_by_key.get(&key) {
            Some(&idx) => self.items[idx] = value,
            None => {
                self.idx_by_key.insert(key, self.items.len());
                self.items.push(value);
            }
        }
    }

    pub fn upsert_many(&mut self, values: impl IntoIterator<Item = V>) {
        for value in values {
            self.upsert(value);
        }
    }

    /// Applies `f` to the entity with `key`. The id must not change.
    pub fn update_one(&mut self, key: &K, f: impl FnOnce(&mut V)) -> bool {
        let Some(&idx) = self.idx_by_key.get(key) else {
            return false;
        };
        let item = &mut self.items[idx];
        f(item);
        assert!(item.key() == key, "entity id changed during update");
        true
    }

    pub fn remove_many<'a>(&mut self, keys: impl IntoIterator<Item = &'a K>) -> Vec<V>
    where
        K: 'a,
    {
        let mut removed_idx: Vec<usize> = keys
            .into_iter()
            .filter_map(|key| self.idx_by_key.remove(key))
            .collect();
        if removed_idx.is_empty() {
            return Vec::new();
        }
        removed_idx.sort_unstable();

        let mut removed = Vec::with_capacity(removed_idx.len());
        for idx in removed_idx.into_iter().rev() {
            removed.push(self.items.remove(idx));
        }
        removed.reverse();
        self.reindex();
        removed
    }

    pub fn remove_one(&mut self, key: &K) -> Option<V> {
        self.remove_many(std::iter::once(key)).pop()
    }

    pub fn remove_all(&mut self) {
        self.items.clear();
        self.idx_by_key.clear();
    }

    pub fn get_all(&self) -> &[V] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, V> {
        self.items.iter_mut()
    }

    pub fn get_by_id(&self, key: &K) -> Option<&V> {
        self.idx_by_key.get(key).map(|&idx| &self.items[idx])
    }

    pub fn get_by_id_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = *self.idx_by_key.get(key)?;
        Some(&mut self.items[idx])
    }

    pub fn index_of(&self, key: &K) -> Option<usize> {
        self.idx_by_key.get(key).copied()
    }

    pub fn ids(&self) -> Vec<K> {
        self.items.iter().map(|item| *item.key()).collect()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.idx_by_key.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn reindex(&mut self) {
        self.idx_by_key.clear();
        for (idx, item) in self.items.iter().enumerate() {
            self.idx_by_key.insert(*item.key(), idx);
        }
        if is_debug() {
            self.debug_validate();
        }
    }

    pub fn debug_validate(&self) {
        assert_eq!(self.items.len(), self.idx_by_key.len());
        for (idx, item) in self.items.iter().enumerate() {
            assert_eq!(self.idx_by_key.get(item.key()), Some(&idx));
        }
    }
}

impl<K, V> Serialize for EntityCollection<K, V>
where
    K: Copy + Eq + Hash,
    V: EntityKey<K> + Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.items.serialize(serializer)
    }
}

impl<'de, K, V> Deserialize<'de> for EntityCollection<K, V>
where
    K: Copy + Eq + Hash,
    V: EntityKey<K> + Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let items: Vec<V> = Vec::deserialize(deserializer)?;
        let mut idx_by_key = HashMap::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            if idx_by_key.insert(*item.key(), idx).is_some() {
                return Err(SerdeError::custom("Duplicate id in EntityCollection"));
            }
        }

        Ok(Self { items, idx_by_key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: u32,
        value: i32,
    }

    impl EntityKey<u32> for Item {
        fn key(&self) -> &u32 {
            &self.id
        }
    }

    fn item(id: u32, value: i32) -> Item {
        Item { id, value }
    }

    fn collection(ids: &[u32]) -> EntityCollection<u32, Item> {
        let mut items = EntityCollection::default();
        items.add_many(ids.iter().map(|&id| item(id, id as i32 * 10)));
        items
    }

    #[test]
    fn add_many_keeps_order_and_skips_existing() {
        let mut items = collection(&[3, 1, 2]);
        let added = items.add_many([item(1, -1), item(4, 40)]);

        assert_eq!(added, 1);
        assert_eq!(items.ids(), vec![3, 1, 2, 4]);
        assert_eq!(items.get_by_id(&1).unwrap().value, 10);
        items.debug_validate();
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut items = collection(&[1, 2, 3]);
        items.upsert(item(2, 99));
        items.upsert(item(5, 50));

        assert_eq!(items.ids(), vec![1, 2, 3, 5]);
        assert_eq!(items.get_by_id(&2).unwrap().value, 99);
    }

    #[test]
    fn update_one_reports_missing_ids() {
        let mut items = collection(&[1]);
        assert!(items.update_one(&1, |item| item.value = 7));
        assert!(!items.update_one(&9, |item| item.value = 7));
        assert_eq!(items.get_by_id(&1).unwrap().value, 7);
    }

    #[test]
    fn remove_many_reindexes() {
        let mut items = collection(&[1, 2, 3, 4, 5]);
        let removed = items.remove_many(&[4, 2, 42]);

        assert_eq!(removed.iter().map(|i| i.id).collect::<Vec<_>>(), vec![2, 4]);
        assert_eq!(items.ids(), vec![1, 3, 5]);
        assert_eq!(items.index_of(&5), Some(2));
        assert!(!items.contains(&2));
        items.debug_validate();

        items.remove_all();
        assert!(items.is_empty());
    }

    #[test]
    fn deserialize_rejects_duplicate_ids() {
        let items = collection(&[1, 2]);
        let json = serde_json::to_string(&items).unwrap();
        let back: EntityCollection<u32, Item> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ids(), vec![1, 2]);

        let duplicate = r#"[{"id":1,"value":0},{"id":1,"value":1}]"#;
        assert!(serde_json::from_str::<EntityCollection<u32, Item>>(duplicate).is_err());
    }
}
