use std::collections::{BTreeMap, HashMap};

use crate::storage::store::{Store, StoreError};
use crate::utils::types::{Key, StoreVersion, Value};

/// Volatile store backend. The default; a node restarted with it comes up
/// empty and rejoins the ring from scratch.
#[derive(Debug)]
pub struct MemoryStore {
    data: HashMap<Key, Value>,
    version: StoreVersion,
    history: BTreeMap<StoreVersion, Vec<Key>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        let mut history = BTreeMap::new();
        history.insert(0, Vec::new());
        MemoryStore {
            data: HashMap::new(),
            version: 0,
            history,
        }
    }
}

impl Store for MemoryStore {
    fn contains(&self, key: Key) -> bool {
        self.data.contains_key(&key)
    }

    fn get(&self, key: Key) -> Option<Value> {
        self.data.get(&key).cloned()
    }

    fn put(&mut self, key: Key, value: Value) -> Result<Option<Value>, StoreError> {
        let previous = self.data.insert(key, value);
        self.version += 1;
        self.history.insert(self.version, vec![key]);
        Ok(previous)
    }

    fn remove(&mut self, key: Key) -> Option<Value> {
        let removed = self.data.remove(&key);
        if removed.is_some() {
            self.version += 1;
            self.history.insert(self.version, vec![key]);
        }
        removed
    }

    fn clear(&mut self) {
        self.data.clear();
        self.version = 0;
        self.history.clear();
        self.history.insert(0, Vec::new());
    }

    fn keys(&self) -> Vec<Key> {
        self.data.keys().copied().collect()
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn version(&self) -> StoreVersion {
        self.version
    }

    fn history(&self) -> &BTreeMap<StoreVersion, Vec<Key>> {
        &self.history
    }

    fn replicate_in(
        &mut self,
        version: StoreVersion,
        pairs: Vec<(Key, Value)>,
    ) -> Result<(), StoreError> {
        let keys: Vec<Key> = pairs.iter().map(|(key, _)| *key).collect();
        for (key, value) in pairs {
            self.data.insert(key, value);
        }
        self.version = version;
        self.history.clear();
        self.history.insert(version, keys);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let mut store = MemoryStore::new();
        store.put(7, b"x".to_vec()).unwrap();
        assert_eq!(store.get(7), Some(b"x".to_vec()));
        assert!(store.contains(7));
        assert_eq!(store.get(8), None);
    }

    #[test]
    fn put_bumps_version_and_records_history() {
        let mut store = MemoryStore::new();
        assert_eq!(store.version(), 0);
        store.put(1, b"a".to_vec()).unwrap();
        store.put(2, b"b".to_vec()).unwrap();
        assert_eq!(store.version(), 2);
        assert_eq!(store.history().get(&1), Some(&vec![1]));
        assert_eq!(store.history().get(&2), Some(&vec![2]));
    }

    #[test]
    fn duplicate_put_overwrites_and_reports_previous() {
        let mut store = MemoryStore::new();
        store.put(1, b"old".to_vec()).unwrap();
        let previous = store.put(1, b"new".to_vec()).unwrap();
        assert_eq!(previous, Some(b"old".to_vec()));
        assert_eq!(store.get(1), Some(b"new".to_vec()));
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn keys_changed_since_unions_history() {
        let mut store = MemoryStore::new();
        store.put(1, b"a".to_vec()).unwrap();
        store.put(2, b"b".to_vec()).unwrap();
        store.put(1, b"c".to_vec()).unwrap();

        let mut delta = store.keys_changed_since(1);
        delta.sort_unstable();
        assert_eq!(delta, vec![1, 2]);

        assert!(store.keys_changed_since(3).is_empty());
        let mut full = store.keys_changed_since(0);
        full.sort_unstable();
        assert_eq!(full, vec![1, 2]);
    }

    #[test]
    fn replicate_in_jumps_version_and_replaces_history() {
        let mut store = MemoryStore::new();
        store.put(1, b"stale".to_vec()).unwrap();

        store
            .replicate_in(9, vec![(1, b"a".to_vec()), (5, b"b".to_vec())])
            .unwrap();

        assert_eq!(store.version(), 9);
        assert_eq!(store.get(1), Some(b"a".to_vec()));
        assert_eq!(store.get(5), Some(b"b".to_vec()));
        assert_eq!(store.history().len(), 1);
        assert_eq!(store.history().get(&9), Some(&vec![1, 5]));
    }

    #[test]
    fn clear_resets_to_fresh_state() {
        let mut store = MemoryStore::new();
        store.put(1, b"a".to_vec()).unwrap();
        store.clear();
        assert_eq!(store.len(), 0);
        assert_eq!(store.version(), 0);
        assert_eq!(store.history().get(&0), Some(&Vec::new()));
    }

    #[test]
    fn remove_is_a_versioned_mutation() {
        let mut store = MemoryStore::new();
        store.put(1, b"a".to_vec()).unwrap();
        let removed = store.remove(1);
        assert_eq!(removed, Some(b"a".to_vec()));
        assert_eq!(store.version(), 2);
        assert_eq!(store.remove(1), None);
        assert_eq!(store.version(), 2);
    }
}
