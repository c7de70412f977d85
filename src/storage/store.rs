use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::ops::Bound::{Excluded, Included};

use crate::utils::types::{Key, StoreVersion, Value};

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "store io error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e)
    }
}

/// Capability of a single key value store. A node holds one store for its
/// own arc of the ring plus one per replica it carries for another node.
///
/// Every accepted local mutation bumps the version number and records the
/// touched keys in the version history, both in the same critical section
/// of whoever holds the store.
pub trait Store: Send {
    fn contains(&self, key: Key) -> bool;

    /// Pure read. Backend failures are logged and read as absent.
    fn get(&self, key: Key) -> Option<Value>;

    /// Inserts or overwrites. Returns the previous value when the key was
    /// already present so the caller can report the duplicate.
    fn put(&mut self, key: Key, value: Value) -> Result<Option<Value>, StoreError>;

    fn remove(&mut self, key: Key) -> Option<Value>;

    /// Wipes data, history and version, leaving the store as freshly
    /// created.
    fn clear(&mut self);

    fn keys(&self) -> Vec<Key>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn version(&self) -> StoreVersion;

    fn history(&self) -> &BTreeMap<StoreVersion, Vec<Key>>;

    /// Applies an incoming replication batch: merges every pair, jumps the
    /// version to `version` and replaces the history with the single entry
    /// for this batch.
    fn replicate_in(&mut self, version: StoreVersion, pairs: Vec<(Key, Value)>)
        -> Result<(), StoreError>;

    /// Union of all keys recorded in the history for versions in
    /// (since, current], the delta a replica at `since` is missing.
    fn keys_changed_since(&self, since: StoreVersion) -> Vec<Key> {
        let mut keys: Vec<Key> = Vec::new();
        for changed in self
            .history()
            .range((Excluded(since), Included(self.version())))
            .map(|(_, keys)| keys)
        {
            for key in changed {
                if !keys.contains(key) {
                    keys.push(*key);
                }
            }
        }
        keys
    }
}
