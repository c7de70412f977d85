use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;

use crate::utils::types::{HashPos, Key, StoreVersion, Value};

pub mod file;
pub mod memory;
pub mod store;

pub use store::{Store, StoreError};

use file::FileStore;
use memory::MemoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StoreBackend {
    Memory,
    File,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "memory" => Ok(StoreBackend::Memory),
            "file" => Ok(StoreBackend::File),
            _ => Err(()),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::File => write!(f, "file"),
        }
    }
}

/// What the replication loop has to do for one successor, derived from the
/// primary's and the replica's store versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Replica is current.
    Skip,
    /// Replica has never seen this store, ship everything.
    FullSeed,
    /// Replica claims a version the primary never issued; it has to be
    /// dropped and reseeded from scratch.
    ResetAndSeed,
    /// Replica lags, ship the keys touched since its version.
    Delta(Vec<Key>),
}

/// Compares a primary store against a replica's reported version.
pub fn plan_sync(store: &dyn Store, remote_version: StoreVersion) -> SyncAction {
    let local_version = store.version();
    if remote_version == local_version {
        SyncAction::Skip
    } else if remote_version == 0 {
        SyncAction::FullSeed
    } else if local_version < remote_version {
        SyncAction::ResetAndSeed
    } else {
        SyncAction::Delta(store.keys_changed_since(remote_version))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreSummary {
    pub owner: HashPos,
    pub version: StoreVersion,
    pub size: usize,
}

/// Top level storage state of one node: the store for the node's own arc
/// plus the replica stores it carries for other nodes, all keyed by the
/// owning node's id. Stores are created lazily with the configured backend;
/// the manager only ever sees the `Store` capability.
pub struct StorageManager {
    backend: StoreBackend,
    root: Option<PathBuf>,
    stores: HashMap<HashPos, Box<dyn Store>>,
}

impl StorageManager {
    pub fn new(backend: StoreBackend, root: Option<PathBuf>) -> StorageManager {
        StorageManager {
            backend,
            root,
            stores: HashMap::new(),
        }
    }

    pub fn in_memory() -> StorageManager {
        StorageManager::new(StoreBackend::Memory, None)
    }

    fn open_store(&self, owner: HashPos) -> Result<Box<dyn Store>, StoreError> {
        match self.backend {
            StoreBackend::Memory => Ok(Box::new(MemoryStore::new())),
            StoreBackend::File => {
                let root = self.root.as_deref().expect("file backend configured without root");
                Ok(Box::new(FileStore::open(root, owner)?))
            }
        }
    }

    fn store_mut(&mut self, owner: HashPos) -> Result<&mut Box<dyn Store>, StoreError> {
        if !self.stores.contains_key(&owner) {
            let store = self.open_store(owner)?;
            self.stores.insert(owner, store);
        }
        Ok(self.stores.get_mut(&owner).unwrap())
    }

    pub fn store(&self, owner: HashPos) -> Option<&dyn Store> {
        self.stores.get(&owner).map(|store| store.as_ref())
    }

    /// Inserts into the store owned by `owner`, creating it on first use.
    /// Returns the overwritten value when the key already existed.
    pub fn add_key(
        &mut self,
        owner: HashPos,
        key: Key,
        value: Value,
    ) -> Result<Option<Value>, StoreError> {
        self.store_mut(owner)?.put(key, value)
    }

    pub fn find_key(&self, owner: HashPos, key: Key) -> Option<Value> {
        self.stores.get(&owner).and_then(|store| store.get(key))
    }

    /// Version of the store for `owner`, 0 when no such store exists.
    pub fn version_of(&self, owner: HashPos) -> StoreVersion {
        self.stores
            .get(&owner)
            .map(|store| store.version())
            .unwrap_or(0)
    }

    /// Clears the store for `owner` and drops the record. Idempotent.
    pub fn delete_store(&mut self, owner: HashPos) {
        if let Some(mut store) = self.stores.remove(&owner) {
            store.clear();
        }
    }

    pub fn replicate_in(
        &mut self,
        owner: HashPos,
        version: StoreVersion,
        pairs: Vec<(Key, Value)>,
    ) -> Result<(), StoreError> {
        self.store_mut(owner)?.replicate_in(version, pairs)
    }

    /// All pairs of the store for `owner`, the payload of a full seed.
    pub fn all_pairs(&self, owner: HashPos) -> Vec<(Key, Value)> {
        match self.stores.get(&owner) {
            Some(store) => store
                .keys()
                .into_iter()
                .filter_map(|key| store.get(key).map(|value| (key, value)))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Current values for `keys` in the store for `owner`. Keys whose value
    /// has since been removed are silently dropped from the payload.
    pub fn pairs_for(&self, owner: HashPos, keys: &[Key]) -> Vec<(Key, Value)> {
        match self.stores.get(&owner) {
            Some(store) => keys
                .iter()
                .filter_map(|key| store.get(*key).map(|value| (*key, value)))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn summaries(&self) -> Vec<StoreSummary> {
        let mut summaries: Vec<StoreSummary> = self
            .stores
            .iter()
            .map(|(owner, store)| StoreSummary {
                owner: *owner,
                version: store.version(),
                size: store.len(),
            })
            .collect();
        summaries.sort_by_key(|summary| summary.owner);
        summaries
    }
}
