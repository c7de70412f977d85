use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use log::{error, warn};

use crate::storage::store::{Store, StoreError};
use crate::utils::types::{HashPos, Key, StoreVersion, Value};

/// Persistent store backend: one directory per owner id below the
/// configured root, one file per key, the file content being the opaque
/// value blob. File and directory names are the 16 lower-case hex digits
/// of the id, no extension.
///
/// Only the blobs persist. Version number and history live in memory, so a
/// restarted node re-reads its blobs but still has to join the ring like a
/// fresh member.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    keys: BTreeSet<Key>,
    version: StoreVersion,
    history: BTreeMap<StoreVersion, Vec<Key>>,
}

fn encode_id(id: HashPos) -> String {
    format!("{:016x}", id)
}

fn decode_file_name(name: &str) -> Option<Key> {
    if name.len() != 16 {
        return None;
    }
    if !name.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
        return None;
    }
    Key::from_str_radix(name, 16).ok()
}

impl FileStore {
    /// Opens (or creates) the store directory for `owner` and indexes the
    /// key files already present. Recovered keys become the explicit
    /// zero-version history bucket.
    pub fn open(root: &Path, owner: HashPos) -> Result<FileStore, StoreError> {
        let dir = root.join(encode_id(owner));
        fs::create_dir_all(&dir)?;

        let mut keys = BTreeSet::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            match decode_file_name(&name) {
                Some(key) => {
                    keys.insert(key);
                }
                None => {
                    warn!("Ignoring non key file '{}' in store directory {:?}", name, dir)
                }
            }
        }

        let mut history = BTreeMap::new();
        history.insert(0, keys.iter().copied().collect());

        Ok(FileStore {
            dir,
            keys,
            version: 0,
            history,
        })
    }

    fn path_for(&self, key: Key) -> PathBuf {
        self.dir.join(encode_id(key))
    }
}

impl Store for FileStore {
    fn contains(&self, key: Key) -> bool {
        self.keys.contains(&key)
    }

    fn get(&self, key: Key) -> Option<Value> {
        if !self.keys.contains(&key) {
            return None;
        }
        match fs::read(self.path_for(key)) {
            Ok(value) => Some(value),
            Err(e) => {
                error!("Failed to read blob for key {:016x}: {}", key, e);
                None
            }
        }
    }

    fn put(&mut self, key: Key, value: Value) -> Result<Option<Value>, StoreError> {
        let previous = self.get(key);
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), &value)?;
        self.keys.insert(key);
        self.version += 1;
        self.history.insert(self.version, vec![key]);
        Ok(previous)
    }

    fn remove(&mut self, key: Key) -> Option<Value> {
        if !self.keys.remove(&key) {
            return None;
        }
        let previous = match fs::read(self.path_for(key)) {
            Ok(value) => Some(value),
            Err(e) => {
                error!("Failed to read blob for key {:016x} on removal: {}", key, e);
                None
            }
        };
        if let Err(e) = fs::remove_file(self.path_for(key)) {
            error!("Failed to remove blob for key {:016x}: {}", key, e);
        }
        self.version += 1;
        self.history.insert(self.version, vec![key]);
        previous
    }

    fn clear(&mut self) {
        for key in self.keys.iter() {
            if let Err(e) = fs::remove_file(self.dir.join(encode_id(*key))) {
                error!("Failed to remove blob for key {:016x}: {}", key, e);
            }
        }
        if let Err(e) = fs::remove_dir(&self.dir) {
            warn!("Could not remove store directory {:?}: {}", self.dir, e);
        }
        self.keys.clear();
        self.version = 0;
        self.history.clear();
        self.history.insert(0, Vec::new());
    }

    fn keys(&self) -> Vec<Key> {
        self.keys.iter().copied().collect()
    }

    fn len(&self) -> usize {
        self.keys.len()
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
        fs::create_dir_all(&self.dir)?;
        for (key, value) in pairs {
            fs::write(self.path_for(key), &value)?;
            self.keys.insert(key);
        }
        self.version = version;
        self.history.clear();
        self.history.insert(version, keys);
        Ok(())
    }
}
