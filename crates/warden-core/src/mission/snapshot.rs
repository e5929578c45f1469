//! Pre-image snapshots backing batch reversibility.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::types::{ContentHash, Timestamp};

/// Byte-exact pre-image of the files a batch touches.
///
/// Hashes let rollback verification assert byte-identity without diffing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub owner: String,
    pub files: BTreeMap<String, String>,
    pub hashes: BTreeMap<String, ContentHash>,
    pub timestamp: Timestamp,
}

impl Snapshot {
    pub fn capture(owner: impl Into<String>, files: &BTreeMap<String, String>) -> Self {
        let hashes = files
            .iter()
            .map(|(path, content)| (path.clone(), ContentHash::of(content)))
            .collect();
        Self {
            owner: owner.into(),
            files: files.clone(),
            hashes,
            timestamp: crate::types::now(),
        }
    }

    /// True when `files` is byte-identical to the snapshot.
    pub fn matches(&self, files: &BTreeMap<String, String>) -> bool {
        if files.len() != self.files.len() {
            return false;
        }
        files.iter().all(|(path, content)| {
            self.hashes
                .get(path)
                .map_or(false, |hash| *hash == ContentHash::of(content))
        })
    }
}

/// Snapshots keyed by owner reference. Lifetime follows the owning batch:
/// taken before mutation, destroyed on rollback or mission purge.
pub struct SnapshotStore {
    inner: Mutex<HashMap<String, Snapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn capture(&self, owner: impl Into<String>, files: &BTreeMap<String, String>) -> String {
        let snapshot = Snapshot::capture(owner, files);
        let key = snapshot.owner.clone();
        self.inner.lock().insert(key.clone(), snapshot);
        key
    }

    pub fn get(&self, key: &str) -> Option<Snapshot> {
        self.inner.lock().get(key).cloned()
    }

    /// Remove and return a snapshot; used when its lifetime ends.
    pub fn take(&self, key: &str) -> Option<Snapshot> {
        self.inner.lock().remove(key)
    }

    /// Drop every snapshot whose key starts with `prefix`.
    pub fn purge_prefix(&self, prefix: &str) {
        self.inner.lock().retain(|key, _| !key.starts_with(prefix));
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_files() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("src/a.ts".to_string(), "const a = 1;\n".to_string()),
            ("src/b.ts".to_string(), "const b = 2;\n".to_string()),
        ])
    }

    #[test]
    fn capture_take_round_trip() {
        let store = SnapshotStore::new();
        let files = sample_files();
        let key = store.capture("batch:1", &files);

        let snapshot = store.take(&key).unwrap();
        assert_eq!(snapshot.files, files);
        assert!(store.is_empty());
    }

    #[test]
    fn matches_detects_any_byte_drift() {
        let files = sample_files();
        let snapshot = Snapshot::capture("batch:1", &files);
        assert!(snapshot.matches(&files));

        let mut drifted = files.clone();
        drifted.insert("src/a.ts".to_string(), "const a = 2;\n".to_string());
        assert!(!snapshot.matches(&drifted));

        let mut shrunk = files;
        shrunk.remove("src/b.ts");
        assert!(!snapshot.matches(&shrunk));
    }

    #[test]
    fn purge_prefix_scopes_to_mission() {
        let store = SnapshotStore::new();
        let files = sample_files();
        store.capture("m1/batch:1", &files);
        store.capture("m1/batch:2", &files);
        store.capture("m2/batch:1", &files);

        store.purge_prefix("m1/");
        assert_eq!(store.len(), 1);
        assert!(store.get("m2/batch:1").is_some());
    }
}
