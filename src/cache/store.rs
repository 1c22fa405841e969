//! Key-value storage backends.
//!
//! `MemoryStore`: process-local map, used by tests and embedders.
//! `FileStore`: JSON object on disk, rewritten atomically on every change.

use std::{
    collections::BTreeMap,
    fs,
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
    sync::RwLock,
};

use thiserror::Error;
use tracing::debug;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("store file {path} is not a JSON object of strings: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode store contents: {0}")]
    Encode(#[source] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Synchronous string-keyed store shared by every run controller.
///
/// Writes are last-write-wins per key; there is no cross-key locking.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Every key currently present, in no particular order.
    fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Remove `key`; removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(rw_read(&self.entries, SOURCE, "memory.get").get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        rw_write(&self.entries, SOURCE, "memory.set").insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(rw_read(&self.entries, SOURCE, "memory.keys")
            .keys()
            .cloned()
            .collect())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        rw_write(&self.entries, SOURCE, "memory.remove").remove(key);
        Ok(())
    }
}

/// Durable store backed by a single JSON file.
///
/// The file is read once on [`FileStore::open`]; afterwards the in-memory copy
/// is authoritative and every mutation rewrites the file through a temporary
/// file persisted into place.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(StoreError::io(&path, err)),
        };

        debug!(
            target = "fencerun::cache::store",
            path = %path.display(),
            entries = entries.len(),
            "Opened file store"
        );

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|err| StoreError::io(dir, err))?;

        let encoded = serde_json::to_vec_pretty(entries).map_err(StoreError::Encode)?;
        let mut file = tempfile::Builder::new()
            .prefix(".fencerun-store")
            .suffix(".json")
            .tempfile_in(dir)
            .map_err(|err| StoreError::io(dir, err))?;
        file.write_all(&encoded)
            .and_then(|()| file.flush())
            .map_err(|err| StoreError::io(file.path(), err))?;
        file.persist(&self.path)
            .map_err(|err| StoreError::io(&self.path, err.error))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(rw_read(&self.entries, SOURCE, "file.get").get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = rw_write(&self.entries, SOURCE, "file.set");
        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(rw_read(&self.entries, SOURCE, "file.keys")
            .keys()
            .cloned()
            .collect())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = rw_write(&self.entries, SOURCE, "file.remove");
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn memory_store_round_trips_and_removes() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").expect("get"), None);

        store.set("k", "v1").expect("set");
        store.set("k", "v2").expect("overwrite");
        assert_eq!(store.get("k").expect("get").as_deref(), Some("v2"));

        store.remove("k").expect("remove");
        store.remove("k").expect("removing twice is fine");
        assert!(store.keys().expect("keys").is_empty());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("nested").join("results.json");

        let store = FileStore::open(&path).expect("open");
        store.set("run_code_result_abc", "a\nb").expect("set");
        store.set("other_key", "keep").expect("set");
        store.remove("other_key").expect("remove");
        drop(store);

        let reopened = FileStore::open(&path).expect("reopen");
        assert_eq!(
            reopened.get("run_code_result_abc").expect("get").as_deref(),
            Some("a\nb")
        );
        assert_eq!(reopened.get("other_key").expect("get"), None);
        assert_eq!(reopened.path(), path.as_path());
    }

    #[cfg(unix)]
    #[test]
    fn failed_persist_leaves_memory_unchanged() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("results.json");
        let store = FileStore::open(&path).expect("open");
        store.set("kept", "1").expect("set");

        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o500)).expect("chmod");
        let attempt = tempfile::tempfile_in(dir.path());
        let read_only = attempt.is_err();
        drop(attempt);

        if read_only {
            assert!(store.set("lost", "2").is_err());
            assert!(store.remove("kept").is_err());
        }
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o700)).expect("chmod");

        if read_only {
            assert_eq!(store.get("lost").expect("get"), None);
            assert_eq!(store.get("kept").expect("get").as_deref(), Some("1"));
            let reopened = FileStore::open(&path).expect("reopen");
            assert_eq!(reopened.keys().expect("keys"), store.keys().expect("keys"));
        }
    }

    #[test]
    fn file_store_treats_empty_file_as_empty() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("results.json");
        fs::write(&path, "").expect("write");

        let store = FileStore::open(&path).expect("open");
        assert!(store.keys().expect("keys").is_empty());
    }

    #[test]
    fn file_store_rejects_malformed_contents() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("results.json");
        fs::write(&path, "[1, 2, 3]").expect("write");

        let err = FileStore::open(&path).expect_err("corrupt file");
        assert!(matches!(err, StoreError::Corrupt { .. }), "got {err:?}");
    }
}
