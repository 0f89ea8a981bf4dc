//! Persistence backends for the state store.
//!
//! A [`Storage`] is a synchronous, fallible string key/value store. The
//! state store writes its whole document as one JSON blob under a single
//! key on every mutation and reads it back once at startup.
//!
//! - [`MemoryStorage`]: process memory; used for tests and the `memory`
//!   backend.
//! - [`FileStorage`]: one `{key}.json` file per key in a directory.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::AppError;

/// Pluggable string key/value persistence.
pub trait Storage: Send + Sync {
    /// Short backend name for logs (e.g. `"file"`).
    fn kind(&self) -> &str;

    /// Read the blob stored under `key`; `Ok(None)` when nothing is stored.
    fn read(&self, key: &str) -> Result<Option<String>, AppError>;

    /// Replace the blob stored under `key`.
    fn write(&self, key: &str, blob: &str) -> Result<(), AppError>;
}

// ── MemoryStorage ─────────────────────────────────────────────────────────

/// Ephemeral in-memory storage. Data is discarded when the process exits.
#[derive(Default)]
pub struct MemoryStorage {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-seeded with one entry.
    pub fn with_entry(key: &str, blob: &str) -> Self {
        let storage = Self::new();
        if let Ok(mut data) = storage.data.lock() {
            data.insert(key.to_string(), blob.to_string());
        }
        storage
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, AppError> {
        self.data
            .lock()
            .map_err(|_| AppError::Storage("memory storage lock poisoned".into()))
    }
}

impl Storage for MemoryStorage {
    fn kind(&self) -> &str {
        "memory"
    }

    fn read(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn write(&self, key: &str, blob: &str) -> Result<(), AppError> {
        self.lock()?.insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

// ── FileStorage ───────────────────────────────────────────────────────────

/// Directory-backed storage: key `k` lives in `{dir}/k.json`.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (creating if needed) the storage directory.
    pub fn open(dir: &Path) -> Result<Self, AppError> {
        fs::create_dir_all(dir)
            .map_err(|e| AppError::Storage(format!("cannot create {}: {e}", dir.display())))?;
        Ok(Self { dir: dir.to_path_buf() })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, AppError> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(AppError::Storage(format!("invalid storage key '{key}'")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl Storage for FileStorage {
    fn kind(&self) -> &str {
        "file"
    }

    fn read(&self, key: &str) -> Result<Option<String>, AppError> {
        let path = self.key_path(key)?;
        match fs::read_to_string(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Storage(format!("cannot read {}: {e}", path.display()))),
        }
    }

    fn write(&self, key: &str, blob: &str) -> Result<(), AppError> {
        let path = self.key_path(key)?;
        // Write-then-rename: readers never see a partial blob.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, blob)
            .map_err(|e| AppError::Storage(format!("cannot write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            AppError::Storage(format!("cannot replace {}: {e}", path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_read_write() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.read("k").unwrap(), None);
        storage.write("k", "{}").unwrap();
        assert_eq!(storage.read("k").unwrap(), Some("{}".into()));
        storage.write("k", "[]").unwrap();
        assert_eq!(storage.read("k").unwrap(), Some("[]".into()));
        assert_eq!(storage.kind(), "memory");
    }

    #[test]
    fn memory_with_entry() {
        let storage = MemoryStorage::with_entry("k", "blob");
        assert_eq!(storage.read("k").unwrap(), Some("blob".into()));
    }

    #[test]
    fn file_read_write() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(&dir.path().join("state")).unwrap();
        assert_eq!(storage.read("academy_state").unwrap(), None);

        storage.write("academy_state", r#"{"a":1}"#).unwrap();
        assert_eq!(storage.read("academy_state").unwrap(), Some(r#"{"a":1}"#.into()));
        assert!(storage.dir().join("academy_state.json").exists());
        assert!(!storage.dir().join("academy_state.json.tmp").exists());
    }

    #[test]
    fn failed_replace_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        // A non-empty directory in the blob's place makes the rename fail.
        let blocker = dir.path().join("academy_state.json");
        fs::create_dir_all(blocker.join("inner")).unwrap();

        assert!(matches!(storage.write("academy_state", "{}"), Err(AppError::Storage(_))));
        assert!(!dir.path().join("academy_state.json.tmp").exists());
    }

    #[test]
    fn file_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        assert!(storage.write("../x", "{}").is_err());
        assert!(storage.read("").is_err());
        assert!(storage.read(".hidden").is_err());
    }
}
