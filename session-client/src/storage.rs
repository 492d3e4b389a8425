//! Local key-value namespaces backing the token store.
//!
//! `MemoryStorage` stands in for the tab-scoped namespace and disappears with
//! the process. `FileStorage` is the origin-scoped namespace: a single JSON
//! object on disk, rewritten through a temp file and renamed into place so a
//! reader never sees a half-written value.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use common_auth::{AuthError, AuthResult};
use tracing::debug;

pub trait KeyValueStorage: Send + Sync {
    fn get_item(&self, key: &str) -> AuthResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> AuthResult<()>;
    fn remove_item(&self, key: &str) -> AuthResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> AuthResult<Option<String>> {
        let guard = self.inner.read().map_err(|_| AuthError::StorageRead {
            key: key.to_string(),
            message: "lock poisoned".into(),
        })?;
        Ok(guard.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> AuthResult<()> {
        let mut guard = self.inner.write().map_err(|_| AuthError::StorageWrite {
            key: key.to_string(),
            message: "lock poisoned".into(),
        })?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> AuthResult<()> {
        let mut guard = self.inner.write().map_err(|_| AuthError::StorageWrite {
            key: key.to_string(),
            message: "lock poisoned".into(),
        })?;
        guard.remove(key);
        Ok(())
    }
}

#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Storage file `<dir>/<namespace>.json`, creating `dir` if needed.
    pub fn in_dir(dir: impl AsRef<Path>, namespace: &str) -> AuthResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|err| AuthError::StorageWrite {
            key: dir.display().to_string(),
            message: err.to_string(),
        })?;
        Ok(Self::new(dir.join(format!("{namespace}.json"))))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self, key: &str) -> AuthResult<HashMap<String, String>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(err) => {
                return Err(AuthError::StorageRead {
                    key: key.to_string(),
                    message: err.to_string(),
                })
            }
        };
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&raw).map_err(|err| AuthError::StorageRead {
            key: key.to_string(),
            message: format!("corrupt storage file {}: {err}", self.path.display()),
        })
    }

    fn persist(&self, key: &str, entries: &HashMap<String, String>) -> AuthResult<()> {
        let write_err = |message: String| AuthError::StorageWrite {
            key: key.to_string(),
            message,
        };
        let payload = serde_json::to_vec(entries).map_err(|err| write_err(err.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).map_err(|err| write_err(err.to_string()))?;
        file.write_all(&payload)
            .and_then(|_| file.sync_all())
            .map_err(|err| write_err(err.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|err| write_err(err.to_string()))?;
        debug!(path = %self.path.display(), key, "persisted storage namespace");
        Ok(())
    }

    fn update<F>(&self, key: &str, apply: F) -> AuthResult<()>
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        let _guard = self.write_lock.lock().map_err(|_| AuthError::StorageWrite {
            key: key.to_string(),
            message: "lock poisoned".into(),
        })?;
        // A corrupt file is replaced rather than blocking every later write.
        let mut entries = self.load(key).unwrap_or_default();
        apply(&mut entries);
        self.persist(key, &entries)
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> AuthResult<Option<String>> {
        Ok(self.load(key)?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> AuthResult<()> {
        self.update(key, |entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove_item(&self, key: &str) -> AuthResult<()> {
        self.update(key, |entries| {
            entries.remove(key);
        })
    }
}
