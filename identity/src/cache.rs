//! Local pepper storage keyed by phone number.

use crate::error::IdentityError;
use avk_types::{E164Number, Pepper};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

/// A get/set key-value store from phone number to pepper.
pub trait PepperCache: Send + Sync {
    fn get(&self, phone: &E164Number) -> Result<Option<Pepper>, IdentityError>;

    fn set(&self, phone: &E164Number, pepper: &Pepper) -> Result<(), IdentityError>;
}

#[derive(Default)]
pub struct MemoryPepperCache {
    entries: RwLock<HashMap<String, Pepper>>,
}

impl MemoryPepperCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PepperCache for MemoryPepperCache {
    fn get(&self, phone: &E164Number) -> Result<Option<Pepper>, IdentityError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| IdentityError::Cache("lock poisoned".into()))?;
        Ok(entries.get(phone.as_str()).cloned())
    }

    fn set(&self, phone: &E164Number, pepper: &Pepper) -> Result<(), IdentityError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| IdentityError::Cache("lock poisoned".into()))?;
        entries.insert(phone.as_str().to_string(), pepper.clone());
        Ok(())
    }
}

/// Pepper cache persisted as a JSON object in a single file.
///
/// The whole file is read on open and rewritten on every `set`.
pub struct FilePepperCache {
    path: PathBuf,
    entries: RwLock<HashMap<String, Pepper>>,
}

impl FilePepperCache {
    /// Open the cache at `path`. A missing file is an empty cache.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IdentityError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let json = std::fs::read_to_string(&path)
                .map_err(|e| IdentityError::Cache(format!("read {}: {e}", path.display())))?;
            serde_json::from_str(&json)
                .map_err(|e| IdentityError::Cache(format!("parse {}: {e}", path.display())))?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, Pepper>) -> Result<(), IdentityError> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| IdentityError::Cache(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| IdentityError::Cache(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| IdentityError::Cache(format!("rename to {}: {e}", self.path.display())))?;
        debug!(path = %self.path.display(), entries = entries.len(), "pepper cache saved");
        Ok(())
    }
}

impl PepperCache for FilePepperCache {
    fn get(&self, phone: &E164Number) -> Result<Option<Pepper>, IdentityError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| IdentityError::Cache("lock poisoned".into()))?;
        Ok(entries.get(phone.as_str()).cloned())
    }

    fn set(&self, phone: &E164Number, pepper: &Pepper) -> Result<(), IdentityError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| IdentityError::Cache("lock poisoned".into()))?;
        entries.insert(phone.as_str().to_string(), pepper.clone());
        self.persist(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phone() -> E164Number {
        E164Number::parse("+14155550000").unwrap()
    }

    #[test]
    fn memory_cache_get_set() {
        let cache = MemoryPepperCache::new();
        assert_eq!(cache.get(&phone()).unwrap(), None);
        let pepper = Pepper::new("nDjlcYoFZ1bQU").unwrap();
        cache.set(&phone(), &pepper).unwrap();
        assert_eq!(cache.get(&phone()).unwrap(), Some(pepper));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn file_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peppers.json");
        let pepper = Pepper::new("piWqRHHYWtfg9").unwrap();
        {
            let cache = FilePepperCache::open(&path).unwrap();
            cache.set(&phone(), &pepper).unwrap();
        }
        let reopened = FilePepperCache::open(&path).unwrap();
        assert_eq!(reopened.get(&phone()).unwrap(), Some(pepper));
    }

    #[test]
    fn corrupt_file_is_a_cache_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peppers.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            FilePepperCache::open(&path),
            Err(IdentityError::Cache(_))
        ));
    }
}
