use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use super::{ModelStore, matches_pattern, model_location};
use crate::error::{Error, Result};
use crate::model::Model;

/// An entry as held by the in-memory store.
#[derive(Clone, Debug)]
enum Entry {
    Model(Model),
    /// A document that cannot be decoded, kept to exercise load failures.
    Corrupt(String),
}

/// In-memory model store.
///
/// Entries are keyed by location, so listing and loading behave like a
/// directory tree without touching the filesystem.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<PathBuf, Entry>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `models`.
    #[must_use]
    pub fn with_models(models: impl IntoIterator<Item = Model>) -> Self {
        let store = Self::new();
        for model in models {
            store
                .entries
                .write()
                .insert(model_location(&model.name), Entry::Model(model));
        }
        store
    }

    /// Inserts an undecodable entry at `location`.
    pub fn insert_corrupt(&self, location: impl Into<PathBuf>, reason: impl Into<String>) {
        self.entries
            .write()
            .insert(location.into(), Entry::Corrupt(reason.into()));
    }

    /// The number of entries, corrupt ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if the store has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ModelStore for MemoryStore {
    fn list(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        Ok(self
            .entries
            .read()
            .keys()
            .filter(|path| {
                path.file_name()
                    .is_some_and(|n| matches_pattern(&n.to_string_lossy(), pattern))
            })
            .cloned()
            .collect())
    }

    fn load(&self, location: &Path) -> Result<Model> {
        match self.entries.read().get(location) {
            Some(Entry::Model(model)) => {
                let mut model = model.clone();
                model.config_path = Some(location.to_path_buf());
                Ok(model)
            }
            Some(Entry::Corrupt(reason)) => Err(Error::Storage(format!(
                "malformed entry {}: {reason}",
                location.display()
            ))),
            None => Err(Error::Storage(format!("no entry at {}", location.display()))),
        }
    }

    fn persist(&self, model: &Model) -> Result<PathBuf> {
        let location = model_location(&model.name);
        self.entries
            .write()
            .insert(location.clone(), Entry::Model(model.clone()));
        Ok(location)
    }
}
