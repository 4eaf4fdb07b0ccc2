//! Content-addressed index of models.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::key::{Key, KeyCodec};
use crate::model::{Model, SharedModel};
use crate::param::ParameterSet;
use crate::storage::ModelStore;
use crate::types::ModelStatus;

/// What to do when an insert lands on a key held by a different model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Log a warning and point the key at the new model.
    #[default]
    Overwrite,
    /// Keep the existing model and return [`Error::DuplicateKey`].
    Reject,
}

/// Summary of a [`ModelCache::reconcile_from_store`] scan.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reconciliation {
    /// Keys of models loaded and indexed.
    pub loaded: Vec<Key>,
    /// Locations that could not be loaded, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

/// Index from [`Key`] to the model computed for it.
///
/// The cache does not own models: it holds shared handles to models whose
/// documents live in a [`ModelStore`], so a caller marking a model as
/// processed through its own handle is immediately visible here.
///
/// At most one model is indexed per key. Re-inserting a model with the same
/// name refreshes the existing entry in place; a model with a different
/// name is a conflict handled according to the [`DuplicatePolicy`].
#[derive(Debug, Default)]
pub struct ModelCache {
    codec: KeyCodec,
    policy: DuplicatePolicy,
    index: HashMap<Key, SharedModel>,
    duplicates: usize,
}

impl ModelCache {
    /// Creates an empty cache using `codec` to derive keys.
    #[must_use]
    pub fn new(codec: KeyCodec) -> Self {
        Self {
            codec,
            ..Self::default()
        }
    }

    /// Sets the duplicate policy.
    #[must_use]
    pub fn with_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The codec used to derive keys.
    #[must_use]
    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// The key for `parameters`.
    #[must_use]
    pub fn key(&self, parameters: &ParameterSet) -> Key {
        self.codec.encode(parameters)
    }

    /// The model indexed under `key`.
    #[must_use]
    pub fn lookup(&self, key: &Key) -> Option<SharedModel> {
        self.index.get(key).cloned()
    }

    /// The model indexed for `parameters`.
    #[must_use]
    pub fn get(&self, parameters: &ParameterSet) -> Option<SharedModel> {
        self.lookup(&self.key(parameters))
    }

    /// Indexes `model`, returning its key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`] under [`DuplicatePolicy::Reject`]
    /// when the key is held by a differently named model.
    pub fn insert(&mut self, model: Model) -> Result<Key> {
        self.insert_shared(model.into_shared())
    }

    /// Indexes an already shared model, returning its key.
    ///
    /// # Errors
    ///
    /// See [`insert`](Self::insert).
    pub fn insert_shared(&mut self, model: SharedModel) -> Result<Key> {
        let (key, name) = {
            let m = model.read();
            (self.codec.encode(&m.parameters), m.name.clone())
        };

        if let Some(existing) = self.index.get(&key) {
            if Arc::ptr_eq(existing, &model) {
                return Ok(key);
            }
            let existing_name = existing.read().name.clone();
            if existing_name == name {
                let fresh = model.read().clone();
                *existing.write() = fresh;
                return Ok(key);
            }

            self.duplicates += 1;
            match self.policy {
                DuplicatePolicy::Reject => {
                    trace_warn!(%key, existing = %existing_name, offered = %name, "rejecting duplicate model");
                    return Err(Error::DuplicateKey {
                        key,
                        existing: existing_name,
                        offered: name,
                    });
                }
                DuplicatePolicy::Overwrite => {
                    trace_warn!(%key, existing = %existing_name, offered = %name, "duplicate model for key, overwriting");
                }
            }
        }

        self.index.insert(key.clone(), model);
        Ok(key)
    }

    /// Loads every entry of `store` matching `pattern` into the cache.
    ///
    /// Entries that fail to load (I/O error, malformed document) or that
    /// the duplicate policy rejects are logged, recorded in
    /// [`Reconciliation::failed`], and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store cannot be listed at all.
    pub fn reconcile_from_store(
        &mut self,
        store: &dyn ModelStore,
        pattern: &str,
    ) -> Result<Reconciliation> {
        let mut report = Reconciliation::default();
        for location in store.list(pattern)? {
            trace_debug!(path = %location.display(), "loading model");
            let inserted = store.load(&location).and_then(|model| self.insert(model));
            match inserted {
                Ok(key) => report.loaded.push(key),
                Err(e) => {
                    trace_warn!(path = %location.display(), error = %e, "failed to load model, ignoring");
                    report.failed.push((location, e.to_string()));
                }
            }
        }
        trace_info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "reconciled cache with store"
        );
        Ok(report)
    }

    /// The status of the model under `key`.
    #[must_use]
    pub fn status_of(&self, key: &Key) -> Option<ModelStatus> {
        self.index.get(key).map(|m| m.read().status())
    }

    /// Status of every indexed model, by model name.
    #[must_use]
    pub fn statuses(&self) -> BTreeMap<String, ModelStatus> {
        self.index
            .values()
            .map(|m| {
                let m = m.read();
                (m.name.clone(), m.status())
            })
            .collect()
    }

    /// Returns `true` if any model is created but not yet submitted.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.index.values().any(|m| m.read().is_created())
    }

    /// Keys of models created but not yet submitted, sorted.
    #[must_use]
    pub fn pending(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self
            .index
            .iter()
            .filter(|(_, m)| m.read().is_created())
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Every indexed key, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.index.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Every indexed model, in key order.
    #[must_use]
    pub fn models(&self) -> Vec<SharedModel> {
        self.keys()
            .iter()
            .filter_map(|k| self.index.get(k).cloned())
            .collect()
    }

    /// How many conflicting inserts have been seen.
    #[must_use]
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// The number of indexed models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
