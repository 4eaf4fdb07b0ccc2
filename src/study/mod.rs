//! Study: the cache, sampler and factory behind one evaluation function.

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::cache::{ModelCache, Reconciliation};
use crate::config::StudyConfig;
use crate::error::{Error, Result};
use crate::key::Key;
use crate::model::{ModelFactory, SharedModel};
use crate::param::ParameterSet;
use crate::provisional::ProvisionalSampler;
use crate::storage::ModelStore;
use crate::types::ModelStatus;

mod analysis;
mod batch;
mod builder;
mod evaluate;
mod jacobian;
mod run;

pub use batch::{BatchOutput, EvalOptions};
pub use builder::StudyBuilder;
pub use jacobian::{JacobianResult, range_aware_perturbations};

/// A study owns everything needed to answer "what does the model say at
/// these parameters?" without ever running a simulation twice.
///
/// All methods take `&self`: the cache, sampler and counters sit behind
/// locks so the optimizer closure passed to [`run`](Self::run) can borrow
/// the study while the runner drives it.
///
/// # Examples
///
/// ```
/// use simrun::{Outcome, StudyConfig, Study};
///
/// let config = StudyConfig::builder("demo")
///     .params(["x"])
///     .observations(["t"])
///     .build()
///     .unwrap();
/// let study = Study::new(config).unwrap();
///
/// let outcome = study
///     .run(|| study.evaluate_one(&[0.5], &Default::default()))
///     .unwrap();
/// assert!(outcome.needs_submission());
/// assert_eq!(study.models_created(), 1);
/// ```
pub struct Study {
    config: StudyConfig,
    cache: RwLock<ModelCache>,
    factory: Arc<dyn ModelFactory>,
    store: Option<Arc<dyn ModelStore>>,
    sampler: Option<Mutex<ProvisionalSampler>>,
    /// Models created since the last call to `run`.
    models_created: AtomicUsize,
}

impl Study {
    /// Creates a study with an empty cache, no store, and a
    /// [`NamedModelFactory`](crate::NamedModelFactory) prefixed with the study name.
    ///
    /// A provisional sampler is attached when the configuration carries
    /// provisional settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration has provisional
    /// settings but no usable total covariance.
    pub fn new(config: StudyConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Returns a [`StudyBuilder`] for `config`.
    #[must_use]
    pub fn builder(config: StudyConfig) -> StudyBuilder {
        StudyBuilder::new(config)
    }

    /// The study configuration.
    #[must_use]
    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    /// The study name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.config.name()
    }

    /// Read access to the model cache.
    pub fn cache(&self) -> RwLockReadGuard<'_, ModelCache> {
        self.cache.read()
    }

    /// The key for `parameters`.
    #[must_use]
    pub fn key(&self, parameters: &ParameterSet) -> Key {
        self.cache.read().key(parameters)
    }

    /// The model for `parameters`, if one exists.
    #[must_use]
    pub fn get_model(&self, parameters: &ParameterSet) -> Option<SharedModel> {
        self.cache.read().get(parameters)
    }

    /// The number of models in the cache.
    #[must_use]
    pub fn n_models(&self) -> usize {
        self.cache.read().len()
    }

    /// Returns `true` if any model is created but not yet submitted.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.cache.read().has_pending()
    }

    /// Keys of models waiting to be submitted.
    #[must_use]
    pub fn pending(&self) -> Vec<Key> {
        self.cache.read().pending()
    }

    /// Models created since the start of the last [`run`](Self::run).
    #[must_use]
    pub fn models_created(&self) -> usize {
        self.models_created.load(Ordering::Relaxed)
    }

    /// Returns `true` if a provisional sampler is attached.
    #[must_use]
    pub fn has_sampler(&self) -> bool {
        self.sampler.is_some()
    }

    /// `(provisional, promoted)` counts from the sampler, if any.
    #[must_use]
    pub fn provisional_counts(&self) -> Option<(usize, usize)> {
        self.sampler.as_ref().map(|s| {
            let s = s.lock();
            (s.provisional_count(), s.promoted_count())
        })
    }

    /// Loads models matching `pattern` from the attached store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no store is attached, or the store's
    /// error if it cannot be listed.
    pub fn reconcile(&self, pattern: &str) -> Result<Reconciliation> {
        let store = self.store()?;
        self.cache.write().reconcile_from_store(store.as_ref(), pattern)
    }

    /// Writes every pending model to the attached store.
    ///
    /// Models are created in memory only; this is the hand-off point to
    /// whatever instantiates and submits them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no store is attached, or the first
    /// write failure.
    pub fn persist_pending(&self) -> Result<Vec<PathBuf>> {
        let store = self.store()?;
        let cache = self.cache.read();
        let mut written = Vec::new();
        for model in cache.models() {
            let model = model.read();
            if model.is_created() {
                written.push(store.persist(&model)?);
            }
        }
        trace_info!(count = written.len(), "persisted pending models");
        Ok(written)
    }

    fn store(&self) -> Result<&Arc<dyn ModelStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| Error::Config("study has no model store".into()))
    }

    fn status_counts(&self) -> BTreeMap<ModelStatus, usize> {
        let mut counts = BTreeMap::new();
        for status in self.cache.read().statuses().into_values() {
            *counts.entry(status).or_insert(0) += 1;
        }
        counts
    }
}

impl fmt::Display for Study {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name: {} Nmodels: {}", self.name(), self.n_models())?;
        let counts = self.status_counts();
        if !counts.is_empty() {
            f.write_str(" Status:")?;
            for (status, n) in counts {
                write!(f, " {status}: {n}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Study {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Study")
            .field("name", &self.config.name())
            .field("models", &self.n_models())
            .field("sampler", &self.sampler.is_some())
            .field("store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}
