use core::sync::atomic::AtomicUsize;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::cache::{DuplicatePolicy, ModelCache};
use crate::config::StudyConfig;
use crate::error::Result;
use crate::model::{Model, ModelFactory, NamedModelFactory};
use crate::provisional::ProvisionalSampler;
use crate::storage::ModelStore;

use super::Study;

/// A builder for constructing [`Study`] instances with a fluent API.
///
/// Created via [`Study::builder()`].
///
/// # Defaults
///
/// - Factory: [`NamedModelFactory`] prefixed with the study name
/// - Store: none
/// - Duplicate policy: [`Overwrite`](DuplicatePolicy::Overwrite)
/// - Sampler: built from the configuration's provisional settings, if any
///
/// # Examples
///
/// ```
/// use simrun::model::NamedModelFactory;
/// use simrun::storage::MemoryStore;
/// use simrun::{DuplicatePolicy, Study, StudyConfig};
///
/// let config = StudyConfig::builder("s").params(["x"]).observations(["t"]).build().unwrap();
/// let study = Study::builder(config)
///     .factory(NamedModelFactory::new("run").max_models(10))
///     .store(MemoryStore::new())
///     .duplicate_policy(DuplicatePolicy::Reject)
///     .build()
///     .unwrap();
/// assert_eq!(study.n_models(), 0);
/// ```
pub struct StudyBuilder {
    config: StudyConfig,
    factory: Option<Arc<dyn ModelFactory>>,
    store: Option<Arc<dyn ModelStore>>,
    policy: DuplicatePolicy,
    models: Vec<Model>,
}

impl StudyBuilder {
    pub(super) fn new(config: StudyConfig) -> Self {
        Self {
            config,
            factory: None,
            store: None,
            policy: DuplicatePolicy::default(),
            models: Vec::new(),
        }
    }

    /// Set the factory used to create pending models.
    #[must_use]
    pub fn factory(mut self, factory: impl ModelFactory + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Set the store used by [`Study::reconcile`] and [`Study::persist_pending`].
    #[must_use]
    pub fn store(mut self, store: impl ModelStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Set a store that the caller keeps a handle to.
    #[must_use]
    pub fn store_shared(mut self, store: Arc<dyn ModelStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set how the cache treats two models with the same key.
    #[must_use]
    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Seed the cache with existing models.
    #[must_use]
    pub fn models(mut self, models: impl IntoIterator<Item = Model>) -> Self {
        self.models.extend(models);
        self
    }

    /// Build the study.
    ///
    /// # Errors
    ///
    /// Returns an error if the provisional distribution cannot be built
    /// from the configuration, or if a seeded model is rejected by the
    /// duplicate policy.
    pub fn build(self) -> Result<Study> {
        let mut cache = ModelCache::new(self.config.key_codec()).with_policy(self.policy);
        for model in self.models {
            cache.insert(model)?;
        }

        let sampler = match (self.config.provisional(), self.config.provisional_distribution()?) {
            (Some(p), Some(dist)) => Some(Mutex::new(ProvisionalSampler::new(
                dist,
                p.max_provisional_cases,
                p.rng_seed,
            ))),
            _ => None,
        };

        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(NamedModelFactory::new(self.config.name())));

        trace_debug!(
            study = self.config.name(),
            models = cache.len(),
            provisional = sampler.is_some(),
            "study built"
        );

        Ok(Study {
            config: self.config,
            cache: RwLock::new(cache),
            factory,
            store: self.store,
            sampler,
            models_created: AtomicUsize::new(0),
        })
    }
}
