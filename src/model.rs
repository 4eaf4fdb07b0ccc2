//! Models: the external simulation units the cache indexes.
//!
//! This crate never runs a model. It reads a model's parameters and state,
//! and asks a [`ModelFactory`] for new pending models when an evaluation
//! needs one. Everything after creation (instantiation, submission,
//! post-processing) belongs to the caller, which reports results back by
//! moving the model to [`ModelState::Processed`].

use core::sync::atomic::{AtomicU64, Ordering};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::key::{Key, KeyCodec};
use crate::param::ParameterSet;
use crate::series::Series;
use crate::types::ModelStatus;

/// The lifecycle state of a model.
///
/// Simulated observations are carried by the [`Processed`](Self::Processed)
/// variant, so a model has observations exactly when it is processed.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(
        tag = "status",
        content = "simulated_obs",
        rename_all = "SCREAMING_SNAKE_CASE"
    )
)]
pub enum ModelState {
    /// Created but not yet handed to the batch system.
    Created,
    /// Written out and ready to submit.
    Instantiated,
    /// Queued with the batch system.
    Submitted,
    /// Executing.
    Running,
    /// Finished executing, output not yet processed.
    Succeeded,
    /// Execution failed.
    Failed,
    /// Output processed into simulated observations.
    Processed(Series),
}

impl ModelState {
    /// The fieldless status for this state.
    #[must_use]
    pub fn status(&self) -> ModelStatus {
        match self {
            Self::Created => ModelStatus::Created,
            Self::Instantiated => ModelStatus::Instantiated,
            Self::Submitted => ModelStatus::Submitted,
            Self::Running => ModelStatus::Running,
            Self::Succeeded => ModelStatus::Succeeded,
            Self::Failed => ModelStatus::Failed,
            Self::Processed(_) => ModelStatus::Processed,
        }
    }
}

/// One simulation with its parameters and lifecycle state.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Model {
    /// Unique model name.
    pub name: String,
    /// Every parameter (variable, fixed and `ensembleMember`) of the run.
    pub parameters: ParameterSet,
    /// Where the model was loaded from, if it came from a store.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub config_path: Option<PathBuf>,
    state: ModelState,
}

/// A model shared between the cache and its owner.
pub type SharedModel = Arc<RwLock<Model>>;

impl Model {
    /// Creates a model in the [`Created`](ModelState::Created) state.
    #[must_use]
    pub fn new(name: impl Into<String>, parameters: ParameterSet) -> Self {
        Self {
            name: name.into(),
            parameters,
            config_path: None,
            state: ModelState::Created,
        }
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> &ModelState {
        &self.state
    }

    /// The current status.
    #[must_use]
    pub fn status(&self) -> ModelStatus {
        self.state.status()
    }

    /// Moves the model to `state`.
    pub fn set_state(&mut self, state: ModelState) {
        trace_debug!(model = %self.name, from = %self.state.status(), to = %state.status(), "model state change");
        self.state = state;
    }

    /// Records processed output, moving the model to [`Processed`](ModelState::Processed).
    pub fn mark_processed(&mut self, simulated_obs: Series) {
        self.set_state(ModelState::Processed(simulated_obs));
    }

    /// The simulated observations, present only when processed.
    #[must_use]
    pub fn simulated_obs(&self) -> Option<&Series> {
        match &self.state {
            ModelState::Processed(obs) => Some(obs),
            _ => None,
        }
    }

    /// Returns `true` if the model is processed.
    #[must_use]
    pub fn is_processed(&self) -> bool {
        matches!(self.state, ModelState::Processed(_))
    }

    /// Returns `true` if the model is created but not yet submitted.
    #[must_use]
    pub fn is_created(&self) -> bool {
        matches!(self.state, ModelState::Created)
    }

    /// The cache key of this model under `codec`.
    #[must_use]
    pub fn key(&self, codec: &KeyCodec) -> Key {
        codec.encode(&self.parameters)
    }

    /// Wraps the model for sharing with a cache.
    #[must_use]
    pub fn into_shared(self) -> SharedModel {
        Arc::new(RwLock::new(self))
    }
}

/// Creates pending models on request.
///
/// Returning `None` means the collaborator cannot take more models right
/// now (a quota or resource limit); the evaluator turns that into a
/// submission signal so existing pending models get run first.
pub trait ModelFactory: Send + Sync {
    /// Creates a new model for `parameters` in the `Created` state.
    fn create_model(&self, parameters: &ParameterSet) -> Option<Model>;
}

impl<F> ModelFactory for F
where
    F: Fn(&ParameterSet) -> Option<Model> + Send + Sync,
{
    fn create_model(&self, parameters: &ParameterSet) -> Option<Model> {
        self(parameters)
    }
}

/// A factory naming models `<prefix><counter>`.
///
/// # Examples
///
/// ```
/// use simrun::model::{ModelFactory, NamedModelFactory};
/// use simrun::ParameterSet;
///
/// let factory = NamedModelFactory::new("run").max_models(1);
/// let first = factory.create_model(&ParameterSet::new()).unwrap();
/// assert_eq!(first.name, "run0000");
/// assert!(factory.create_model(&ParameterSet::new()).is_none());
/// ```
#[derive(Debug)]
pub struct NamedModelFactory {
    prefix: String,
    next: AtomicU64,
    max_models: Option<u64>,
}

impl NamedModelFactory {
    /// Creates an unlimited factory.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(0),
            max_models: None,
        }
    }

    /// Limits the total number of models this factory will create.
    #[must_use]
    pub fn max_models(mut self, max_models: u64) -> Self {
        self.max_models = Some(max_models);
        self
    }

    /// Starts numbering at `start` (used when resuming a study).
    #[must_use]
    pub fn starting_at(self, start: u64) -> Self {
        self.next.store(start, Ordering::SeqCst);
        self
    }

    /// The number of models created so far.
    #[must_use]
    pub fn created(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl ModelFactory for NamedModelFactory {
    fn create_model(&self, parameters: &ParameterSet) -> Option<Model> {
        let limit = self.max_models.unwrap_or(u64::MAX);
        let id = self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < limit).then_some(n + 1))
            .ok()?;
        Some(Model::new(format!("{}{id:04}", self.prefix), parameters.clone()))
    }
}
