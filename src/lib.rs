#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Evaluation cache and two-phase batch scheduler for expensive,
//! externally executed simulations.
//!
//! Optimization algorithms expect a plain function `f(x) -> y`. When each
//! evaluation is a simulation that runs for hours on a batch system, that
//! function has to be able to say "not ready yet". This crate provides it:
//!
//! - a content-addressed [`ModelCache`] so no parameter set is ever run twice,
//! - a [`ProvisionalSampler`] that lets the optimizer explore speculatively
//!   against synthetic observations before anything is submitted,
//! - [`Study::run`], which runs an optimizer function twice (speculatively,
//!   then for real) and tells the caller whether models must be submitted.
//!
//! # Getting Started
//!
//! ```
//! use simrun::prelude::*;
//!
//! let config = StudyConfig::builder("demo")
//!     .params(["vf1", "ent"])
//!     .observations(["temp", "precip"])
//!     .targets([1.0, 2.0])
//!     .build()
//!     .unwrap();
//! let study = Study::new(config).unwrap();
//! let f = study.objective(EvalOptions::new().residual(true));
//!
//! // First run: nothing exists yet, so a model is created.
//! let outcome = study.run(|| f(&[1.5, 0.3])).unwrap();
//! let Outcome::NeedsSubmission(pending) = outcome else { unreachable!() };
//! assert_eq!(pending.len(), 1);
//!
//! // The batch system runs the model and reports its observations.
//! let model = study.cache().lookup(&pending[0]).unwrap();
//! model
//!     .write()
//!     .mark_processed(Series::new(vec!["temp".into(), "precip".into()], vec![1.5, 2.0]).unwrap());
//!
//! // Second run: every value is available.
//! let y = study.run(|| f(&[1.5, 0.3])).unwrap().value().unwrap();
//! assert_eq!(y.as_slice(), &[0.5, 0.0]);
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`KeyCodec`] | Canonical, order-independent text key for a [`ParameterSet`]. |
//! | [`Model`] | One simulation: parameters plus lifecycle [`ModelState`]. |
//! | [`ModelCache`] | At most one model per key. |
//! | [`ProvisionalSampler`] | Synthetic observations and a cap on speculative keys. |
//! | [`Study`] | Evaluation point, batch evaluator and two-phase runner. |
//! | [`Outcome`] / [`Halt`] | Explicit control flow in place of "missing data" errors. |
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `serde` | `Serialize`/`Deserialize` on models and configuration | off |
//! | `directory` | [`DirectoryStore`](storage::DirectoryStore): one JSON document per model with file locking (enables `serde`) | on |
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) under a `run` span | on |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::warn!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn {
    ($($arg:tt)*) => {};
}

mod cache;
mod config;
mod distribution;
mod error;
mod key;
pub mod model;
mod param;
mod provisional;
mod series;
pub mod storage;
mod study;
mod types;

pub use cache::{DuplicatePolicy, ModelCache, Reconciliation};
pub use config::{ENSEMBLE_MEMBER, ParamRange, ProvisionalConfig, StudyConfig, StudyConfigBuilder};
pub use distribution::EvaluationDistribution;
pub use error::{Error, Halt, Interrupt, Outcome, Result};
pub use key::{DEFAULT_PRECISION, Key, KeyCodec};
pub use model::{Model, ModelFactory, ModelState, NamedModelFactory, SharedModel};
pub use param::{ParamValue, ParameterSet};
pub use provisional::ProvisionalSampler;
pub use series::{LabeledMatrix, Series};
pub use study::{
    BatchOutput, EvalOptions, JacobianResult, Study, StudyBuilder, range_aware_perturbations,
};
pub use types::{ModelStatus, Phase};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use simrun::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cache::{DuplicatePolicy, ModelCache};
    pub use crate::config::{ProvisionalConfig, StudyConfig};
    pub use crate::error::{Error, Halt, Interrupt, Outcome, Result};
    pub use crate::key::{Key, KeyCodec};
    pub use crate::model::{Model, ModelFactory, ModelState, NamedModelFactory};
    pub use crate::param::{ParamValue, ParameterSet};
    pub use crate::series::{LabeledMatrix, Series};
    #[cfg(feature = "directory")]
    pub use crate::storage::DirectoryStore;
    pub use crate::storage::{MemoryStore, ModelStore};
    pub use crate::study::{BatchOutput, EvalOptions, Study, StudyBuilder};
    pub use crate::types::ModelStatus;
}
