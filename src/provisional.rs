//! Provisional (speculative) evaluation.
//!
//! Before any expensive model exists, an optimizer can be run against
//! synthetic observations so that the full set of parameter sets it wants
//! is discovered up front. The sampler records every key requested in the
//! speculative pass and caps how many distinct keys may be registered:
//! once the cap is reached the pass ends, and the creation pass turns the
//! registered keys into real models.

use std::collections::HashMap;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::distribution::EvaluationDistribution;
use crate::error::Result;
use crate::key::Key;
use crate::series::Series;
use crate::types::Phase;

/// Registry of speculative keys with a backpressure cap.
///
/// # Examples
///
/// ```
/// use nalgebra::DMatrix;
/// use simrun::{EvaluationDistribution, KeyCodec, LabeledMatrix, ParameterSet, ProvisionalSampler, Series};
///
/// let names = vec!["obs".to_string()];
/// let dist = EvaluationDistribution::new(
///     Series::new(names.clone(), vec![0.0]).unwrap(),
///     LabeledMatrix::square(names, DMatrix::identity(1, 1)).unwrap(),
/// )
/// .unwrap();
/// let mut sampler = ProvisionalSampler::new(dist, 1, 42);
///
/// let codec = KeyCodec::default();
/// let a = codec.encode(&[("x", 1.0)].into_iter().collect::<ParameterSet>());
/// let b = codec.encode(&[("x", 2.0)].into_iter().collect::<ParameterSet>());
/// assert!(sampler.request(&a).unwrap().is_some());
/// assert!(sampler.request(&b).unwrap().is_none()); // cap reached
/// ```
#[derive(Debug)]
pub struct ProvisionalSampler {
    distribution: EvaluationDistribution,
    max_cases: usize,
    seed: u64,
    rng: StdRng,
    phase: Phase,
    registered: HashMap<Key, usize>,
    provisional_count: usize,
    promoted_count: usize,
    creation_draws: usize,
}

impl ProvisionalSampler {
    /// Creates a sampler in speculative mode.
    #[must_use]
    pub fn new(distribution: EvaluationDistribution, max_cases: usize, seed: u64) -> Self {
        Self {
            distribution,
            max_cases,
            seed,
            rng: StdRng::seed_from_u64(seed),
            phase: Phase::Speculative,
            registered: HashMap::new(),
            provisional_count: 0,
            promoted_count: 0,
            creation_draws: 0,
        }
    }

    /// Starts a speculative pass.
    ///
    /// Clears the registry and re-seeds the generator, so every pass sees
    /// the same sequence of draws and revisits the same keys.
    pub fn set_speculative(&mut self) {
        self.registered.clear();
        self.rng = StdRng::seed_from_u64(self.seed);
        self.phase = Phase::Speculative;
    }

    /// Starts a creation pass, keeping the keys registered so far.
    ///
    /// Resets the count of synthetic draws served in creation mode.
    pub fn set_creation(&mut self) {
        self.creation_draws = 0;
        self.phase = Phase::Creation;
    }

    /// The current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Registers `key` and returns a synthetic observation vector.
    ///
    /// A key already registered has its hit count incremented without
    /// consuming budget. Returns `Ok(None)` when `key` is new and the
    /// number of registered keys has reached the cap.
    ///
    /// # Errors
    ///
    /// Propagates [`InvalidCovariance`](crate::Error::InvalidCovariance)
    /// from the distribution.
    pub fn request(&mut self, key: &Key) -> Result<Option<Series>> {
        if !self.registered.contains_key(key) {
            if self.registered.len() >= self.max_cases {
                return Ok(None);
            }
            self.registered.insert(key.clone(), 0);
            self.provisional_count += 1;
            trace_debug!(%key, registered = self.registered.len(), "registered provisional case");
        }
        if let Some(hits) = self.registered.get_mut(key) {
            *hits += 1;
        }
        self.draw().map(Some)
    }

    /// Draws one synthetic observation vector without registering anything.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCovariance`](crate::Error::InvalidCovariance) if
    /// the covariance is not positive semi-definite.
    pub fn random_obs(&mut self) -> Result<Series> {
        self.draw()
    }

    fn draw(&mut self) -> Result<Series> {
        if self.phase == Phase::Creation {
            self.creation_draws += 1;
        }
        self.distribution.sample(&mut self.rng)
    }

    /// Synthetic draws served since the last [`set_creation`](Self::set_creation).
    ///
    /// A creation pass that served any draw has not seen real data for
    /// every point it evaluated.
    #[must_use]
    pub fn creation_draws(&self) -> usize {
        self.creation_draws
    }

    /// Returns `true` if `key` was registered in the current pass.
    #[must_use]
    pub fn is_registered(&self, key: &Key) -> bool {
        self.registered.contains_key(key)
    }

    /// How often `key` was requested in the current pass.
    #[must_use]
    pub fn hits(&self, key: &Key) -> usize {
        self.registered.get(key).copied().unwrap_or(0)
    }

    /// The number of keys registered in the current pass.
    #[must_use]
    pub fn registered(&self) -> usize {
        self.registered.len()
    }

    /// Records that a registered key was turned into a real model.
    pub fn record_promotion(&mut self) {
        self.promoted_count += 1;
    }

    /// Distinct provisional keys registered over the sampler's lifetime.
    #[must_use]
    pub fn provisional_count(&self) -> usize {
        self.provisional_count
    }

    /// Provisional keys later promoted to real models.
    #[must_use]
    pub fn promoted_count(&self) -> usize {
        self.promoted_count
    }

    /// The cap on distinct keys per pass.
    #[must_use]
    pub fn max_cases(&self) -> usize {
        self.max_cases
    }
}
