use core::sync::atomic::Ordering;

use crate::error::{Error, Halt, Interrupt};
use crate::key::Key;
use crate::model::ModelState;
use crate::param::ParameterSet;
use crate::series::Series;
use crate::types::Phase;

use super::Study;

impl Study {
    /// Simulated observations for one fully specified parameter set.
    ///
    /// `parameters` must already include fixed parameters and the
    /// ensemble member. The answer depends on what the cache holds:
    ///
    /// - a processed model gives its observations, reindexed to the
    ///   configured names;
    /// - a pending model gives all-NaN, or a synthetic draw when a
    ///   provisional sampler is attached;
    /// - a model in any other state is an error;
    /// - with no model, the sampler answers in the speculative pass, and
    ///   otherwise a pending model is created and all-NaN returned.
    ///
    /// With `scale` the result is multiplied by the configured scales.
    ///
    /// # Errors
    ///
    /// - [`Interrupt::BudgetExhausted`] when the speculative pass is full.
    /// - [`Interrupt::NeedsSubmission`] when the factory refuses a model.
    /// - [`Error::MissingObservations`] / [`Error::NullObservations`] for a
    ///   processed model with incomplete output.
    /// - [`Error::UnexpectedState`] for a model neither pending nor processed.
    pub fn sim_obs(&self, parameters: &ParameterSet, scale: bool) -> Result<Series, Halt> {
        let obs_names = self.config.obs_names();
        let key = self.key(parameters);
        let cached = self.cache.read().lookup(&key);

        let obs = if let Some(model) = cached {
            let model = model.read();
            match model.state() {
                ModelState::Processed(sim) => {
                    let missing = sim.absent(obs_names);
                    if !missing.is_empty() {
                        return Err(Error::MissingObservations {
                            model: model.name.clone(),
                            missing: missing.into_iter().map(str::to_owned).collect(),
                        }
                        .into());
                    }
                    let obs = sim.reindex(obs_names);
                    let nulls = obs.null_labels();
                    if !nulls.is_empty() {
                        return Err(Error::NullObservations {
                            model: model.name.clone(),
                            names: nulls.into_iter().map(str::to_owned).collect(),
                        }
                        .into());
                    }
                    obs
                }
                ModelState::Created => {
                    trace_debug!(model = %model.name, "model pending, no observations yet");
                    match &self.sampler {
                        Some(sampler) => sampler.lock().random_obs()?,
                        None => Series::missing(obs_names),
                    }
                }
                other => {
                    return Err(Error::UnexpectedState {
                        model: model.name.clone(),
                        status: other.status(),
                    }
                    .into());
                }
            }
        } else {
            self.uncached_obs(parameters, &key)?
        };

        if scale {
            Ok(obs.scale_by(&self.config.scales())?)
        } else {
            Ok(obs)
        }
    }

    fn uncached_obs(&self, parameters: &ParameterSet, key: &Key) -> Result<Series, Halt> {
        if let Some(sampler) = &self.sampler {
            let mut sampler = sampler.lock();
            if !(sampler.phase() == Phase::Creation && sampler.is_registered(key)) {
                return sampler
                    .request(key)?
                    .ok_or(Halt::Interrupt(Interrupt::BudgetExhausted));
            }
            self.create_model(parameters)?;
            sampler.record_promotion();
        } else {
            self.create_model(parameters)?;
        }
        Ok(Series::missing(self.config.obs_names()))
    }

    fn create_model(&self, parameters: &ParameterSet) -> Result<(), Halt> {
        let Some(model) = self.factory.create_model(parameters) else {
            trace_warn!("model factory refused a new model");
            return Err(Interrupt::NeedsSubmission {
                pending: self.pending(),
            }
            .into());
        };
        trace_info!(model = %model.name, "created model");
        self.cache.write().insert(model)?;
        self.models_created.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
