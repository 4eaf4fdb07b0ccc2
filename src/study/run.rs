use core::sync::atomic::Ordering;

use crate::error::{Error, Halt, Interrupt, Outcome, Result};

use super::Study;

impl Study {
    /// Runs an optimizer function through the two-phase protocol.
    ///
    /// With a provisional sampler attached, `f` is first run speculatively
    /// against synthetic observations until it finishes or the sampler's
    /// budget is spent; that result is discarded. `f` is then run again in
    /// creation mode, where every parameter set the speculative pass asked
    /// for becomes a pending model.
    ///
    /// Returns [`Outcome::Value`] only when `f` completed in creation mode
    /// with no pending models and no synthetic observations served. Any
    /// other interrupt, in either pass, gives [`Outcome::NeedsSubmission`].
    /// `f` must be deterministic: seed any random state inside it.
    ///
    /// # Errors
    ///
    /// Returns any fault `f` raises.
    ///
    /// # Examples
    ///
    /// ```
    /// use simrun::{EvalOptions, Outcome, Study, StudyConfig};
    ///
    /// let config = StudyConfig::builder("s").params(["x"]).observations(["t"]).build().unwrap();
    /// let study = Study::new(config).unwrap();
    /// let f = study.objective(EvalOptions::new());
    ///
    /// let outcome = study.run(|| f(&[1.0])).unwrap();
    /// assert!(matches!(outcome, Outcome::NeedsSubmission(ref keys) if keys.len() == 1));
    /// ```
    pub fn run<T, F>(&self, f: F) -> Result<Outcome<T>>
    where
        F: FnMut() -> core::result::Result<T, Halt>,
    {
        self.run_with(f, |_| false)
    }

    /// As [`run`](Self::run), additionally treating creation-pass faults
    /// for which `is_transient` returns `true` as a request to submit.
    ///
    /// Optimizers fed NaN may fail numerically (a singular matrix, say);
    /// such failures just mean data is not available yet. Faults in the
    /// speculative pass always propagate.
    ///
    /// # Errors
    ///
    /// Returns any fault `f` raises that `is_transient` rejects.
    pub fn run_with<T, F, P>(&self, mut f: F, is_transient: P) -> Result<Outcome<T>>
    where
        F: FnMut() -> core::result::Result<T, Halt>,
        P: Fn(&Error) -> bool,
    {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("run", study = %self.name()).entered();

        self.models_created.store(0, Ordering::Relaxed);

        if let Some(sampler) = &self.sampler {
            sampler.lock().set_speculative();
            match f() {
                Ok(_) => {
                    trace_debug!("speculative pass completed");
                }
                Err(Halt::Interrupt(Interrupt::BudgetExhausted)) => {
                    trace_debug!("enough provisional cases gathered");
                }
                Err(Halt::Interrupt(_)) => {
                    self.reset_sampler();
                    let pending = self.pending();
                    trace_info!(pending = pending.len(), "speculative pass requested submission");
                    return Ok(Outcome::NeedsSubmission(pending));
                }
                Err(Halt::Fault(e)) => {
                    self.reset_sampler();
                    return Err(e);
                }
            }
            sampler.lock().set_creation();
        }

        let result = f();
        let synthetic = self
            .sampler
            .as_ref()
            .map_or(0, |sampler| sampler.lock().creation_draws());
        self.reset_sampler();

        let outcome = match result {
            Ok(value) if synthetic == 0 && !self.has_pending() => Outcome::Value(value),
            Ok(_) | Err(Halt::Interrupt(_)) => Outcome::NeedsSubmission(self.pending()),
            Err(Halt::Fault(e)) if is_transient(&e) => {
                trace_warn!(error = %e, "transient failure, treating as submission required");
                Outcome::NeedsSubmission(self.pending())
            }
            Err(Halt::Fault(e)) => return Err(e),
        };

        if outcome.needs_submission() {
            trace_info!(
                pending = self.pending().len(),
                created = self.models_created(),
                synthetic,
                "submission required"
            );
        } else {
            trace_info!("run complete");
        }
        Ok(outcome)
    }

    fn reset_sampler(&self) {
        if let Some(sampler) = &self.sampler {
            sampler.lock().set_speculative();
        }
    }
}
