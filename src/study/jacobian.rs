use nalgebra::{DMatrix, DVector};

use crate::config::ParamRange;
use crate::error::{Error, Halt, Outcome, Result};
use crate::series::{LabeledMatrix, Series};

use super::{BatchOutput, EvalOptions, Study};

/// A finite-difference Jacobian in the whitened observation space.
#[derive(Clone, Debug, PartialEq)]
pub struct JacobianResult {
    /// One row per parameter, one column per transformed observation.
    pub jacobian: LabeledMatrix,
    /// `J·Jᵀ` over parameters: the Gauss-Newton approximation to the
    /// Hessian of the cost.
    pub hessian: LabeledMatrix,
    /// The parameter perturbations used, one per parameter.
    pub deltas: Series,
}

/// Perturbations of `base` that step toward the centre of each range.
///
/// Each delta has the magnitude of the matching step and is negative when
/// the base value lies above the centre of its range.
///
/// # Errors
///
/// Returns [`Error::ParameterCount`] if `ranges` or `steps` does not have
/// one entry per base value.
///
/// # Examples
///
/// ```
/// use nalgebra::DVector;
/// use simrun::{ParamRange, range_aware_perturbations};
///
/// let ranges = [ParamRange { min: 0.0, max: 10.0 }, ParamRange { min: 0.0, max: 10.0 }];
/// let deltas = range_aware_perturbations(
///     &DVector::from_vec(vec![2.0, 8.0]),
///     &ranges,
///     &DVector::from_vec(vec![-0.5, 0.5]),
/// )
/// .unwrap();
/// assert_eq!(deltas.as_slice(), &[0.5, -0.5]);
/// ```
pub fn range_aware_perturbations(
    base: &DVector<f64>,
    ranges: &[ParamRange],
    steps: &DVector<f64>,
) -> Result<DVector<f64>> {
    for got in [ranges.len(), steps.len()] {
        if got != base.len() {
            return Err(Error::ParameterCount {
                expected: base.len(),
                got,
            });
        }
    }
    Ok(DVector::from_fn(base.len(), |i, _| {
        let delta = steps[i].abs();
        if ranges[i].centre() < base[i] { -delta } else { delta }
    }))
}

impl Study {
    /// Estimates the Jacobian at the optimum parameters (or the begin
    /// parameters when no optimum is configured).
    ///
    /// The base point and one perturbed point per parameter are evaluated
    /// as a single batch through [`run`](Self::run), so the first call
    /// typically creates every model and returns
    /// [`Outcome::NeedsSubmission`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if ranges, steps or base parameters are
    /// missing, or if a perturbed point leaves its range.
    pub fn run_jacobian(&self, scale: bool) -> Result<Outcome<JacobianResult>> {
        let base = if self.config.has_optimum() {
            self.config.optimum_params()?
        } else {
            self.config.begin_params()?
        };
        let ranges = self.config.param_ranges()?;
        let deltas = range_aware_perturbations(&base, &ranges, &self.config.steps()?)?;

        let n = base.len();
        let mut points = DMatrix::from_fn(n + 1, n, |_, j| base[j]);
        for i in 0..n {
            points[(i + 1, i)] += deltas[i];
        }
        let names = self.config.param_names();
        for (j, range) in ranges.iter().enumerate() {
            if let Some(v) = points.column(j).iter().find(|&&v| v < range.min || v > range.max) {
                return Err(Error::Config(format!(
                    "jacobian point {v} for '{}' outside [{}, {}]",
                    names[j], range.min, range.max
                )));
            }
        }

        let opts = EvalOptions::new()
            .scale(scale)
            .residual(true)
            .transform(self.config.transform_matrix(scale)?);

        let outcome = self.run(|| {
            let BatchOutput::Rows(rows) = self.evaluate(&points, &opts)? else {
                return Err(Halt::Fault(Error::Algorithm("expected observation rows".into())));
            };
            let base_obs = rows[0].values();
            let jac = DMatrix::from_fn(n, base_obs.len(), |i, k| {
                (rows[i + 1].values()[k] - base_obs[k]) / deltas[i]
            });
            Ok((jac, rows[0].labels().to_vec()))
        })?;

        let (jac, obs_labels) = match outcome {
            Outcome::Value(v) => v,
            Outcome::NeedsSubmission(pending) => return Ok(Outcome::NeedsSubmission(pending)),
        };
        let hessian = &jac * jac.transpose();
        trace_info!(params = n, obs = obs_labels.len(), "jacobian computed");
        Ok(Outcome::Value(JacobianResult {
            jacobian: LabeledMatrix::new(names.to_vec(), obs_labels, jac)?,
            hessian: LabeledMatrix::square(names.to_vec(), hessian)?,
            deltas: Series::new(names.to_vec(), deltas.as_slice().to_vec())?,
        }))
    }

    /// Evaluates the configured optimum parameters, ensemble averaged and
    /// unscaled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no optimum is configured, or any fault
    /// from the evaluation.
    pub fn run_optimized(&self) -> Result<Outcome<Series>> {
        let start = self.config.optimum_params()?;
        let opts = EvalOptions::new();
        self.run(|| match self.evaluate_one(start.as_slice(), &opts)? {
            BatchOutput::Rows(mut rows) if !rows.is_empty() => Ok(rows.swap_remove(0)),
            _ => Err(Error::NoObservations.into()),
        })
    }
}
