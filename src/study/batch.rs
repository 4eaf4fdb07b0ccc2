use nalgebra::{DMatrix, DVector};

use crate::config::ENSEMBLE_MEMBER;
use crate::error::{Error, Halt, Interrupt};
use crate::param::{ParamValue, ParameterSet};
use crate::series::{LabeledMatrix, Series};

use super::Study;

/// Post-processing applied by [`Study::evaluate`].
///
/// Per ensemble member the steps run in a fixed order: scale, subtract
/// the targets, project through the transform. Members are then averaged
/// and finally reduced to a sum of squares if asked.
///
/// # Examples
///
/// ```
/// use simrun::EvalOptions;
///
/// let opts = EvalOptions::new().scale(true).residual(true).sum_square(true);
/// assert!(opts.raise_on_missing);
/// ```
#[derive(Clone, Debug)]
pub struct EvalOptions {
    /// Multiply observations by the configured scales.
    pub scale: bool,
    /// Subtract the (scaled, if `scale`) targets.
    pub residual: bool,
    /// Project every vector through this matrix.
    pub transform: Option<LabeledMatrix>,
    /// Average over ensemble members.
    pub ensemble_average: bool,
    /// Reduce each row to the sum of its squares.
    pub sum_square: bool,
    /// Turn any NaN in the output into a submission request.
    pub raise_on_missing: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            scale: false,
            residual: false,
            transform: None,
            ensemble_average: true,
            sum_square: false,
            raise_on_missing: true,
        }
    }
}

impl EvalOptions {
    /// The default options: ensemble averaged, raising on missing data.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scale observations.
    #[must_use]
    pub fn scale(mut self, scale: bool) -> Self {
        self.scale = scale;
        self
    }

    /// Return residuals against the targets.
    #[must_use]
    pub fn residual(mut self, residual: bool) -> Self {
        self.residual = residual;
        self
    }

    /// Project through `transform`.
    #[must_use]
    pub fn transform(mut self, transform: LabeledMatrix) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Average over ensemble members.
    #[must_use]
    pub fn ensemble_average(mut self, average: bool) -> Self {
        self.ensemble_average = average;
        self
    }

    /// Reduce rows to sums of squares.
    #[must_use]
    pub fn sum_square(mut self, sum_square: bool) -> Self {
        self.sum_square = sum_square;
        self
    }

    /// Raise a submission request on NaN output.
    #[must_use]
    pub fn raise_on_missing(mut self, raise: bool) -> Self {
        self.raise_on_missing = raise;
        self
    }
}

/// What [`Study::evaluate`] produces.
#[derive(Clone, Debug, PartialEq)]
pub enum BatchOutput {
    /// One labelled vector per row (per member when not averaged).
    Rows(Vec<Series>),
    /// One sum of squares per row.
    Scalars(DVector<f64>),
}

impl BatchOutput {
    /// The rows, if the output was not reduced.
    #[must_use]
    pub fn rows(&self) -> Option<&[Series]> {
        match self {
            Self::Rows(rows) => Some(rows),
            Self::Scalars(_) => None,
        }
    }

    /// The scalars, if the output was reduced.
    #[must_use]
    pub fn scalars(&self) -> Option<&DVector<f64>> {
        match self {
            Self::Rows(_) => None,
            Self::Scalars(s) => Some(s),
        }
    }

    /// The output as a dense matrix: one row per output row, or a single
    /// column of scalars.
    #[must_use]
    pub fn to_matrix(&self) -> DMatrix<f64> {
        match self {
            Self::Rows(rows) => {
                let ncols = rows.first().map_or(0, Series::len);
                DMatrix::from_fn(rows.len(), ncols, |i, j| rows[i].values()[j])
            }
            Self::Scalars(s) => DMatrix::from_column_slice(s.len(), 1, s.as_slice()),
        }
    }

    fn has_missing(&self) -> bool {
        match self {
            Self::Rows(rows) => rows.iter().any(Series::has_missing),
            Self::Scalars(s) => s.iter().any(|v| v.is_nan()),
        }
    }
}

impl Study {
    /// Evaluates every row of `params` (one column per varying parameter).
    ///
    /// Each row is merged with the fixed parameters and evaluated once per
    /// ensemble member via [`sim_obs`](Self::sim_obs).
    ///
    /// # Errors
    ///
    /// - [`Error::ParameterCount`] if the column count is wrong.
    /// - [`Error::NoObservations`] if there is nothing to evaluate.
    /// - [`Error::DimensionMismatch`] if the transform columns differ from
    ///   the observation names.
    /// - [`Interrupt::NeedsSubmission`] if `raise_on_missing` and any
    ///   output is NaN.
    /// - Anything [`sim_obs`](Self::sim_obs) returns.
    pub fn evaluate(&self, params: &DMatrix<f64>, opts: &EvalOptions) -> Result<BatchOutput, Halt> {
        let names = self.config.param_names();
        if params.ncols() != names.len() {
            return Err(Error::ParameterCount {
                expected: names.len(),
                got: params.ncols(),
            }
            .into());
        }
        let out_names = match &opts.transform {
            Some(t) => t.row_labels(),
            None => self.config.obs_names(),
        };
        if out_names.is_empty() {
            return Err(Error::NoObservations.into());
        }

        let targets = self.config.targets(opts.scale)?;
        let n_ens = self.config.ensemble_size();
        let mut rows = Vec::with_capacity(params.nrows());

        for row in params.row_iter() {
            let mut pset: ParameterSet = names.iter().cloned().zip(row.iter().copied()).collect();
            pset.extend_from(self.config.fixed_params());

            let mut members = Vec::with_capacity(n_ens);
            for member in 0..n_ens {
                pset.insert(ENSEMBLE_MEMBER, ParamValue::from(member));
                let mut obs = self.sim_obs(&pset, opts.scale)?;
                if opts.residual {
                    obs = obs.sub_aligned(&targets)?;
                }
                if let Some(t) = &opts.transform {
                    obs = t.apply(&obs)?;
                }
                members.push(obs);
            }

            if opts.ensemble_average {
                rows.push(Series::mean(&members)?);
            } else {
                rows.extend(members);
            }
        }

        let output = if opts.sum_square {
            BatchOutput::Scalars(DVector::from_iterator(
                rows.len(),
                rows.iter().map(Series::sum_of_squares),
            ))
        } else {
            BatchOutput::Rows(rows)
        };

        if opts.raise_on_missing && output.has_missing() {
            let pending = self.pending();
            trace_debug!(pending = pending.len(), "missing observations, submission required");
            return Err(Interrupt::NeedsSubmission { pending }.into());
        }
        Ok(output)
    }

    /// Evaluates a single parameter vector.
    ///
    /// # Errors
    ///
    /// As [`evaluate`](Self::evaluate).
    pub fn evaluate_one(&self, params: &[f64], opts: &EvalOptions) -> Result<BatchOutput, Halt> {
        self.evaluate(&DMatrix::from_row_slice(1, params.len(), params), opts)
    }

    /// An evaluation function for optimizers that take `f(x) -> y`.
    ///
    /// The closure returns the first output row, or a one-element vector
    /// when `sum_square` is set.
    ///
    /// # Examples
    ///
    /// ```
    /// use simrun::{EvalOptions, Halt, Study, StudyConfig};
    ///
    /// let config = StudyConfig::builder("s").params(["x"]).observations(["t"]).build().unwrap();
    /// let study = Study::new(config).unwrap();
    /// let f = study.objective(EvalOptions::new());
    /// assert!(matches!(f(&[1.0]), Err(Halt::Interrupt(_))));
    /// ```
    pub fn objective(&self, opts: EvalOptions) -> impl Fn(&[f64]) -> Result<DVector<f64>, Halt> + '_ {
        move |x| match self.evaluate_one(x, &opts)? {
            BatchOutput::Rows(rows) => Ok(rows
                .into_iter()
                .next()
                .map(|r| r.values().clone())
                .unwrap_or_else(|| DVector::zeros(0))),
            BatchOutput::Scalars(s) => Ok(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;

    use super::*;
    use crate::config::StudyConfig;
    use crate::model::Model;

    fn config(ensemble: usize) -> StudyConfig {
        StudyConfig::builder("s")
            .params(["x"])
            .observations(["a", "b"])
            .targets([1.0, 1.0])
            .ensemble_size(ensemble)
            .build()
            .unwrap()
    }

    fn processed(name: &str, x: f64, member: usize, obs: [f64; 2]) -> Model {
        let mut p: ParameterSet = [("x", x)].into_iter().collect();
        p.insert(ENSEMBLE_MEMBER, member);
        let mut m = Model::new(name, p);
        m.mark_processed(Series::new(vec!["a".into(), "b".into()], obs.to_vec()).unwrap());
        m
    }

    #[test]
    fn residual_and_sum_square() {
        let study = Study::builder(config(1))
            .models([processed("m", 0.5, 0, [3.0, 0.0])])
            .build()
            .unwrap();
        let out = study
            .evaluate_one(&[0.5], &EvalOptions::new().residual(true).sum_square(true))
            .unwrap();
        assert_eq!(out.scalars().unwrap().as_slice(), &[5.0]);
    }

    #[test]
    fn members_without_averaging_are_separate_rows() {
        let study = Study::builder(config(2))
            .models([
                processed("m0", 0.5, 0, [1.0, 2.0]),
                processed("m1", 0.5, 1, [3.0, 4.0]),
            ])
            .build()
            .unwrap();
        let out = study
            .evaluate_one(&[0.5], &EvalOptions::new().ensemble_average(false))
            .unwrap();
        assert_eq!(out.rows().unwrap().len(), 2);
        assert_eq!(out.to_matrix(), DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn wrong_parameter_count() {
        let study = Study::new(config(1)).unwrap();
        let err = study.evaluate_one(&[1.0, 2.0], &EvalOptions::new()).unwrap_err();
        assert!(matches!(err, Halt::Fault(Error::ParameterCount { expected: 1, got: 2 })));
    }

    #[test]
    fn missing_output_can_be_returned() {
        let study = Study::new(config(1)).unwrap();
        let out = study
            .evaluate_one(&[0.5], &EvalOptions::new().raise_on_missing(false))
            .unwrap();
        assert!(out.rows().unwrap()[0].has_missing());
        assert_eq!(study.models_created(), 1);
    }
}
