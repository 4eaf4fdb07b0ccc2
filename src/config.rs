//! Study configuration.
//!
//! [`StudyConfig`] is read-only once built: it names the varying parameters
//! and the observations, supplies targets, scalings and covariances, and
//! configures key precision and provisional running.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::distribution::EvaluationDistribution;
use crate::error::{Error, Result};
use crate::key::{DEFAULT_PRECISION, KeyCodec};
use crate::param::ParameterSet;
use crate::series::{LabeledMatrix, Series};

/// Eigenvalues below this fraction of the largest are dropped from transforms.
const EIGEN_CUTOFF: f64 = 1e-6;

/// Name of the parameter carrying the ensemble member index.
pub const ENSEMBLE_MEMBER: &str = "ensembleMember";

/// Settings for provisional running.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProvisionalConfig {
    /// Cap on distinct speculative keys per pass.
    pub max_provisional_cases: usize,
    /// Seed for synthetic draws, re-used for every speculative pass.
    #[cfg_attr(feature = "serde", serde(default = "default_seed"))]
    pub rng_seed: u64,
    /// Factor applied to the total covariance for synthetic draws.
    #[cfg_attr(feature = "serde", serde(default = "default_inflation"))]
    pub cov_inflation: f64,
}

fn default_seed() -> u64 {
    1_234_567
}

fn default_inflation() -> f64 {
    10.0
}

impl ProvisionalConfig {
    /// Provisional running capped at `max_provisional_cases` with default seed and inflation.
    #[must_use]
    pub fn new(max_provisional_cases: usize) -> Self {
        Self {
            max_provisional_cases,
            rng_seed: default_seed(),
            cov_inflation: default_inflation(),
        }
    }

    /// Sets the seed.
    #[must_use]
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = seed;
        self
    }

    /// Sets the covariance inflation.
    #[must_use]
    pub fn cov_inflation(mut self, factor: f64) -> Self {
        self.cov_inflation = factor;
        self
    }
}

/// Valid range of a varying parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParamRange {
    /// Smallest allowed value.
    pub min: f64,
    /// Largest allowed value.
    pub max: f64,
}

impl ParamRange {
    /// `max - min`.
    #[must_use]
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// The midpoint of the range.
    #[must_use]
    pub fn centre(&self) -> f64 {
        0.5 * (self.min + self.max)
    }
}

/// Configuration of a study.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StudyConfig {
    name: String,
    param_names: Vec<String>,
    obs_names: Vec<String>,
    fixed_params: ParameterSet,
    ensemble_size: usize,
    scales: Option<Series>,
    targets: Series,
    cov_total: Option<LabeledMatrix>,
    cov_int_var: Option<LabeledMatrix>,
    key_precision: usize,
    provisional: Option<ProvisionalConfig>,
    ranges: BTreeMap<String, ParamRange>,
    steps: BTreeMap<String, f64>,
    begin: Option<Series>,
    optimum: Option<Series>,
}

impl StudyConfig {
    /// Starts building a configuration.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> StudyConfigBuilder {
        StudyConfigBuilder::new(name)
    }

    /// The study name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the varying parameters, in vector order.
    #[must_use]
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Names of the observations the study fits.
    #[must_use]
    pub fn obs_names(&self) -> &[String] {
        &self.obs_names
    }

    /// Parameters held fixed for every model.
    #[must_use]
    pub fn fixed_params(&self) -> &ParameterSet {
        &self.fixed_params
    }

    /// Ensemble members run per parameter set.
    #[must_use]
    pub fn ensemble_size(&self) -> usize {
        self.ensemble_size
    }

    /// The codec for this study's key precision.
    #[must_use]
    pub fn key_codec(&self) -> KeyCodec {
        KeyCodec::with_precision(self.key_precision)
    }

    /// Provisional running settings, if enabled.
    #[must_use]
    pub fn provisional(&self) -> Option<&ProvisionalConfig> {
        self.provisional.as_ref()
    }

    /// Per-observation scale factors (1 where unset).
    #[must_use]
    pub fn scales(&self) -> Series {
        match &self.scales {
            Some(s) => {
                let r = s.reindex(&self.obs_names);
                let values = r.values().map(|v| if v.is_nan() { 1.0 } else { v });
                Series::from_parts(self.obs_names.clone(), values)
            }
            None => Series::filled(&self.obs_names, 1.0),
        }
    }

    /// Target observations, optionally scaled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if scaling fails.
    pub fn targets(&self, scale: bool) -> Result<Series> {
        let t = self.targets.reindex(&self.obs_names);
        if scale { t.scale_by(&self.scales()) } else { Ok(t) }
    }

    /// Total observational error covariance over the observations, optionally scaled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no covariance is configured, or a
    /// dimension error if it does not cover every observation.
    pub fn cov_total(&self, scale: bool) -> Result<LabeledMatrix> {
        self.covariance(self.cov_total.as_ref(), "CovTotal", scale)
    }

    /// Internal variability covariance, optionally scaled.
    ///
    /// # Errors
    ///
    /// As [`cov_total`](Self::cov_total).
    pub fn cov_int_var(&self, scale: bool) -> Result<LabeledMatrix> {
        self.covariance(self.cov_int_var.as_ref(), "CovIntVar", scale)
    }

    fn covariance(
        &self,
        cov: Option<&LabeledMatrix>,
        what: &str,
        scale: bool,
    ) -> Result<LabeledMatrix> {
        let cov = cov.ok_or_else(|| Error::Config(format!("no {what} covariance configured")))?;
        let cov = cov.select(&self.obs_names)?;
        if scale { cov.scale_by(&self.scales()) } else { Ok(cov) }
    }

    /// Projection into the eigenbasis of the total covariance.
    ///
    /// Rows are eigenvectors divided by the square root of their eigenvalue,
    /// largest eigenvalue first, so the projected covariance is the
    /// identity. Eigenvalues below `1e-6` of the largest are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if there is no total covariance or it has
    /// no usable eigenvalues.
    pub fn transform_matrix(&self, scale: bool) -> Result<LabeledMatrix> {
        let cov = self.cov_total(scale)?;
        let data = cov.data();
        let symmetric = (data + data.transpose()) / 2.0;
        let eigen = symmetric.symmetric_eigen();

        let largest = eigen.eigenvalues.max();
        let mut order: Vec<usize> = (0..eigen.eigenvalues.len())
            .filter(|&i| largest > 0.0 && eigen.eigenvalues[i] > EIGEN_CUTOFF * largest)
            .collect();
        if order.is_empty() {
            return Err(Error::Config(
                "total covariance has no positive eigenvalues. Fix your covariance".into(),
            ));
        }
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

        let n = self.obs_names.len();
        let rows = DMatrix::from_fn(order.len(), n, |r, c| {
            let i = order[r];
            eigen.eigenvectors[(c, i)] / eigen.eigenvalues[i].sqrt()
        });
        let labels = (0..order.len()).map(|i| format!("ev{i}")).collect();
        LabeledMatrix::new(labels, self.obs_names.clone(), rows)
    }

    /// The distribution synthetic observations are drawn from: unscaled
    /// targets as mean, inflated total covariance.
    ///
    /// Returns `Ok(None)` when provisional running is disabled.
    ///
    /// # Errors
    ///
    /// Propagates covariance lookup and distribution validation errors.
    pub fn provisional_distribution(&self) -> Result<Option<EvaluationDistribution>> {
        let Some(prov) = &self.provisional else {
            return Ok(None);
        };
        let mean = self.targets(false)?;
        let cov = self.cov_total(false)?.scaled(prov.cov_inflation);
        EvaluationDistribution::new(mean, cov).map(Some)
    }

    /// The valid range of `name`.
    #[must_use]
    pub fn range(&self, name: &str) -> Option<ParamRange> {
        self.ranges.get(name).copied()
    }

    /// Ranges of the varying parameters, in vector order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first parameter without a range.
    pub fn param_ranges(&self) -> Result<Vec<ParamRange>> {
        self.param_names
            .iter()
            .map(|n| {
                self.range(n)
                    .ok_or_else(|| Error::Config(format!("no range for parameter '{n}'")))
            })
            .collect()
    }

    /// Finite-difference steps of the varying parameters, in vector order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first parameter without a step.
    pub fn steps(&self) -> Result<DVector<f64>> {
        let steps = self
            .param_names
            .iter()
            .map(|n| {
                self.steps
                    .get(n)
                    .copied()
                    .ok_or_else(|| Error::Config(format!("no step for parameter '{n}'")))
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(DVector::from_vec(steps))
    }

    /// Starting parameter values, in vector order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if none are configured or one is missing.
    pub fn begin_params(&self) -> Result<DVector<f64>> {
        self.param_vector(self.begin.as_ref(), "begin")
    }

    /// Optimum parameter values, in vector order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if none are configured or one is missing.
    pub fn optimum_params(&self) -> Result<DVector<f64>> {
        self.param_vector(self.optimum.as_ref(), "optimum")
    }

    /// Returns `true` if optimum parameters are configured.
    #[must_use]
    pub fn has_optimum(&self) -> bool {
        self.optimum.is_some()
    }

    fn param_vector(&self, series: Option<&Series>, what: &str) -> Result<DVector<f64>> {
        let series = series.ok_or_else(|| Error::Config(format!("no {what} parameters")))?;
        let values = self
            .param_names
            .iter()
            .map(|n| {
                series
                    .get(n)
                    .ok_or_else(|| Error::Config(format!("no {what} value for '{n}'")))
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(DVector::from_vec(values))
    }
}

/// Builder for [`StudyConfig`].
///
/// # Examples
///
/// ```
/// use simrun::StudyConfig;
///
/// let config = StudyConfig::builder("demo")
///     .params(["vf1", "ent"])
///     .observations(["olr", "rsr"])
///     .targets([240.0, 100.0])
///     .ensemble_size(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.obs_names().len(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct StudyConfigBuilder {
    name: String,
    param_names: Vec<String>,
    obs_names: Vec<String>,
    fixed_params: ParameterSet,
    ensemble_size: usize,
    scales: Option<Vec<f64>>,
    targets: Option<Vec<f64>>,
    cov_total: Option<DMatrix<f64>>,
    cov_int_var: Option<DMatrix<f64>>,
    key_precision: usize,
    provisional: Option<ProvisionalConfig>,
    ranges: BTreeMap<String, ParamRange>,
    steps: BTreeMap<String, f64>,
    begin: Option<Vec<f64>>,
    optimum: Option<Vec<f64>>,
}

impl StudyConfigBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_names: Vec::new(),
            obs_names: Vec::new(),
            fixed_params: ParameterSet::new(),
            ensemble_size: 1,
            scales: None,
            targets: None,
            cov_total: None,
            cov_int_var: None,
            key_precision: DEFAULT_PRECISION,
            provisional: None,
            ranges: BTreeMap::new(),
            steps: BTreeMap::new(),
            begin: None,
            optimum: None,
        }
    }

    /// Names of the varying parameters, in the order optimizers pass them.
    #[must_use]
    pub fn params<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.param_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Names of the observations.
    #[must_use]
    pub fn observations<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.obs_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Parameters held fixed for every model.
    #[must_use]
    pub fn fixed_params(mut self, fixed: ParameterSet) -> Self {
        self.fixed_params = fixed;
        self
    }

    /// Ensemble members per parameter set (at least 1).
    #[must_use]
    pub fn ensemble_size(mut self, n: usize) -> Self {
        self.ensemble_size = n;
        self
    }

    /// Scale factors, in observation order.
    #[must_use]
    pub fn scales(mut self, scales: impl IntoIterator<Item = f64>) -> Self {
        self.scales = Some(scales.into_iter().collect());
        self
    }

    /// Target values, in observation order.
    #[must_use]
    pub fn targets(mut self, targets: impl IntoIterator<Item = f64>) -> Self {
        self.targets = Some(targets.into_iter().collect());
        self
    }

    /// Total error covariance, rows and columns in observation order.
    #[must_use]
    pub fn cov_total(mut self, cov: DMatrix<f64>) -> Self {
        self.cov_total = Some(cov);
        self
    }

    /// Internal variability covariance, rows and columns in observation order.
    #[must_use]
    pub fn cov_int_var(mut self, cov: DMatrix<f64>) -> Self {
        self.cov_int_var = Some(cov);
        self
    }

    /// Significant digits kept for float parameters in keys.
    #[must_use]
    pub fn key_precision(mut self, digits: usize) -> Self {
        self.key_precision = digits;
        self
    }

    /// Enables provisional running.
    #[must_use]
    pub fn provisional(mut self, provisional: ProvisionalConfig) -> Self {
        self.provisional = Some(provisional);
        self
    }

    /// Valid range and finite-difference step for a parameter.
    #[must_use]
    pub fn range(mut self, name: impl Into<String>, min: f64, max: f64, step: f64) -> Self {
        let name = name.into();
        self.ranges.insert(name.clone(), ParamRange { min, max });
        self.steps.insert(name, step);
        self
    }

    /// Starting values, in parameter order.
    #[must_use]
    pub fn begin(mut self, values: impl IntoIterator<Item = f64>) -> Self {
        self.begin = Some(values.into_iter().collect());
        self
    }

    /// Optimum values, in parameter order.
    #[must_use]
    pub fn optimum(mut self, values: impl IntoIterator<Item = f64>) -> Self {
        self.optimum = Some(values.into_iter().collect());
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero ensemble size or an inverted
    /// range, and a dimension error when a vector or matrix does not match
    /// the parameter or observation names.
    pub fn build(self) -> Result<StudyConfig> {
        if self.ensemble_size == 0 {
            return Err(Error::Config("ensemble size must be at least 1".into()));
        }
        if let Some((name, r)) = self.ranges.iter().find(|(_, r)| r.min > r.max) {
            return Err(Error::Config(format!(
                "range for '{name}' is inverted: {} > {}",
                r.min, r.max
            )));
        }

        let obs = &self.obs_names;
        let params = &self.param_names;
        let targets = Series::new(
            obs.clone(),
            self.targets.unwrap_or_else(|| vec![0.0; obs.len()]),
        )?;
        let scales = self.scales.map(|s| Series::new(obs.clone(), s)).transpose()?;
        let cov_total = self
            .cov_total
            .map(|c| LabeledMatrix::square(obs.clone(), c))
            .transpose()?;
        let cov_int_var = self
            .cov_int_var
            .map(|c| LabeledMatrix::square(obs.clone(), c))
            .transpose()?;
        let begin = self.begin.map(|b| Series::new(params.clone(), b)).transpose()?;
        let optimum = self.optimum.map(|b| Series::new(params.clone(), b)).transpose()?;

        Ok(StudyConfig {
            name: self.name,
            param_names: self.param_names,
            obs_names: self.obs_names,
            fixed_params: self.fixed_params,
            ensemble_size: self.ensemble_size,
            scales,
            targets,
            cov_total,
            cov_int_var,
            key_precision: self.key_precision,
            provisional: self.provisional,
            ranges: self.ranges,
            steps: self.steps,
            begin,
            optimum,
        })
    }
}
