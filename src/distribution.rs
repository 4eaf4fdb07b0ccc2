//! Multivariate normal distribution for synthetic observations.

use nalgebra::{DMatrix, DVector};
use rand::RngExt;
use rand::rngs::StdRng;

use crate::error::{Error, Result};
use crate::series::{LabeledMatrix, Series};

/// Relative tolerance for negative eigenvalues of a covariance matrix.
const PSD_TOLERANCE: f64 = 1e-8;

/// A multivariate normal over labelled observations.
///
/// The covariance is factorised once at construction. A covariance that is
/// not positive semi-definite is accepted at construction (its labels are
/// still validated) but every draw from it fails with
/// [`Error::InvalidCovariance`], so a degenerate configuration can never
/// silently produce samples.
#[derive(Clone, Debug)]
pub struct EvaluationDistribution {
    mean: Series,
    cov: LabeledMatrix,
    factor: core::result::Result<DMatrix<f64>, f64>,
}

impl EvaluationDistribution {
    /// Creates a distribution from a mean and covariance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDistribution`] if the covariance is not
    /// square, its row labels differ from its column labels, or the mean
    /// is labelled differently from the covariance.
    pub fn new(mean: Series, cov: LabeledMatrix) -> Result<Self> {
        let data = cov.data();
        if data.nrows() != data.ncols() {
            return Err(Error::InvalidDistribution("covariance not square".into()));
        }
        if data.nrows() != mean.len() {
            return Err(Error::InvalidDistribution(
                "covariance not compatible with mean".into(),
            ));
        }
        if !cov.is_symmetric_labelled() {
            return Err(Error::InvalidDistribution(
                "covariance row labels differ from column labels".into(),
            ));
        }
        if cov.row_labels() != mean.labels() {
            return Err(Error::InvalidDistribution(
                "mean and covariance labels differ".into(),
            ));
        }

        let factor = psd_factor(data);
        Ok(Self { mean, cov, factor })
    }

    /// The mean.
    #[must_use]
    pub fn mean(&self) -> &Series {
        &self.mean
    }

    /// The covariance.
    #[must_use]
    pub fn cov(&self) -> &LabeledMatrix {
        &self.cov
    }

    /// Draws one observation vector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCovariance`] if the covariance is not
    /// positive semi-definite.
    pub fn sample(&self, rng: &mut StdRng) -> Result<Series> {
        let factor = self
            .factor
            .as_ref()
            .map_err(|&min_eigenvalue| Error::InvalidCovariance { min_eigenvalue })?;
        let z = DVector::from_fn(self.mean.len(), |_, _| sample_standard_normal(rng));
        let values = self.mean.values() + factor * z;
        Ok(Series::from_parts(self.mean.labels().to_vec(), values))
    }
}

/// Returns `B·sqrt(Λ)` for `cov = B·Λ·Bᵀ`, or the offending eigenvalue.
fn psd_factor(cov: &DMatrix<f64>) -> core::result::Result<DMatrix<f64>, f64> {
    let n = cov.nrows();
    if n == 0 {
        return Ok(DMatrix::zeros(0, 0));
    }
    let symmetric = (cov + cov.transpose()) / 2.0;
    if (&symmetric - cov).amax() > PSD_TOLERANCE * cov.amax().max(1.0) {
        return Err(f64::NAN);
    }

    let eigen = symmetric.symmetric_eigen();
    let scale = eigen.eigenvalues.amax().max(1.0);
    let min = eigen.eigenvalues.min();
    if min < -PSD_TOLERANCE * scale {
        return Err(min);
    }

    let roots = DVector::from_fn(n, |i, _| eigen.eigenvalues[i].max(0.0).sqrt());
    Ok(eigen.eigenvectors * DMatrix::from_diagonal(&roots))
}

/// Sample a value from the standard normal distribution using Box-Muller transform.
fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.random_range(f64::EPSILON..=1.0);
    let u2: f64 = rng.random_range(0.0_f64..=core::f64::consts::TAU);
    (-2.0 * u1.ln()).sqrt() * u2.cos()
}
