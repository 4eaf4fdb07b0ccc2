//! Labelled vectors and matrices.
//!
//! Observations, targets and scales are [`Series`]: a value per named
//! observation. Covariances and transforms are [`LabeledMatrix`] values
//! whose columns (and for covariances, rows) are observation names.
//! Missing data is represented by NaN throughout.

use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};

/// A vector of values indexed by label.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "SeriesRepr", into = "SeriesRepr")
)]
pub struct Series {
    labels: Vec<String>,
    values: DVector<f64>,
}

impl Series {
    /// Creates a series from matching labels and values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the lengths differ.
    pub fn new(labels: Vec<String>, values: Vec<f64>) -> Result<Self> {
        if labels.len() != values.len() {
            return Err(Error::DimensionMismatch {
                context: "series",
                expected: labels,
                got: values.iter().map(f64::to_string).collect(),
            });
        }
        Ok(Self {
            labels,
            values: DVector::from_vec(values),
        })
    }

    /// Creates a series with every label set to `value`.
    #[must_use]
    pub fn filled(labels: &[String], value: f64) -> Self {
        Self {
            labels: labels.to_vec(),
            values: DVector::from_element(labels.len(), value),
        }
    }

    /// Creates a series with every value missing (NaN).
    #[must_use]
    pub fn missing(labels: &[String]) -> Self {
        Self::filled(labels, f64::NAN)
    }

    pub(crate) fn from_parts(labels: Vec<String>, values: DVector<f64>) -> Self {
        debug_assert_eq!(labels.len(), values.len());
        Self { labels, values }
    }

    /// The labels, in order.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The values, in label order.
    #[must_use]
    pub fn values(&self) -> &DVector<f64> {
        &self.values
    }

    /// The value for `label`.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<f64> {
        self.position(label).map(|i| self.values[i])
    }

    fn position(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// The number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Iterates `(label, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Conforms the series to `labels`; labels not present become NaN.
    #[must_use]
    pub fn reindex(&self, labels: &[String]) -> Self {
        let values = DVector::from_iterator(
            labels.len(),
            labels.iter().map(|l| self.get(l).unwrap_or(f64::NAN)),
        );
        Self::from_parts(labels.to_vec(), values)
    }

    /// The entries of `labels` that this series does not contain.
    #[must_use]
    pub fn absent<'a>(&self, labels: &'a [String]) -> Vec<&'a str> {
        labels
            .iter()
            .filter(|l| self.position(l).is_none())
            .map(String::as_str)
            .collect()
    }

    /// The labels whose value is NaN.
    #[must_use]
    pub fn null_labels(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, v)| v.is_nan())
            .map(|(l, _)| l)
            .collect()
    }

    /// Returns `true` if any value is NaN.
    #[must_use]
    pub fn has_missing(&self) -> bool {
        self.values.iter().any(|v| v.is_nan())
    }

    /// Multiplies each entry by the entry of `factors` with the same label.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if a label has no factor.
    pub fn scale_by(&self, factors: &Series) -> Result<Self> {
        let aligned = self.aligned(factors, "scaling")?;
        Ok(Self::from_parts(
            self.labels.clone(),
            self.values.component_mul(&aligned),
        ))
    }

    /// Subtracts the entry of `other` with the same label from each entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if a label is not in `other`.
    pub fn sub_aligned(&self, other: &Series) -> Result<Self> {
        let aligned = self.aligned(other, "residual")?;
        Ok(Self::from_parts(self.labels.clone(), &self.values - aligned))
    }

    fn aligned(&self, other: &Series, context: &'static str) -> Result<DVector<f64>> {
        let mut out = DVector::zeros(self.len());
        for (i, label) in self.labels.iter().enumerate() {
            out[i] = other.get(label).ok_or_else(|| Error::DimensionMismatch {
                context,
                expected: self.labels.clone(),
                got: other.labels.clone(),
            })?;
        }
        Ok(out)
    }

    /// The arithmetic mean of `members`, entry by entry.
    ///
    /// All members must share the labels of the first one. A single member
    /// is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if labels differ, or
    /// [`Error::NoObservations`] if `members` is empty.
    pub fn mean(members: &[Series]) -> Result<Self> {
        let Some(first) = members.first() else {
            return Err(Error::NoObservations);
        };
        if members.len() == 1 {
            return Ok(first.clone());
        }
        let mut sum = DVector::zeros(first.len());
        for member in members {
            if member.labels != first.labels {
                return Err(Error::DimensionMismatch {
                    context: "ensemble mean",
                    expected: first.labels.clone(),
                    got: member.labels.clone(),
                });
            }
            sum += &member.values;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = members.len() as f64;
        Ok(Self::from_parts(first.labels.clone(), sum / n))
    }

    /// The sum of the squared values.
    #[must_use]
    pub fn sum_of_squares(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum()
    }
}

/// A dense matrix with labelled rows and columns.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "MatrixRepr", into = "MatrixRepr")
)]
pub struct LabeledMatrix {
    rows: Vec<String>,
    cols: Vec<String>,
    data: DMatrix<f64>,
}

impl LabeledMatrix {
    /// Creates a labelled matrix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the label counts do not match
    /// the shape of `data`.
    pub fn new(rows: Vec<String>, cols: Vec<String>, data: DMatrix<f64>) -> Result<Self> {
        if rows.len() != data.nrows() || cols.len() != data.ncols() {
            return Err(Error::DimensionMismatch {
                context: "labelled matrix",
                expected: rows.into_iter().chain(cols).collect(),
                got: vec![format!("{}x{}", data.nrows(), data.ncols())],
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Creates a square matrix with `labels` on both axes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `data` is not `n × n`.
    pub fn square(labels: Vec<String>, data: DMatrix<f64>) -> Result<Self> {
        Self::new(labels.clone(), labels, data)
    }

    /// Creates a diagonal matrix from a series.
    #[must_use]
    pub fn diagonal(series: &Series) -> Self {
        Self {
            rows: series.labels.clone(),
            cols: series.labels.clone(),
            data: DMatrix::from_diagonal(&series.values),
        }
    }

    /// Row labels.
    #[must_use]
    pub fn row_labels(&self) -> &[String] {
        &self.rows
    }

    /// Column labels.
    #[must_use]
    pub fn col_labels(&self) -> &[String] {
        &self.cols
    }

    /// The underlying matrix.
    #[must_use]
    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Returns `true` if the matrix is square with identical row and column labels.
    #[must_use]
    pub fn is_symmetric_labelled(&self) -> bool {
        self.rows == self.cols
    }

    /// Projects `series` through this matrix: `self · series`.
    ///
    /// The columns must be exactly the labels of `series`, in order; the
    /// result is labelled by the rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the columns do not match.
    pub fn apply(&self, series: &Series) -> Result<Series> {
        if self.cols != series.labels {
            return Err(Error::DimensionMismatch {
                context: "transform",
                expected: self.cols.clone(),
                got: series.labels.clone(),
            });
        }
        Ok(Series::from_parts(
            self.rows.clone(),
            &self.data * &series.values,
        ))
    }

    /// Scales element `(i, j)` by `factors[row_i] * factors[col_j]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if a label has no factor.
    pub fn scale_by(&self, factors: &Series) -> Result<Self> {
        let lookup = |labels: &[String]| -> Result<Vec<f64>> {
            labels
                .iter()
                .map(|l| {
                    factors.get(l).ok_or_else(|| Error::DimensionMismatch {
                        context: "matrix scaling",
                        expected: labels.to_vec(),
                        got: factors.labels.clone(),
                    })
                })
                .collect()
        };
        let r = lookup(&self.rows)?;
        let c = lookup(&self.cols)?;
        let data = DMatrix::from_fn(self.data.nrows(), self.data.ncols(), |i, j| {
            self.data[(i, j)] * r[i] * c[j]
        });
        Ok(Self {
            rows: self.rows.clone(),
            cols: self.cols.clone(),
            data,
        })
    }

    /// Multiplies every element by `factor`.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            rows: self.rows.clone(),
            cols: self.cols.clone(),
            data: &self.data * factor,
        }
    }

    /// Restricts and reorders both axes to `labels`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if a label is absent.
    pub fn select(&self, labels: &[String]) -> Result<Self> {
        let index = |axis: &[String]| -> Result<Vec<usize>> {
            labels
                .iter()
                .map(|l| {
                    axis.iter().position(|a| a == l).ok_or_else(|| Error::DimensionMismatch {
                        context: "matrix selection",
                        expected: labels.to_vec(),
                        got: axis.to_vec(),
                    })
                })
                .collect()
        };
        let ri = index(&self.rows)?;
        let ci = index(&self.cols)?;
        let data = DMatrix::from_fn(ri.len(), ci.len(), |i, j| self.data[(ri[i], ci[j])]);
        Ok(Self {
            rows: labels.to_vec(),
            cols: labels.to_vec(),
            data,
        })
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct SeriesRepr {
    labels: Vec<String>,
    values: Vec<Option<f64>>,
}

#[cfg(feature = "serde")]
impl From<Series> for SeriesRepr {
    fn from(s: Series) -> Self {
        Self {
            values: s.values.iter().map(|v| (!v.is_nan()).then_some(*v)).collect(),
            labels: s.labels,
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<SeriesRepr> for Series {
    type Error = Error;

    fn try_from(r: SeriesRepr) -> Result<Self> {
        Self::new(
            r.labels,
            r.values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect(),
        )
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct MatrixRepr {
    rows: Vec<String>,
    cols: Vec<String>,
    data: Vec<Vec<f64>>,
}

#[cfg(feature = "serde")]
impl From<LabeledMatrix> for MatrixRepr {
    fn from(m: LabeledMatrix) -> Self {
        let data = m
            .data
            .row_iter()
            .map(|row| row.iter().copied().collect())
            .collect();
        Self {
            rows: m.rows,
            cols: m.cols,
            data,
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<MatrixRepr> for LabeledMatrix {
    type Error = Error;

    fn try_from(r: MatrixRepr) -> Result<Self> {
        let ncols = r.cols.len();
        if r.data.iter().any(|row| row.len() != ncols) {
            return Err(Error::Config("ragged matrix rows".into()));
        }
        let data = DMatrix::from_row_iterator(r.data.len(), ncols, r.data.into_iter().flatten());
        Self::new(r.rows, r.cols, data)
    }
}
