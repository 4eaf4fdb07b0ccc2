use std::collections::BTreeMap;

use nalgebra::DMatrix;

use crate::error::Result;
use crate::series::{LabeledMatrix, Series};
use crate::types::ModelStatus;

use super::Study;

impl Study {
    /// Status of every model, by model name.
    #[must_use]
    pub fn status(&self) -> BTreeMap<String, ModelStatus> {
        self.cache.read().statuses()
    }

    /// Varying parameters of every model: one row per model (named),
    /// one column per parameter. Missing values are NaN.
    ///
    /// With `normalize`, each column is mapped onto `[0, 1]` over its
    /// configured range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) when normalizing and
    /// a parameter has no range.
    pub fn params(&self, normalize: bool) -> Result<LabeledMatrix> {
        let names = self.config.param_names();
        let models = self.cache.read().models();

        let mut rows = Vec::with_capacity(models.len());
        let mut data = DMatrix::from_element(models.len(), names.len(), f64::NAN);
        for (i, model) in models.iter().enumerate() {
            let model = model.read();
            rows.push(model.name.clone());
            for (j, name) in names.iter().enumerate() {
                if let Some(v) = model.parameters.get_f64(name) {
                    data[(i, j)] = v;
                }
            }
        }

        if normalize {
            for (j, range) in self.config.param_ranges()?.iter().enumerate() {
                for v in data.column_mut(j).iter_mut() {
                    *v = (*v - range.min) / range.span();
                }
            }
        }
        LabeledMatrix::new(rows, names.to_vec(), data)
    }

    /// Simulated observations of every processed model: one row per model,
    /// one column per configured observation.
    ///
    /// With `normalize`, values are expressed as distance from the target
    /// in standard deviations of the total covariance. Returns `None` when
    /// no model is processed.
    ///
    /// # Errors
    ///
    /// Propagates scaling and covariance errors from the configuration.
    pub fn obs(&self, scale: bool, normalize: bool) -> Result<Option<LabeledMatrix>> {
        let Some((rows, mut data)) = self.processed_obs(scale)? else {
            return Ok(None);
        };
        if normalize {
            let targets = self.config.targets(scale)?;
            let cov = self.config.cov_total(scale)?;
            for (j, (tgt, var)) in targets
                .values()
                .iter()
                .zip(cov.data().diagonal().iter())
                .enumerate()
            {
                let sd = var.sqrt();
                for v in data.column_mut(j).iter_mut() {
                    *v = (*v - tgt) / sd;
                }
            }
        }
        LabeledMatrix::new(rows, self.config.obs_names().to_vec(), data).map(Some)
    }

    /// Cost of every processed model: the root mean square of the
    /// residual against the targets, projected through the transform
    /// matrix and divided by the number of observations.
    ///
    /// # Errors
    ///
    /// Propagates transform and scaling errors from the configuration.
    pub fn cost(&self, scale: bool) -> Result<Option<Series>> {
        let Some((rows, data)) = self.processed_obs(scale)? else {
            return Ok(None);
        };
        let transform = self.config.transform_matrix(scale)?;
        let targets = self.config.targets(scale)?;
        #[allow(clippy::cast_precision_loss)]
        let n_obs = self.config.obs_names().len() as f64;

        let costs = data
            .row_iter()
            .map(|row| {
                let resid = row.transpose() - targets.values();
                let projected = transform.data() * resid;
                (projected.norm_squared() / n_obs).sqrt()
            })
            .collect();
        Series::new(rows, costs).map(Some)
    }

    /// The processed model with the lowest cost, and that cost.
    ///
    /// # Errors
    ///
    /// As [`cost`](Self::cost).
    pub fn best_model(&self, scale: bool) -> Result<Option<(String, f64)>> {
        Ok(self.cost(scale)?.and_then(|costs| {
            costs
                .iter()
                .filter(|(_, c)| !c.is_nan())
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(name, c)| (name.to_owned(), c))
        }))
    }

    fn processed_obs(&self, scale: bool) -> Result<Option<(Vec<String>, DMatrix<f64>)>> {
        let obs_names = self.config.obs_names();
        let scales = self.config.scales();
        let mut rows = Vec::new();
        let mut values = Vec::new();
        for model in self.cache.read().models() {
            let model = model.read();
            let Some(sim) = model.simulated_obs() else {
                continue;
            };
            let mut obs = sim.reindex(obs_names);
            if scale {
                obs = obs.scale_by(&scales)?;
            }
            rows.push(model.name.clone());
            values.extend(obs.values().iter().copied());
        }
        if rows.is_empty() {
            return Ok(None);
        }
        let data = DMatrix::from_row_slice(rows.len(), obs_names.len(), &values);
        Ok(Some((rows, data)))
    }
}
