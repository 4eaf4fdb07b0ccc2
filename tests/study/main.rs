#![allow(
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation
)]

mod batch;
mod builder;
mod jacobian;
mod provisional;
mod summary;
mod workflow;

use simrun::{ParameterSet, Series, Study};

/// Plays the batch system: runs every pending model through `sim` and
/// marks it processed. Returns how many models were processed.
fn process_pending(study: &Study, sim: impl Fn(&ParameterSet) -> Vec<f64>) -> usize {
    let obs = study.config().obs_names().to_vec();
    let pending = study.pending();
    for key in &pending {
        let model = study.cache().lookup(key).expect("pending key is cached");
        let mut model = model.write();
        let values = sim(&model.parameters);
        model.mark_processed(Series::new(obs.clone(), values).expect("one value per observation"));
    }
    pending.len()
}

/// Two observations from a linear model of `a` and `b`.
fn linear(p: &ParameterSet) -> Vec<f64> {
    let a = p.get_f64("a").unwrap_or(0.0);
    let b = p.get_f64("b").unwrap_or(0.0);
    vec![2.0 * a + b, a - b]
}
