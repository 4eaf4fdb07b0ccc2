use nalgebra::DMatrix;
use simrun::prelude::*;

use crate::{linear, process_pending};

const DESIGN: [[f64; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];

fn study(max_cases: usize) -> Study {
    let config = StudyConfig::builder("prov")
        .params(["a", "b"])
        .observations(["o1", "o2"])
        .targets([1.0, 1.0])
        .cov_total(DMatrix::identity(2, 2))
        .provisional(ProvisionalConfig::new(max_cases).rng_seed(42))
        .build()
        .unwrap();
    Study::builder(config).build().unwrap()
}

/// Evaluates a fixed design one point at a time, as an optimizer building
/// its initial simplex would.
fn initial_design(study: &Study) -> Result<Outcome<f64>> {
    let f = study.objective(EvalOptions::new().raise_on_missing(false).sum_square(true));
    study.run(|| {
        let mut total = 0.0;
        for point in &DESIGN {
            total += f(point)?[0];
        }
        Ok(total)
    })
}

#[test]
fn speculative_pass_creates_whole_design_at_once() {
    let study = study(10);

    let Outcome::NeedsSubmission(pending) = initial_design(&study).unwrap() else {
        panic!("expected a submission request");
    };
    assert_eq!(pending.len(), 4);
    assert_eq!(study.provisional_counts(), Some((4, 4)));

    process_pending(&study, linear);
    let total = initial_design(&study).unwrap().value().unwrap();
    // o1 = 2a + b, o2 = a - b over the design.
    assert!((total - (0.0 + 5.0 + 2.0 + 9.0)).abs() < 1e-12);
    assert_eq!(study.models_created(), 0);
}

#[test]
fn budget_spreads_design_over_rounds() {
    let study = study(2);
    let mut rounds = 0;
    while initial_design(&study).unwrap().needs_submission() {
        rounds += 1;
        assert_eq!(process_pending(&study, linear), 2);
        assert!(rounds <= 2);
    }
    assert_eq!(rounds, 2);
    assert_eq!(study.n_models(), 4);
}

#[test]
fn repeated_run_revisits_the_same_keys() {
    let study = study(10);
    let first = initial_design(&study).unwrap();
    let second = initial_design(&study).unwrap();

    assert_eq!(first, second);
    assert_eq!(study.n_models(), 4);
    assert_eq!(study.models_created(), 0);
}

/// An optimizer that cannot cope with missing values.
fn fragile(study: &Study) -> impl FnMut() -> core::result::Result<f64, Halt> + '_ {
    let f = study.objective(EvalOptions::new().raise_on_missing(false));
    move || {
        let y = f(&[0.5, 0.5])?;
        if y.iter().any(|v| v.is_nan()) {
            return Err(Error::Algorithm("singular matrix".into()).into());
        }
        Ok(y.sum())
    }
}

#[test]
fn transient_optimizer_failure_means_submit() {
    let strict = study(10);
    assert!(matches!(strict.run(fragile(&strict)), Err(Error::Algorithm(_))));

    let lenient = study(10);
    let outcome = lenient
        .run_with(fragile(&lenient), |e| matches!(e, Error::Algorithm(_)))
        .unwrap();
    assert_eq!(outcome, Outcome::NeedsSubmission(lenient.pending()));
    assert_eq!(lenient.models_created(), 1);
}
