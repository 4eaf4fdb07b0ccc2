use nalgebra::DMatrix;
use simrun::prelude::*;

use crate::{linear, process_pending};

fn study(optimum: Option<[f64; 2]>) -> Study {
    let mut builder = StudyConfig::builder("jac")
        .params(["a", "b"])
        .observations(["o1", "o2"])
        .targets([0.0, 0.0])
        .cov_total(DMatrix::identity(2, 2))
        .range("a", 0.0, 10.0, 0.5)
        .range("b", 0.0, 10.0, 0.5)
        .begin([5.0, 5.0]);
    if let Some(opt) = optimum {
        builder = builder.optimum(opt);
    }
    Study::new(builder.build().unwrap()).unwrap()
}

#[test]
fn jacobian_of_linear_model() {
    let study = study(Some([2.0, 8.0]));

    let Outcome::NeedsSubmission(pending) = study.run_jacobian(false).unwrap() else {
        panic!("expected a submission request");
    };
    assert_eq!(pending.len(), 3);
    process_pending(&study, linear);

    let result = study.run_jacobian(false).unwrap().value().unwrap();
    // a sits below the centre, b above.
    assert_eq!(result.deltas.values().as_slice(), &[0.5, -0.5]);
    assert_eq!(result.jacobian.row_labels(), ["a", "b"]);
    assert_eq!(result.jacobian.data().shape(), (2, 2));

    // With an orthonormal transform J·Jᵀ matches the untransformed one:
    // rows (2, 1) and (1, -1).
    let expected = DMatrix::from_row_slice(2, 2, &[5.0, 1.0, 1.0, 2.0]);
    let h = result.hessian.data();
    assert!((h - expected).amax() < 1e-9, "hessian {h}");
}

#[test]
fn falls_back_to_begin_parameters() {
    let study = study(None);
    study.run_jacobian(false).unwrap();
    let params = study.params(false).unwrap();
    let data = params.data();
    assert!((0..data.nrows()).any(|i| data[(i, 0)] == 5.0 && data[(i, 1)] == 5.0));
}

#[test]
fn perturbation_outside_range_is_rejected() {
    let config = StudyConfig::builder("jac")
        .params(["a"])
        .observations(["o1"])
        .cov_total(DMatrix::identity(1, 1))
        .range("a", 0.0, 1.0, 2.0)
        .begin([0.5])
        .build()
        .unwrap();
    let study = Study::new(config).unwrap();
    assert!(matches!(study.run_jacobian(false), Err(Error::Config(_))));
    assert_eq!(study.n_models(), 0);
}

#[test]
fn optimized_run_returns_observations() {
    let study = study(Some([2.0, 8.0]));
    assert!(study.run_optimized().unwrap().needs_submission());
    process_pending(&study, linear);

    let obs = study.run_optimized().unwrap().value().unwrap();
    assert_eq!(obs.values().as_slice(), &[12.0, -6.0]);
}

#[test]
fn optimized_run_needs_an_optimum() {
    let study = study(None);
    assert!(matches!(study.run_optimized(), Err(Error::Config(_))));
}
