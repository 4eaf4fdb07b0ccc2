use nalgebra::DMatrix;
use simrun::prelude::*;

use crate::{linear, process_pending};

fn study() -> Study {
    let config = StudyConfig::builder("views")
        .params(["a", "b"])
        .observations(["o1", "o2"])
        .targets([2.0, 1.0])
        .cov_total(DMatrix::identity(2, 2))
        .range("a", 0.0, 2.0, 0.1)
        .range("b", 0.0, 2.0, 0.1)
        .build()
        .unwrap();
    Study::new(config).unwrap()
}

fn evaluate(study: &Study, points: &[[f64; 2]]) {
    let params = DMatrix::from_fn(points.len(), 2, |i, j| points[i][j]);
    let _ = study.run(|| study.evaluate(&params, &EvalOptions::new()));
}

#[test]
fn display_reports_status_counts() {
    let study = study();
    evaluate(&study, &[[1.0, 0.0], [0.0, 1.0]]);
    assert_eq!(study.to_string(), "Name: views Nmodels: 2 Status: CREATED: 2");

    process_pending(&study, linear);
    assert_eq!(study.to_string(), "Name: views Nmodels: 2 Status: PROCESSED: 2");
}

#[test]
fn no_observations_before_processing() {
    let study = study();
    evaluate(&study, &[[1.0, 0.0]]);
    assert!(study.obs(false, false).unwrap().is_none());
    assert!(study.cost(false).unwrap().is_none());
    assert!(study.best_model(false).unwrap().is_none());
    assert!((study.params(true).unwrap().data()[(0, 0)] - 0.5).abs() < 1e-12);
}

#[test]
fn best_model_has_lowest_cost() {
    let study = study();
    // (1, 0) hits the targets exactly: o1 = 2, o2 = 1.
    evaluate(&study, &[[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
    process_pending(&study, linear);

    let (name, cost) = study.best_model(false).unwrap().unwrap();
    assert!(cost.abs() < 1e-12);
    let status = study.status();
    assert_eq!(status[&name], ModelStatus::Processed);

    let obs = study.obs(false, true).unwrap().unwrap();
    let row = obs.row_labels().iter().position(|n| *n == name).unwrap();
    assert!(obs.data().row(row).iter().all(|v| v.abs() < 1e-12));
}
