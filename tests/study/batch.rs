use nalgebra::DMatrix;
use simrun::prelude::*;
use simrun::ENSEMBLE_MEMBER;

fn config(ensemble: usize) -> StudyConfig {
    StudyConfig::builder("batch")
        .params(["a"])
        .observations(["o1", "o2"])
        .targets([1.0, 1.0])
        .scales([2.0, 1.0])
        .ensemble_size(ensemble)
        .build()
        .unwrap()
}

fn member(a: f64, m: usize, obs: Option<[f64; 2]>) -> Model {
    let mut p: ParameterSet = [("a", a)].into_iter().collect();
    p.insert(ENSEMBLE_MEMBER, m);
    let mut model = Model::new(format!("m{a}_{m}"), p);
    if let Some(obs) = obs {
        model.mark_processed(Series::new(vec!["o1".into(), "o2".into()], obs.to_vec()).unwrap());
    }
    model
}

#[test]
fn ensemble_members_are_averaged() {
    let study = Study::builder(config(2))
        .models([member(0.5, 0, Some([1.0, 2.0])), member(0.5, 1, Some([3.0, 4.0]))])
        .build()
        .unwrap();

    let out = study.evaluate_one(&[0.5], &EvalOptions::new()).unwrap();
    let rows = out.rows().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values().as_slice(), &[2.0, 3.0]);
}

#[test]
fn missing_member_requests_submission() {
    let study = Study::builder(config(2))
        .models([member(0.5, 0, Some([1.0, 2.0])), member(0.5, 1, None)])
        .build()
        .unwrap();

    let err = study.evaluate_one(&[0.5], &EvalOptions::new()).unwrap_err();
    match err {
        Halt::Interrupt(Interrupt::NeedsSubmission { pending }) => assert_eq!(pending.len(), 1),
        other => panic!("unexpected {other:?}"),
    }

    // Without raising, the NaN is returned in place.
    let out = study
        .evaluate_one(&[0.5], &EvalOptions::new().raise_on_missing(false))
        .unwrap();
    assert!(out.rows().unwrap()[0].has_missing());
}

#[test]
fn scale_then_residual_then_sum_of_squares() {
    let study = Study::builder(config(1))
        .models([member(0.5, 0, Some([1.0, 2.0]))])
        .build()
        .unwrap();

    // scaled obs (2, 2), scaled targets (2, 1): residual (0, 1).
    let opts = EvalOptions::new().scale(true).residual(true);
    let out = study.evaluate_one(&[0.5], &opts).unwrap();
    assert_eq!(out.rows().unwrap()[0].values().as_slice(), &[0.0, 1.0]);

    let out = study.evaluate_one(&[0.5], &opts.sum_square(true)).unwrap();
    assert_eq!(out.scalars().unwrap().as_slice(), &[1.0]);
}

#[test]
fn transform_projects_observations() {
    let study = Study::builder(config(1))
        .models([member(0.5, 0, Some([1.0, 2.0]))])
        .build()
        .unwrap();
    let t = LabeledMatrix::new(
        vec!["sum".into()],
        vec!["o1".into(), "o2".into()],
        DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
    )
    .unwrap();

    let out = study.evaluate_one(&[0.5], &EvalOptions::new().transform(t)).unwrap();
    let row = &out.rows().unwrap()[0];
    assert_eq!(row.labels(), ["sum"]);
    assert_eq!(row.values().as_slice(), &[3.0]);
}

#[test]
fn transform_with_wrong_columns_is_a_dimension_error() {
    let study = Study::builder(config(1))
        .models([member(0.5, 0, Some([1.0, 2.0]))])
        .build()
        .unwrap();
    let t = LabeledMatrix::new(
        vec!["ev0".into()],
        vec!["o2".into(), "o1".into()],
        DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
    )
    .unwrap();

    let err = study.evaluate_one(&[0.5], &EvalOptions::new().transform(t)).unwrap_err();
    assert!(matches!(err, Halt::Fault(Error::DimensionMismatch { context: "transform", .. })));
}

#[test]
fn multi_row_batches_keep_row_order() {
    let study = Study::builder(config(1))
        .models([
            member(0.5, 0, Some([1.0, 2.0])),
            member(1.5, 0, Some([5.0, 6.0])),
        ])
        .build()
        .unwrap();
    let params = DMatrix::from_column_slice(2, 1, &[1.5, 0.5]);
    let out = study.evaluate(&params, &EvalOptions::new()).unwrap();
    assert_eq!(out.to_matrix(), DMatrix::from_row_slice(2, 2, &[5.0, 6.0, 1.0, 2.0]));
}

#[test]
fn empty_observation_set_is_rejected() {
    let config = StudyConfig::builder("empty").params(["a"]).build().unwrap();
    let study = Study::new(config).unwrap();
    let err = study.evaluate_one(&[0.5], &EvalOptions::new()).unwrap_err();
    assert!(matches!(err, Halt::Fault(Error::NoObservations)));
    assert_eq!(study.n_models(), 0);
}
