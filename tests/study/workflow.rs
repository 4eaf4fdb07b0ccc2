use nalgebra::DMatrix;
use simrun::prelude::*;

use crate::{linear, process_pending};

fn config() -> StudyConfig {
    StudyConfig::builder("workflow")
        .params(["a", "b", "c", "d", "e"])
        .observations(["o1", "o2"])
        .targets([0.0, 0.0])
        .build()
        .unwrap()
}

fn design() -> DMatrix<f64> {
    DMatrix::from_fn(5, 5, |i, j| 0.1 * i as f64 + if i == j { 1.0 } else { 0.0 })
}

#[test]
fn batch_of_five_needs_exactly_one_submission() {
    let study = Study::new(config()).unwrap();
    let design = design();
    let opts = EvalOptions::new();
    let optimizer = || study.evaluate(&design, &opts).map(|out| out.to_matrix());

    let mut submissions = 0;
    let result = loop {
        match study.run(&optimizer).unwrap() {
            Outcome::Value(v) => break v,
            Outcome::NeedsSubmission(pending) => {
                submissions += 1;
                assert!(submissions <= 1, "second submission requested");
                assert_eq!(pending.len(), 5);
                assert_eq!(study.models_created(), 5);
                assert_eq!(process_pending(&study, linear), 5);
            }
        }
    };

    assert_eq!(submissions, 1);
    assert_eq!(result.nrows(), 5);
    // Row 0 is a = 1.0, b = 0.0.
    assert!((result[(0, 0)] - 2.0).abs() < 1e-12);
    assert!((result[(0, 1)] - 1.0).abs() < 1e-12);
    assert_eq!(study.n_models(), 5);
    assert_eq!(study.models_created(), 0);
}

#[test]
fn rerun_without_new_data_is_idempotent() {
    let study = Study::new(config()).unwrap();
    let design = design();
    let opts = EvalOptions::new();
    let optimizer = || study.evaluate(&design, &opts).map(|out| out.to_matrix());

    let first = study.run(&optimizer).unwrap();
    let models = study.n_models();
    let second = study.run(&optimizer).unwrap();

    assert_eq!(first, second);
    assert_eq!(study.n_models(), models);
    assert_eq!(study.models_created(), 0);
}

#[test]
fn sequential_optimizer_takes_one_round_per_step() {
    let config = StudyConfig::builder("seq")
        .params(["a"])
        .observations(["o1", "o2"])
        .targets([0.0, 0.0])
        .build()
        .unwrap();
    let study = Study::new(config).unwrap();
    let f = study.objective(EvalOptions::new());

    // Three damped fixed-point steps; each depends on the last value.
    let optimizer = || -> core::result::Result<f64, Halt> {
        let mut x = 1.0;
        for _ in 0..3 {
            let y = f(&[x])?;
            x -= 0.1 * y[0];
        }
        Ok(x)
    };

    let mut rounds = 0;
    let x = loop {
        match study.run(&optimizer).unwrap() {
            Outcome::Value(x) => break x,
            Outcome::NeedsSubmission(pending) => {
                assert_eq!(pending.len(), 1);
                process_pending(&study, linear);
                rounds += 1;
            }
        }
    };

    assert_eq!(rounds, 3);
    assert_eq!(study.n_models(), 3);
    // x1 = 1 - 0.2, x2 = x1 - 0.2 x1, x3 = x2 - 0.2 x2.
    assert!((x - 0.8_f64.powi(3)).abs() < 1e-3);
}

#[test]
fn existing_models_answer_without_creation() {
    let params = ["a", "b", "c", "d", "e"].map(|n| (n, 0.5));
    let mut done = Model::new("old0000", params.into_iter().collect());
    done.parameters.insert(simrun::ENSEMBLE_MEMBER, 0_usize);
    done.mark_processed(Series::new(vec!["o1".into(), "o2".into()], vec![3.0, 4.0]).unwrap());
    let store = MemoryStore::with_models([done]);

    let study = Study::builder(config()).store(store).build().unwrap();
    let report = study.reconcile("*.mcfg").unwrap();
    assert_eq!(report.loaded.len(), 1);

    let f = study.objective(EvalOptions::new().sum_square(true));
    let y = study.run(|| f(&[0.5; 5])).unwrap().value().unwrap();
    assert_eq!(y.as_slice(), &[25.0]);
    assert_eq!(study.models_created(), 0);
}

#[test]
fn factory_limit_forces_early_submission() {
    let study = Study::builder(config())
        .factory(NamedModelFactory::new("cap").max_models(2))
        .build()
        .unwrap();
    let design = design();
    let opts = EvalOptions::new().raise_on_missing(false);

    let outcome = study.run(|| study.evaluate(&design, &opts)).unwrap();
    let Outcome::NeedsSubmission(pending) = outcome else {
        panic!("expected a submission request");
    };
    assert_eq!(pending.len(), 2);
}
