use nalgebra::DMatrix;
use simrun::prelude::*;

fn config() -> StudyConfig {
    StudyConfig::builder("built")
        .params(["a"])
        .observations(["o1"])
        .build()
        .unwrap()
}

#[test]
fn defaults() {
    let study = Study::builder(config()).build().unwrap();
    assert_eq!(study.name(), "built");
    assert_eq!(study.n_models(), 0);
    assert!(!study.has_sampler());
    assert_eq!(study.provisional_counts(), None);
}

#[test]
fn default_factory_names_models_after_the_study() {
    let study = Study::new(config()).unwrap();
    study.sim_obs(&[("a", 1.0)].into_iter().collect(), false).unwrap();
    let names: Vec<String> = study.status().into_keys().collect();
    assert_eq!(names, ["built0000"]);
}

#[test]
fn custom_factory_is_used() {
    let factory = |p: &ParameterSet| {
        let a = p.get_f64("a")?;
        Some(Model::new(format!("a={a}"), p.clone()))
    };
    let study = Study::builder(config()).factory(factory).build().unwrap();
    study.sim_obs(&[("a", 2.5)].into_iter().collect(), false).unwrap();
    assert!(study.status().contains_key("a=2.5"));
}

#[test]
fn reject_policy_applies_to_seeded_models() {
    let p: ParameterSet = [("a", 1.0)].into_iter().collect();
    let result = Study::builder(config())
        .duplicate_policy(DuplicatePolicy::Reject)
        .models([Model::new("x", p.clone()), Model::new("y", p)])
        .build();
    assert!(matches!(result, Err(Error::DuplicateKey { .. })));
}

#[test]
fn sampler_built_from_provisional_config() {
    let config = StudyConfig::builder("p")
        .params(["a"])
        .observations(["o1"])
        .cov_total(DMatrix::identity(1, 1))
        .provisional(ProvisionalConfig::new(3))
        .build()
        .unwrap();
    let study = Study::builder(config).build().unwrap();
    assert!(study.has_sampler());
    assert_eq!(study.provisional_counts(), Some((0, 0)));
}

#[test]
fn provisional_without_covariance_fails_to_build() {
    let config = StudyConfig::builder("p")
        .params(["a"])
        .observations(["o1"])
        .provisional(ProvisionalConfig::new(3))
        .build()
        .unwrap();
    assert!(matches!(Study::builder(config).build(), Err(Error::Config(_))));
}

#[test]
fn new_reports_unusable_provisional_config() {
    let config = StudyConfig::builder("p")
        .params(["a"])
        .observations(["o1"])
        .provisional(ProvisionalConfig::new(3))
        .build()
        .unwrap();
    assert!(matches!(Study::new(config), Err(Error::Config(_))));
}
