use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use nalgebra::DMatrix;
use simrun::{
    ENSEMBLE_MEMBER, EvalOptions, KeyCodec, Model, ParameterSet, ProvisionalConfig, Series, Study,
    StudyConfig,
};

fn param_names(dims: usize) -> Vec<String> {
    (0..dims).map(|i| format!("p{i}")).collect()
}

fn obs_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("o{i}")).collect()
}

/// A study whose cache already holds a processed model for every row of `design`.
fn warm_study(dims: usize, n_obs: usize, design: &DMatrix<f64>) -> Study {
    let names = param_names(dims);
    let obs = obs_names(n_obs);
    let config = StudyConfig::builder("bench")
        .params(names.clone())
        .observations(obs.clone())
        .targets(vec![0.0; n_obs])
        .cov_total(DMatrix::identity(n_obs, n_obs))
        .build()
        .unwrap();

    let models = design.row_iter().enumerate().map(|(i, row)| {
        let mut p: ParameterSet = names.iter().cloned().zip(row.iter().copied()).collect();
        p.insert(ENSEMBLE_MEMBER, 0_usize);
        let mut m = Model::new(format!("m{i}"), p);
        let values = (0..n_obs).map(|k| row.sum() + k as f64).collect();
        m.mark_processed(Series::new(obs.clone(), values).unwrap());
        m
    });
    Study::builder(config).models(models).build().unwrap()
}

fn bench_key_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_encode");
    let codec = KeyCodec::default();

    for dims in [4, 16, 64] {
        let p: ParameterSet = param_names(dims)
            .into_iter()
            .enumerate()
            .map(|(i, n)| (n, 0.1 * i as f64 + 1e-3))
            .collect();
        group.bench_with_input(BenchmarkId::new("dims", dims), &p, |b, p| {
            b.iter(|| codec.encode(p));
        });
    }
    group.finish();
}

fn bench_cached_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("cached_batch");
    group.sample_size(20);

    for rows in [10, 100] {
        let design = DMatrix::from_fn(rows, 8, |i, j| (i * 8 + j) as f64 * 0.01);
        let study = warm_study(8, 20, &design);
        let opts = EvalOptions::new()
            .residual(true)
            .transform(study.config().transform_matrix(false).unwrap());
        group.bench_with_input(BenchmarkId::new("rows", rows), &design, |b, design| {
            b.iter(|| study.run(|| study.evaluate(design, &opts)).unwrap());
        });
    }
    group.finish();
}

fn bench_speculative_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("speculative_pass");
    group.sample_size(10);

    for cases in [10, 50] {
        group.bench_with_input(BenchmarkId::new("cases", cases), &cases, |b, &cases| {
            b.iter(|| {
                let config = StudyConfig::builder("speculative")
                    .params(["x"])
                    .observations(obs_names(10))
                    .targets(vec![0.0; 10])
                    .cov_total(DMatrix::identity(10, 10))
                    .provisional(ProvisionalConfig::new(cases))
                    .build()
                    .unwrap();
                let study = Study::new(config).unwrap();
                let f = study.objective(EvalOptions::new().raise_on_missing(false));
                study
                    .run(|| {
                        for i in 0..cases {
                            f(&[i as f64])?;
                        }
                        Ok(())
                    })
                    .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_key_encoding,
    bench_cached_batch,
    bench_speculative_pass
);
criterion_main!(benches);
