use chrono::NaiveDate;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use pe_ruleout::features::{AssessmentInput, FeatureMap, FeatureValue};
use pe_ruleout::model::ModelArtifact;
use pe_ruleout::pipeline::{assess, assess_patient};
use rayon::prelude::*;
use std::path::PathBuf;

fn demo_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

fn cohort(size: usize) -> Vec<FeatureMap> {
    (0..size)
        .map(|i| {
            let i = i as f64;
            [
                ("age", 25.0 + (i * 7.0) % 60.0),
                ("triage_hr", 70.0 + (i * 3.0) % 50.0),
                ("triage_rr", 14.0 + i % 12.0),
                ("triage_o2sat", 90.0 + i % 10.0),
                ("triage_sbp", 100.0 + (i * 5.0) % 50.0),
                ("triage_dbp", 60.0 + (i * 2.0) % 30.0),
                ("d_dimer", 200.0 + (i * 37.0) % 2000.0),
            ]
            .into_iter()
            .map(|(name, value)| (name, Some(FeatureValue::Number(value))))
            .collect()
        })
        .collect()
}

fn benchmark_pipeline(c: &mut Criterion) {
    let model = ModelArtifact::load_or_fallback(Some(&demo_path("model.toml")));
    let as_of = NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date");

    let mut group = c.benchmark_group("pipeline");

    let input = AssessmentInput::from_json_file(&demo_path("patient.json")).expect("demo patient");
    group.bench_function("assess_patient_records", |b| {
        b.iter(|| black_box(assess_patient(&model, black_box(&input), as_of)));
    });

    for size in [100_usize, 1_000, 10_000] {
        let patients = cohort(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("sequential", size), &patients, |b, p| {
            b.iter(|| {
                let ruled_out = p
                    .iter()
                    .filter_map(|f| assess(&model, f).ok())
                    .filter(|a| a.result.probability < a.result.threshold)
                    .count();
                black_box(ruled_out);
            });
        });

        group.bench_with_input(BenchmarkId::new("parallel", size), &patients, |b, p| {
            b.iter(|| {
                let ruled_out = p
                    .par_iter()
                    .filter_map(|f| assess(&model, f).ok())
                    .filter(|a| a.result.probability < a.result.threshold)
                    .count();
                black_box(ruled_out);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_pipeline);
criterion_main!(benches);
