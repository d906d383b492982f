use criterion::{black_box, criterion_group, criterion_main, Criterion};
use policypulse_core::model_client::recover_json;

fn clean_response() -> String {
    serde_json::json!({
        "summary": "This bill establishes a grant program for water infrastructure.",
        "key_points": ["Creates a new grant program", "Sets a ten percent local match"],
        "public_health_impacts": {"affected_populations": ["rural residents"], "severity": "moderate"},
        "impact_category": "infrastructure",
        "impact_level": "medium",
        "confidence_score": 0.82
    })
    .to_string()
}

fn fenced_response() -> String {
    format!("Here is the analysis you requested:\n\n```json\n{}\n```\n\nLet me know if you need anything else.", clean_response())
}

fn malformed_response() -> String {
    let mut body = clean_response();
    body.truncate(body.len() - 20);
    format!("```json\n{}", body)
}

fn bench_recover_json_clean(c: &mut Criterion) {
    let raw = clean_response();
    c.bench_function("recover_json_clean", |b| {
        b.iter(|| recover_json(black_box(&raw)));
    });
}

fn bench_recover_json_fenced(c: &mut Criterion) {
    let raw = fenced_response();
    c.bench_function("recover_json_fenced", |b| {
        b.iter(|| recover_json(black_box(&raw)));
    });
}

fn bench_recover_json_malformed(c: &mut Criterion) {
    let raw = malformed_response();
    c.bench_function("recover_json_malformed", |b| {
        b.iter(|| recover_json(black_box(&raw)));
    });
}

criterion_group!(
    benches,
    bench_recover_json_clean,
    bench_recover_json_fenced,
    bench_recover_json_malformed
);
criterion_main!(benches);
