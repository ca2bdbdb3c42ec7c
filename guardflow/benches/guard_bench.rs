//! Benchmarks for guard validation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use guardflow::prelude::*;
use serde_json::json;

fn scalar_benchmark(c: &mut Criterion) {
    let guard = Guard::builder(default_registry())
        .use_validator("regex-match", json!({"regex": "^[A-Z]{3}$"}), None, OnFail::Exception)
        .build()
        .unwrap();

    c.bench_function("validate_scalar", |b| {
        b.iter(|| guard.validate(black_box("ABC")).unwrap())
    });
}

fn structured_benchmark(c: &mut Criterion) {
    let guard = Guard::builder(default_registry())
        .for_schema(&json!({
            "type": "object",
            "properties": {
                "sentiment": {"type": "string", "enum": ["positivo", "negativo", "neutro"]},
                "score": {"type": "number", "minimum": 0, "maximum": 1},
                "summary": {"type": "string", "maxLength": 280}
            },
            "required": ["sentiment", "score", "summary"]
        }))
        .build()
        .unwrap();
    let raw = r#"{"sentiment": "neutro", "score": 0.5, "summary": "A balanced review."}"#;

    c.bench_function("validate_structured", |b| {
        b.iter(|| guard.validate(black_box(raw)).unwrap())
    });
}

criterion_group!(benches, scalar_benchmark, structured_benchmark);
criterion_main!(benches);
