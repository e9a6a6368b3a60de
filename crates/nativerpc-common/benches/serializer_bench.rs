// Criterion benchmarks for the nativerpc serializer
//
// Run benchmarks with:
//   cargo bench -p nativerpc-common

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nativerpc_common::schema::{SchemaEntry, Serializer, TypeRegistry};
use serde_json::json;
use std::rc::Rc;

fn message_serializer() -> Serializer {
    let registry = Rc::new(
        TypeRegistry::from_entries(vec![
            SchemaEntry::field("Msg", "a", "int"),
            SchemaEntry::field("Msg", "b", "str"),
            SchemaEntry::field("Msg", "c", "bool"),
            SchemaEntry::field("Nested", "msg", "Msg"),
            SchemaEntry::field("Nested", "extra", "dict"),
        ])
        .unwrap(),
    );
    Serializer::new(registry)
}

fn bench_create_instance(c: &mut Criterion) {
    let serializer = message_serializer();
    let mut group = c.benchmark_group("create_instance");

    group.bench_function("flat", |b| {
        b.iter(|| serializer.create_instance(black_box("Msg")).unwrap());
    });

    group.bench_function("nested", |b| {
        b.iter(|| serializer.create_instance(black_box("Nested")).unwrap());
    });

    group.finish();
}

fn bench_from_json(c: &mut Criterion) {
    let serializer = message_serializer();
    let flat = json!({"a": 7, "b": "hi", "c": true});
    let nested = json!({"msg": {"a": 7, "b": "hi", "c": true}, "extra": {"k": [1, 2, 3]}});
    let mut group = c.benchmark_group("from_json");

    group.bench_function("flat", |b| {
        b.iter(|| {
            let mut instance = serializer.create_instance("Msg").unwrap();
            serializer
                .from_json("Msg", black_box(&flat), &mut instance)
                .unwrap();
            instance
        });
    });

    group.bench_function("nested", |b| {
        b.iter(|| {
            let mut instance = serializer.create_instance("Nested").unwrap();
            serializer
                .from_json("Nested", black_box(&nested), &mut instance)
                .unwrap();
            instance
        });
    });

    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let serializer = message_serializer();
    let flat = json!({"a": 7, "b": "hi", "c": true});
    let mut group = c.benchmark_group("round_trip");

    group.bench_function("flat", |b| {
        b.iter(|| {
            let mut instance = serializer.create_instance("Msg").unwrap();
            serializer
                .from_json("Msg", black_box(&flat), &mut instance)
                .unwrap();
            serializer.destroy_and_get("Msg", instance).unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_create_instance, bench_from_json, bench_round_trip);
criterion_main!(benches);
