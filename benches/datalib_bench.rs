//! Benchmarks for store/decode/load and the text form.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use datalib::{Config, Context, TypeId, Value};
use serde::{Deserialize, Serialize};

const LIBRARY: &str = r#"{
    "enums" : { "status" : [ "ACTIVE", "IDLE", "GONE" ] },
    "types" : {
        "person" : { "members" : [
            { "name" : "name",   "type" : "string" },
            { "name" : "age",    "type" : "uint8" },
            { "name" : "active", "type" : "bitfield:1" }
        ] },
        "profile" : { "members" : [
            { "name" : "id",       "type" : "int64" },
            { "name" : "username", "type" : "string" },
            { "name" : "email",    "type" : "string" },
            { "name" : "status",   "type" : "status" },
            { "name" : "score",    "type" : "fp64" },
            { "name" : "tags",     "type" : "string[]" }
        ] },
        "dataset" : { "members" : [
            { "name" : "numbers", "type" : "int64[]" },
            { "name" : "values",  "type" : "fp64[]" },
            { "name" : "people",  "type" : "person[]" }
        ] }
    }
}"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Person {
    name: String,
    age: u8,
    active: bool,
}

fn context() -> Context {
    let mut ctx = Context::new(Config::new());
    ctx.load_txt_library(LIBRARY).unwrap();
    ctx
}

fn person_value() -> Value {
    Value::from_fields(vec![
        ("name", "Alice".into()),
        ("age", 30u8.into()),
        ("active", 1u8.into()),
    ])
}

fn profile_value() -> Value {
    Value::from_fields(vec![
        ("id", 12345i64.into()),
        ("username", "alice_wonder".into()),
        ("email", "alice@example.com".into()),
        ("status", Value::enumerator("IDLE")),
        ("score", 98.5f64.into()),
        ("tags", vec!["admin", "beta", "eu"].into()),
    ])
}

fn dataset_value(n: usize) -> Value {
    let numbers: Vec<Value> = (0..n as i64).map(Value::Int).collect();
    let values: Vec<Value> = (0..n).map(|i| Value::Float(i as f64 * 0.1)).collect();
    let people: Vec<Value> = (0..n / 10)
        .map(|i| {
            Value::from_fields(vec![
                ("name", format!("person{}", i).into()),
                ("age", ((i % 100) as u8).into()),
                ("active", ((i % 2) as u8).into()),
            ])
        })
        .collect();
    Value::from_fields(vec![
        ("numbers", Value::Array(numbers)),
        ("values", Value::Array(values)),
        ("people", Value::Array(people)),
    ])
}

fn samples() -> Vec<(&'static str, Value)> {
    vec![
        ("person", person_value()),
        ("profile", profile_value()),
        ("dataset", dataset_value(100)),
    ]
}

fn bench_store(c: &mut Criterion) {
    let ctx = context();
    let mut group = c.benchmark_group("store");
    group.throughput(Throughput::Elements(1));

    for (name, value) in samples() {
        let id = TypeId::from_name(name);
        let mut out = vec![0u8; ctx.store(id, &value, &mut []).unwrap()];
        group.bench_function(name, |b| {
            b.iter(|| ctx.store(black_box(id), black_box(&value), black_box(&mut out)).unwrap())
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let ctx = context();
    let mut group = c.benchmark_group("decode");

    for (name, value) in samples() {
        let id = TypeId::from_name(name);
        let packed = ctx.store_to_vec(id, &value).unwrap();
        group.throughput(Throughput::Bytes(packed.len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| ctx.decode(black_box(id), black_box(&packed)).unwrap())
        });
    }

    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let ctx = context();
    let mut group = c.benchmark_group("load");

    for n in [10usize, 100, 1000] {
        let id = TypeId::from_name("dataset");
        let packed = ctx.store_to_vec(id, &dataset_value(n)).unwrap();
        let mut out = vec![0u8; ctx.load_size(id, &packed).unwrap()];
        group.throughput(Throughput::Bytes(packed.len() as u64));
        group.bench_with_input(BenchmarkId::new("dataset", n), &packed, |b, data| {
            b.iter(|| ctx.load(black_box(id), black_box(data), black_box(&mut out)).unwrap())
        });
    }

    group.finish();
}

fn bench_text(c: &mut Criterion) {
    let ctx = context();
    let mut group = c.benchmark_group("text");

    let id = TypeId::from_name("profile");
    let packed = ctx.store_to_vec(id, &profile_value()).unwrap();
    let text = ctx.unpack_text(id, &packed).unwrap();

    group.bench_function("unpack/profile", |b| {
        b.iter(|| ctx.unpack_text(black_box(id), black_box(&packed)).unwrap())
    });
    group.bench_function("pack/profile", |b| {
        b.iter(|| ctx.pack_text_to_vec(black_box(&text)).unwrap())
    });

    group.finish();
}

fn bench_serde(c: &mut Criterion) {
    let ctx = context();
    let mut group = c.benchmark_group("serde");
    group.throughput(Throughput::Elements(1));

    let id = TypeId::from_name("person");
    let person = Person { name: "Alice".into(), age: 30, active: true };
    let packed = datalib::serde::to_bytes(&ctx, id, &person).unwrap();

    group.bench_function("person/to_bytes", |b| {
        b.iter(|| datalib::serde::to_bytes(&ctx, black_box(id), black_box(&person)).unwrap())
    });
    group.bench_function("person/from_bytes", |b| {
        b.iter(|| {
            let p: Person =
                datalib::serde::from_bytes(&ctx, black_box(id), black_box(&packed)).unwrap();
            p
        })
    });

    group.finish();
}

criterion_group!(benches, bench_store, bench_decode, bench_load, bench_text, bench_serde);

criterion_main!(benches);
