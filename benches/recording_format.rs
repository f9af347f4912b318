use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use recplay::recording::{Headers, RecordEntry, Variables};
use recplay::storage::{from_json, to_json, Recording};

fn recording(entries: usize, body_size: usize) -> Recording {
    let entries = (0..entries)
        .map(|i| {
            let headers: Headers = [("Content-Type", "application/json"), ("x-request-id", "r")]
                .into_iter()
                .collect();
            let mut binary = vec![0u8; body_size];
            binary[0] = 0xff;
            RecordEntry::from_request(
                "PUT",
                format!("https://example.com/blob/{i}"),
                headers,
                format!(r#"{{"n":"{}"}}"#, "x".repeat(body_size)).into_bytes(),
            )
            .with_response(201, Headers::new(), binary)
        })
        .collect();
    Recording::new(entries, [("name", "value")].into_iter().collect::<Variables>())
}

fn bench_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("to_json");

    for size in [100, 10_000] {
        let recording = recording(50, size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| to_json(black_box(&recording)).unwrap());
        });
    }

    group.finish();
}

fn bench_deserialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("from_json");

    for size in [100, 10_000] {
        let json = to_json(&recording(50, size)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| from_json(black_box(&json)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_serialize, bench_deserialize);
criterion_main!(benches);
