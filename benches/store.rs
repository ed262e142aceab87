use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use netscope::record::{Headers, Record};
use netscope::RecordStore;

fn record(i: u64) -> Record {
    Record::pending(
        i.to_string(),
        "GET",
        format!("http://example.com/api/{i}"),
        Headers::new(),
        None,
        i,
    )
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_append");

    for capacity in [100, 1_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                let store = RecordStore::new(capacity);
                let mut i = 0;
                b.iter(|| {
                    store.append(black_box(record(i)));
                    i += 1;
                });
            },
        );
    }

    group.finish();
}

fn bench_update_and_list(c: &mut Criterion) {
    let store = RecordStore::new(100);
    for i in 0..100 {
        store.append(record(i));
    }
    let done = record(50).with_error("timeout", 10);

    c.bench_function("store_update", |b| {
        b.iter(|| store.update(black_box(done.clone())));
    });

    c.bench_function("store_list", |b| {
        b.iter(|| black_box(store.list()));
    });
}

criterion_group!(benches, bench_append, bench_update_and_list);
criterion_main!(benches);
