use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use drone_gateway::aggregation::aggregate;
use drone_gateway::codec::canonical::{encode_display, encode_record};
use drone_gateway::codec::{decode, encode_wire};
use drone_gateway::store::ReadingStore;
use drone_gateway::{Reading, Region};

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let values = [1013.25, 500.10, 25.30, 60.10];

    for region in Region::ALL {
        let raw = encode_wire(region, values);
        group.bench_with_input(BenchmarkId::from_parameter(region), &raw, |b, raw| {
            b.iter(|| decode(region, black_box(raw)).unwrap())
        });
    }
    group.finish();
}

fn bench_canonical(c: &mut Criterion) {
    let reading = Reading::new(Region::Leste, 990.10, 410.00, 30.00, 55.50).unwrap();
    c.bench_function("encode_display", |b| b.iter(|| encode_display(black_box(&reading))));
    c.bench_function("encode_record", |b| b.iter(|| encode_record(black_box(&reading)).unwrap()));
}

fn bench_store(c: &mut Criterion) {
    c.bench_function("store_append", |b| {
        let store = ReadingStore::new();
        let reading = Reading::new(Region::Sul, 1000.0, 300.0, 18.0, 70.0).unwrap();
        b.iter(|| store.append(black_box(reading.clone())))
    });

    let store = ReadingStore::new();
    for i in 0..10_000 {
        let region = Region::ALL[i % Region::COUNT];
        store.append(Reading::new(region, 1000.0, 300.0, (i % 40) as f64, 70.0).unwrap());
    }
    c.bench_function("aggregate_10k", |b| {
        b.iter(|| {
            let snapshot = store.snapshot_all();
            aggregate(black_box(&snapshot))
        })
    });
}

criterion_group!(benches, bench_decode, bench_canonical, bench_store);
criterion_main!(benches);
