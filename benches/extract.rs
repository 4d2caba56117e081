use criterion::{criterion_group, criterion_main, Criterion};
use pgas_bench::extract::{extract_bandwidth_points, extract_latency};
use pgas_bench::{median_points, primitive::powers_of_two};
use std::fmt::Write;
use std::hint::black_box;

fn sweep_output() -> String {
    let mut out = String::from("size (b)\t\tlatency (us)\t\t\tbandwidth (MiB/s)\n");
    for size in powers_of_two(1 << 20) {
        let latency = 0.5 + size as f64 / 4096.0;
        let bandwidth = size as f64 / latency;
        writeln!(out, "{}\t\t\t{:>10.4}\t\t\t{:>15.2}", size, latency, bandwidth).unwrap();
    }
    out
}

fn bench_extract(c: &mut Criterion) {
    let latency = "===\nAvg Time per Compare+Swap (us): 0.41234567 (412.35 total us)\n";
    let sweep = sweep_output();

    c.bench_function("extract_latency", |b| {
        b.iter(|| extract_latency(black_box(latency)).unwrap())
    });

    c.bench_function("extract_bandwidth_21_sizes", |b| {
        b.iter(|| black_box(extract_bandwidth_points(black_box(&sweep))))
    });

    let trials: Vec<_> = (0..7).map(|_| extract_bandwidth_points(&sweep)).collect();
    c.bench_function("median_points_7_trials", |b| {
        b.iter(|| median_points(black_box(&trials)).unwrap())
    });
}

criterion_group!(benches, bench_extract);
criterion_main!(benches);
