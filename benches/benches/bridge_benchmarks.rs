//! Bridge hot-path benchmarks
//!
//! Classification lookup, input marshalling with and without a copy, and
//! broadcast throughput over growing batch sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use star_bridge::array_bridge::fixed_input;
use star_bridge::{broadcast, classify, BroadcastArg, BroadcastRule, ErrorState, HostArray};
use star_ffi::ErrorSubsystem;

fn native_mxv(native: &mut ErrorSubsystem, m: &[f64], v: &[f64], out: &mut [f64]) {
    native.enter("mxv");
    for (i, o) in out.iter_mut().enumerate() {
        *o = (0..3).map(|j| m[i * 3 + j] * v[j]).sum();
    }
    native.leave("mxv");
}

fn bench_classify(c: &mut Criterion) {
    let ids = [
        "LIB(MALLOCFAILURE)",
        "LIB(INDEXOUTOFRANGE)",
        "LIB(BODYNAMENOTFOUND)",
        "LIB(NOTAREALCODE)",
    ];
    c.bench_function("classify", |b| {
        b.iter(|| {
            for id in &ids {
                black_box(classify(black_box(id)));
            }
        })
    });
}

fn bench_fixed_input(c: &mut Criterion) {
    let mut group = c.benchmark_group("fixed_input");
    let mut state = ErrorState::new();

    let exact = HostArray::from_vec(vec![1.0f64; 36], vec![6, 6]).unwrap();
    group.bench_function("zero_copy", |b| {
        b.iter(|| {
            let arg = fixed_input::<f64>(&mut state, "m", black_box(&exact), &[6, 6]).unwrap();
            black_box(arg.as_slice()[0]);
        })
    });

    let ints = HostArray::from_vec(vec![1i32; 36], vec![6, 6]).unwrap();
    group.bench_function("converted", |b| {
        b.iter(|| {
            let arg = fixed_input::<f64>(&mut state, "m", black_box(&ints), &[6, 6]).unwrap();
            black_box(arg.as_slice()[0]);
        })
    });

    let transposed = exact.transpose();
    group.bench_function("strided", |b| {
        b.iter(|| {
            let arg = fixed_input::<f64>(&mut state, "m", black_box(&transposed), &[6, 6]).unwrap();
            black_box(arg.as_slice()[0]);
        })
    });

    group.finish();
}

fn bench_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast_mxv");
    let mut state = ErrorState::new();

    for batch in [1usize, 16, 256, 4096] {
        let m = HostArray::from_vec(vec![0.5f64; batch * 9], vec![batch, 3, 3]).unwrap();
        let v = HostArray::from_vec(vec![2.0f64; batch * 3], vec![batch, 3]).unwrap();
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, _| {
            b.iter(|| {
                broadcast(
                    &mut state,
                    "mxv_c",
                    &[BroadcastArg::new("m", &m, &[3, 3]), BroadcastArg::new("v", &v, &[3])],
                    &[&[3]],
                    BroadcastRule::Strict,
                    |native, ins: &[&[f64]], outs: &mut [&mut [f64]]| {
                        native_mxv(native, ins[0], ins[1], &mut *outs[0])
                    },
                )
                .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_classify, bench_fixed_input, bench_broadcast);
criterion_main!(benches);
