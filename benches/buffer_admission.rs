// SPDX-License-Identifier: MIT OR Apache-2.0
//! Benchmarks for `Buffer::should_admit`/`admit` under varying key fan-out.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use cnd_buffer::Buffer;
use cnd_core::{ManualClock, OwnedMessage};
use cnd_strategy::FieldExclusionStrategy;
use std::sync::Arc;

fn bench_admit_single_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_admit_single_key");

    for batch in [10, 100, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            b.iter(|| {
                let clock = Arc::new(ManualClock::new());
                let buf = Buffer::new(
                    Arc::new(FieldExclusionStrategy::with_defaults()),
                    clock,
                    60_000,
                    usize::MAX,
                    cnd_envelope::default_extract_fields(),
                );
                for i in 0..batch {
                    let msg = OwnedMessage::with_body(format!(r#"{{"v":1,"timestamp":{i}}}"#));
                    let admission = buf.should_admit(black_box(&msg)).unwrap();
                    buf.admit(admission, msg.headers.clone());
                }
                black_box(buf.buffered_count())
            });
        });
    }

    group.finish();
}

fn bench_admit_fanned_out_keys(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_admit_fanned_out_keys");

    for keys in [10, 100, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(keys), &keys, |b, &keys| {
            b.iter(|| {
                let clock = Arc::new(ManualClock::new());
                let buf = Buffer::new(
                    Arc::new(FieldExclusionStrategy::with_defaults()),
                    clock,
                    60_000,
                    usize::MAX,
                    cnd_envelope::default_extract_fields(),
                );
                for i in 0..keys {
                    let msg = OwnedMessage::with_body(format!(r#"{{"v":{i},"timestamp":1}}"#));
                    let admission = buf.should_admit(black_box(&msg)).unwrap();
                    buf.admit(admission, msg.headers.clone());
                }
                black_box(buf.buffered_count())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_admit_single_key, bench_admit_fanned_out_keys);
criterion_main!(benches);
