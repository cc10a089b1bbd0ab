// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![expect(missing_docs, reason = "Benchmark code")]

use std::hint::black_box;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use segbuf::{Buffer, Options, SEGMENT_SIZE, SegmentPool};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

// A few segments worth of data, so that every operation crosses segment boundaries.
const TEST_DATA_LEN: usize = SEGMENT_SIZE * 4 + 123;

fn test_data() -> Vec<u8> {
    (0..=u8::MAX).cycle().take(TEST_DATA_LEN).collect()
}

fn filled(pool: &SegmentPool, data: &[u8]) -> Buffer {
    let mut buffer = Buffer::with_pool(pool.clone());
    buffer.write_slice(data);
    buffer
}

fn entrypoint(c: &mut Criterion) {
    let pool = SegmentPool::new();
    let data = test_data();

    let text = "lorem ipsum dolor sit amet ünïcödé ".repeat(TEST_DATA_LEN / 40);
    let lines = "a line of moderately typical length\r\n".repeat(TEST_DATA_LEN / 40);

    let mut group = c.benchmark_group("Buffer");

    group.bench_function("write_slice", |b| {
        b.iter_batched_ref(
            || Buffer::with_pool(pool.clone()),
            |buffer| buffer.write_slice(black_box(&data)),
            BatchSize::SmallInput,
        );
    });

    group.bench_function("write_from_whole_segments", |b| {
        b.iter_batched_ref(
            || (Buffer::with_pool(pool.clone()), filled(&pool, &data)),
            |(sink, source)| sink.write_all_from(source),
            BatchSize::SmallInput,
        );
    });

    group.bench_function("clone", |b| {
        let buffer = filled(&pool, &data);
        b.iter(|| black_box(&buffer).clone());
    });

    group.bench_function("read_num_be_u64", |b| {
        b.iter_batched_ref(
            || filled(&pool, &data),
            |buffer| {
                while buffer.len() >= 8 {
                    black_box(buffer.read_num_be::<u64>().expect("length was checked"));
                }
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("index_of_last_byte", |b| {
        let mut buffer = filled(&pool, &data);
        buffer.write_byte(b'\n');
        b.iter(|| black_box(&buffer).index_of(b'\n'));
    });

    group.bench_function("read_utf8_to_end", |b| {
        b.iter_batched_ref(
            || filled(&pool, text.as_bytes()),
            |buffer| buffer.read_utf8_to_end().expect("valid UTF-8"),
            BatchSize::SmallInput,
        );
    });

    group.bench_function("read_utf8_line", |b| {
        b.iter_batched_ref(
            || filled(&pool, lines.as_bytes()),
            |buffer| {
                while let Some(line) = buffer.read_utf8_line().expect("valid UTF-8") {
                    black_box(line);
                }
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("select", |b| {
        let options = Options::new(["GET ", "HEAD ", "POST ", "PUT ", "DELETE ", "OPTIONS "]);
        let request = filled(&pool, b"OPTIONS * HTTP/1.1\r\n");
        b.iter(|| black_box(&request).try_select(&options));
    });

    group.bench_function("sha256", |b| {
        let buffer = filled(&pool, &data);
        b.iter(|| black_box(&buffer).sha256());
    });

    group.finish();
}
