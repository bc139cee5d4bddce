//! Matching Performance Benchmarks
//!
//! Measures mask generation against sorted uploads of increasing size.
//!
//! Run with: `cargo bench --bench matching`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use listmatch_server::codec::{decode_hashes, encode_hashes, MAX_REQUEST_HASHES};
use listmatch_server::matching::match_mask;

/// Deterministic spread of hash-like values
fn pseudo_hashes(count: usize, seed: u64) -> Vec<u64> {
    let mut state = seed | 1;
    (0..count)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        })
        .collect()
}

fn bench_match_mask(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_mask");
    let needles = pseudo_hashes(100_000, 7);
    group.throughput(Throughput::Elements(needles.len() as u64));

    for size in [1_000usize, 100_000, 1_000_000] {
        let mut haystack = pseudo_hashes(size, 42);
        haystack.extend_from_slice(&needles[..needles.len() / 10]);
        haystack.sort_unstable();

        group.bench_with_input(BenchmarkId::from_parameter(size), &haystack, |b, haystack| {
            b.iter(|| match_mask(black_box(haystack), black_box(&needles)))
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let encoded = encode_hashes(&pseudo_hashes(1_000_000, 3));

    c.bench_function("decode_1m_hashes", |b| {
        b.iter(|| decode_hashes(black_box(&encoded), MAX_REQUEST_HASHES))
    });
}

criterion_group!(benches, bench_match_mask, bench_decode);
criterion_main!(benches);
