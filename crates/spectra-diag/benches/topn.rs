//! Top-N selection benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use spectra_diag::TopHeap;
use spectra_metrics::TopEntry;

fn entries(count: usize) -> Vec<TopEntry> {
    let mut state = 0x2545F4914F6CDD1Du64;
    (0..count)
        .map(|i| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            TopEntry::file(format!("/srv/data/file-{:06}", i), state % 1_000_000)
        })
        .collect()
}

fn bench_topn(c: &mut Criterion) {
    let input = entries(100_000);

    let mut group = c.benchmark_group("topn");
    for capacity in [10usize, 50, 500] {
        group.bench_function(format!("push_100k_cap_{}", capacity), |b| {
            b.iter(|| {
                let mut heap = TopHeap::new(capacity);
                for entry in &input {
                    heap.push(black_box(entry.clone()));
                }
                black_box(heap.drain_sorted())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_topn);
criterion_main!(benches);
