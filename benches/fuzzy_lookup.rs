//! Benchmarks for fuzzy cache lookup
//!
//! This benchmark measures:
//! - Query normalization
//! - Levenshtein similarity on short queries
//! - ResultCache exact, fuzzy and miss lookups over a warm cache

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gift_search::cache::{ResultCache, ResultCacheConfig};
use gift_search::query::{normalize, similarity};
use gift_search::ProductRecord;

const WORDS: &[&str] = &[
    "wireless", "headphones", "leather", "wallet", "scented", "candle", "yoga", "mat", "coffee",
    "grinder", "board", "game", "silk", "scarf", "smart", "watch", "plush", "bear", "garden",
    "tools", "cookbook", "puzzle", "lamp", "backpack",
];

fn synthetic_query(i: usize) -> String {
    let a = WORDS[i % WORDS.len()];
    let b = WORDS[(i / WORDS.len()) % WORDS.len()];
    format!("{a} {b} {i}")
}

fn warm_cache(entries: usize) -> ResultCache {
    let cache = ResultCache::new(
        ResultCacheConfig::new().with_max_entries(entries * 2),
    );
    for i in 0..entries {
        let record = ProductRecord::new(format!("p-{i}"), synthetic_query(i));
        cache.set(&synthetic_query(i), vec![record]);
    }
    cache
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    group.throughput(Throughput::Elements(1));

    group.bench_function("mixed_case_punctuation", |b| {
        b.iter(|| normalize(black_box("  Wireless   HEADPHONES!! for Dad's birthday ")))
    });

    group.finish();
}

fn bench_similarity(c: &mut Criterion) {
    let mut group = c.benchmark_group("similarity");

    for (name, a, b) in [
        ("near", "wireless headphones", "wireless headphone"),
        ("far", "wireless headphones", "scented candle gift set"),
    ] {
        group.bench_with_input(BenchmarkId::new("pair", name), &(a, b), |bench, (a, b)| {
            bench.iter(|| similarity(black_box(a), black_box(b)))
        });
    }

    group.finish();
}

fn bench_cache_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("result_cache_lookup");

    for size in [100usize, 1000] {
        let cache = warm_cache(size);
        let exact = synthetic_query(size / 2);
        let fuzzy = format!("{exact}x");

        group.bench_with_input(BenchmarkId::new("exact", size), &exact, |b, q| {
            b.iter(|| cache.get(black_box(q)))
        });
        group.bench_with_input(BenchmarkId::new("fuzzy", size), &fuzzy, |b, q| {
            b.iter(|| cache.get(black_box(q)))
        });
        group.bench_with_input(BenchmarkId::new("miss", size), &"asdkjhqwe", |b, q| {
            b.iter(|| cache.get(black_box(q)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_normalize, bench_similarity, bench_cache_lookup);
criterion_main!(benches);
