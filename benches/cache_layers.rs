//! Benchmarks for the JSON cache layers
//!
//! This benchmark suite measures:
//! - Gzip payload encoding around the compression threshold
//! - Field pruning of anime documents with episodes
//! - Write-then-read through the pruned stack on the memory backend

use std::sync::Arc;
use std::time::Duration;

use anime_catalog_cache::compression::{
    DEFAULT_COMPRESSION_THRESHOLD, decode_payload, encode_payload,
};
use anime_catalog_cache::{
    Anime, AnimeEpisode, BackgroundWriter, CompressedCache, FieldPruner, JsonCacheService,
    JsonLayer, MemoryCache, PruneRules, PrunedCache,
};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;

fn anime(id: usize, episodes: i64) -> Anime {
    Anime {
        id: format!("bench-{id}"),
        title_en: format!("Title {id}"),
        title_jp: format!("Title {id} (JP)"),
        synopsis: Some("A long synopsis. ".repeat(40)),
        genres: vec!["Action".to_string(), "Fantasy".to_string()],
        studios: vec!["Studio".to_string()],
        broadcast: Some("Fridays at 23:00 (JST)".to_string()),
        anime_episodes: (1..=episodes)
            .map(|n| AnimeEpisode {
                id: format!("bench-{id}-{n}"),
                anime_id: format!("bench-{id}"),
                episode: n,
                title_en: Some(format!("Episode {n}")),
                synopsis: Some("Episode synopsis. ".repeat(10)),
                ..AnimeEpisode::default()
            })
            .collect(),
        ..Anime::default()
    }
}

fn setup_stack() -> (PrunedCache, Arc<CompressedCache>, Runtime) {
    let rt = Runtime::new().unwrap_or_else(|_| panic!("Failed to create runtime"));
    let compressed = rt.block_on(async {
        let service = JsonCacheService::new(
            Arc::new(MemoryCache::new()),
            BackgroundWriter::new(Duration::from_secs(1)),
            Duration::from_secs(1),
        );
        Arc::new(CompressedCache::with_default_threshold(Arc::new(service)))
    });
    let pruned = PrunedCache::new(compressed.clone(), PruneRules::standard());
    (pruned, compressed, rt)
}

/// Benchmark payload encoding below and above the threshold
fn bench_compression(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression");

    for size in &[256, 1024, 10_240, 102_400] {
        let json = serde_json::to_vec(&serde_json::json!({ "data": "x".repeat(*size) }))
            .unwrap_or_else(|_| panic!("Failed to encode fixture"));
        let encoded = encode_payload(json.clone(), DEFAULT_COMPRESSION_THRESHOLD)
            .unwrap_or_else(|_| panic!("Failed to compress fixture"));

        group.bench_with_input(BenchmarkId::new("encode", size), &json, |b, json| {
            b.iter(|| black_box(encode_payload(json.clone(), DEFAULT_COMPRESSION_THRESHOLD)));
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &encoded, |b, encoded| {
            b.iter(|| black_box(decode_payload(encoded.clone())));
        });
    }

    group.finish();
}

/// Benchmark pruning documents of growing episode counts
fn bench_pruning(c: &mut Criterion) {
    let mut group = c.benchmark_group("pruning");

    for episodes in &[0_i64, 12, 100] {
        let list: Vec<Anime> = (0..20).map(|i| anime(i, *episodes)).collect();
        for (name, rules) in [("standard", PruneRules::standard()), ("extended", PruneRules::extended())] {
            let pruner = FieldPruner::new(rules);
            group.bench_with_input(BenchmarkId::new(name, episodes), &list, |b, list| {
                b.iter(|| black_box(pruner.to_pruned_value(list)));
            });
        }
    }

    group.finish();
}

/// Benchmark a write followed by a read through the pruned stack
fn bench_round_trip(c: &mut Criterion) {
    let (pruned, compressed, rt) = setup_stack();
    let mut group = c.benchmark_group("pruned_round_trip");
    group.measurement_time(Duration::from_secs(10));

    for episodes in &[0_i64, 24] {
        let value = anime(1, *episodes);
        let key = format!("bench:anime:{episodes}");

        group.bench_with_input(BenchmarkId::new("set_get", episodes), &value, |b, value| {
            b.iter(|| {
                rt.block_on(async {
                    pruned
                        .set_json(&key, value, Duration::from_secs(60))
                        .await
                        .unwrap_or_else(|_| panic!("Failed to set cache"));
                    compressed.service().quiesce().await;
                    let cached: Option<Anime> = pruned
                        .get_json(&key)
                        .await
                        .unwrap_or_else(|_| panic!("Failed to get cache"));
                    black_box(cached);
                });
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compression, bench_pruning, bench_round_trip);
criterion_main!(benches);
