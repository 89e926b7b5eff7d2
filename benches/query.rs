//! Query benchmarks for gmdex
//!
//! Run with: cargo bench

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use gmdex::index::build::items_from_xml;
use gmdex::index::enrich::EnrichmentStore;
use gmdex::index::Catalog;
use gmdex::query::QueryEngine;
use gmdex::utils::tokenize;

const ADJECTIVES: &[&str] = &["Rare", "Common", "Epic", "Legendary", "Rusty", "Shiny", "Ancient"];
const NOUNS: &[&str] = &["Potion", "Sword", "Shield", "Helmet", "Boots", "Ring", "Staff", "Bow"];
const CLASSES: &[&str] = &["consumable", "weapon", "armor", "accessory"];

/// Synthetic item descriptor with `count` records
fn synthetic_catalog(count: usize) -> Catalog {
    let mut xml = String::from("<ms2>\n");
    for i in 0..count {
        let adjective = ADJECTIVES[i % ADJECTIVES.len()];
        let noun = NOUNS[(i / ADJECTIVES.len()) % NOUNS.len()];
        let class = CLASSES[i % CLASSES.len()];
        xml.push_str(&format!(
            "  <key id=\"{}\" name=\"{} {} {}\" class=\"{}\" feature=\"\" />\n",
            10_000_000 + i,
            adjective,
            noun,
            i % 97,
            class
        ));
    }
    xml.push_str("</ms2>\n");

    items_from_xml(xml.as_bytes(), &EnrichmentStore::default(), 8).expect("synthetic XML parses")
}

fn bench_tokenize(c: &mut Criterion) {
    let inputs = ["", "rare potion", "Potion_of-Life  (Rare)", "class=weapon legendary sw"];

    let mut group = c.benchmark_group("tokenize");
    for input in inputs {
        group.bench_with_input(BenchmarkId::from_parameter(input), input, |b, input| {
            b.iter(|| tokenize(black_box(input)))
        });
    }
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let queries = ["", "r", "rare", "rare potion", "class=weapon sh", "id=1000", "zzz"];

    let mut group = c.benchmark_group("query");
    for size in [1_000, 50_000] {
        let catalog = synthetic_catalog(size);
        let engine = QueryEngine::new(&catalog);

        for query in queries {
            group.bench_with_input(
                BenchmarkId::new(format!("{}", size), query),
                query,
                |b, query| b.iter(|| engine.query(black_box(query)).len()),
            );
        }
    }
    group.finish();
}

fn bench_build(c: &mut Criterion) {
    c.bench_function("build_10k", |b| b.iter(|| synthetic_catalog(black_box(10_000))));
}

criterion_group!(benches, bench_tokenize, bench_query, bench_build);
criterion_main!(benches);
