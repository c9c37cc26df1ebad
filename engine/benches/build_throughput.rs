//! Criterion benchmarks for tree-build throughput over a scripted oracle.
//!
//! No network involved; these measure the scheduler, the pruning scan, and
//! the rayon fan-out overhead.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use trellis_engine::expand::{build_token_tree, BuildConfig};
use trellis_engine::scripted::ScriptedSampler;

fn benchmark_unpruned_fanout(c: &mut Criterion) {
    let sampler = ScriptedSampler::from_probs(&[("a", 0.5), ("b", 0.3), ("c", 0.2)]);
    let config = BuildConfig {
        max_depth: 6,
        top_k_per_step: 3,
        beam_width: None,
        min_branch_prob: None,
        top_p_mass: None,
        temperature: 0.0,
    };
    c.bench_function("build_unpruned_3pow6", |b| {
        b.iter(|| {
            let build = build_token_tree(&sampler, "The", &config, |_| false).unwrap();
            black_box(build.root.size());
        })
    });
}

fn benchmark_beam_capped(c: &mut Criterion) {
    let sampler = ScriptedSampler::from_probs(&[("a", 0.4), ("b", 0.3), ("c", 0.2), ("d", 0.1)]);
    let config = BuildConfig {
        max_depth: 16,
        top_k_per_step: 4,
        beam_width: Some(8),
        min_branch_prob: None,
        top_p_mass: None,
        temperature: 0.0,
    };
    c.bench_function("build_beam8_depth16", |b| {
        b.iter(|| {
            let build = build_token_tree(&sampler, "The", &config, |_| false).unwrap();
            black_box(build.root.size());
        })
    });
}

fn benchmark_nucleus_pruned(c: &mut Criterion) {
    let sampler = ScriptedSampler::from_probs(&[("a", 0.6), ("b", 0.25), ("c", 0.1), ("d", 0.05)]);
    let config = BuildConfig {
        max_depth: 10,
        top_k_per_step: 4,
        beam_width: None,
        min_branch_prob: Some(0.05),
        top_p_mass: Some(0.9),
        temperature: 0.0,
    };
    c.bench_function("build_pruned_depth10", |b| {
        b.iter(|| {
            let build = build_token_tree(&sampler, "The", &config, |_| false).unwrap();
            black_box(build.root.size());
        })
    });
}

criterion_group!(
    benches,
    benchmark_unpruned_fanout,
    benchmark_beam_capped,
    benchmark_nucleus_pruned
);
criterion_main!(benches);
