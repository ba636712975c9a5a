//! Benchmarks for junction tree inference
//!
//! This benchmark suite measures:
//! - Clique tree construction for chains and stars
//! - Sum-product and max-product calibration
//! - Linear-space versus log-space factors
//! - Marginal queries on a calibrated result

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use scirs2_core::ndarray::Array;
use std::hint::black_box;
use tensorlogic_junction_tree::{
    CliqueTreeBuilder, Factor, FactorGraph, JunctionTree, MarginalCalculator, TableFactor,
};

/// Create a chain MRF for benchmarking
fn create_chain_graph(length: usize, card: usize, log_space: bool) -> FactorGraph {
    let mut graph = FactorGraph::new();

    for i in 0..length {
        graph.add_variable_with_card(format!("X_{}", i), "Domain".to_string(), card);
    }

    for i in 0..(length - 1) {
        let size = card * card;
        let values: Vec<f64> = (0..size)
            .map(|j| ((i + j) % 5) as f64 + 1.0)
            .collect();
        let array = Array::from_shape_vec(vec![card, card], values)
            .unwrap()
            .into_dyn();
        let factor = Factor::from(
            TableFactor::new(vec![format!("X_{}", i), format!("X_{}", i + 1)], array).unwrap(),
        );
        let factor = if log_space { factor.to_log_space() } else { factor };
        graph.add_factor(factor).unwrap();
    }

    graph
}

/// Create a star with `leaves` leaves around a single hub
fn create_star_graph(leaves: usize, card: usize) -> FactorGraph {
    let mut graph = FactorGraph::new();
    graph.add_variable_with_card("Hub".to_string(), "Domain".to_string(), card);

    for i in 0..leaves {
        let leaf = format!("Leaf_{}", i);
        graph.add_variable_with_card(leaf.clone(), "Domain".to_string(), card);
        let values: Vec<f64> = (0..card * card).map(|j| (j % 3) as f64 + 0.5).collect();
        let factor = Factor::dense(vec!["Hub".to_string(), leaf], vec![card, card], values).unwrap();
        graph.add_factor(factor).unwrap();
    }

    graph
}

fn bench_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("clique_tree_construction");

    for length in [10, 50, 200] {
        let graph = create_chain_graph(length, 2, false);
        group.throughput(Throughput::Elements(length as u64));
        group.bench_with_input(BenchmarkId::new("chain", length), &graph, |b, graph| {
            let builder = CliqueTreeBuilder::default();
            b.iter(|| black_box(builder.build(graph).unwrap()));
        });
    }

    for leaves in [10, 50, 200] {
        let graph = create_star_graph(leaves, 2);
        group.throughput(Throughput::Elements(leaves as u64));
        group.bench_with_input(BenchmarkId::new("star", leaves), &graph, |b, graph| {
            let builder = CliqueTreeBuilder::default();
            b.iter(|| black_box(builder.build(graph).unwrap()));
        });
    }

    group.finish();
}

fn bench_sum_product(c: &mut Criterion) {
    let mut group = c.benchmark_group("sum_product");
    let engine = JunctionTree::new();

    for (length, card) in [(10, 2), (50, 2), (10, 8), (50, 8)] {
        let graph = create_chain_graph(length, card, false);
        group.throughput(Throughput::Elements(length as u64));
        group.bench_with_input(
            BenchmarkId::new("chain", format!("{}x{}", length, card)),
            &graph,
            |b, graph| b.iter(|| black_box(engine.compute_marginals(graph).unwrap())),
        );
    }

    group.finish();
}

fn bench_max_product(c: &mut Criterion) {
    let mut group = c.benchmark_group("max_product");
    let engine = JunctionTree::new();

    for length in [10, 50] {
        let graph = create_chain_graph(length, 4, false);
        group.bench_with_input(BenchmarkId::new("chain", length), &graph, |b, graph| {
            b.iter(|| {
                let max = engine.compute_max_marginals(graph).unwrap();
                black_box(max.most_likely_assignment().unwrap())
            })
        });
    }

    group.finish();
}

fn bench_log_space(c: &mut Criterion) {
    let mut group = c.benchmark_group("factor_space");
    let engine = JunctionTree::new();

    for (name, log_space) in [("linear", false), ("log", true)] {
        let graph = create_chain_graph(30, 4, log_space);
        group.bench_function(name, |b| {
            b.iter(|| black_box(engine.compute_marginals(&graph).unwrap()))
        });
    }

    group.finish();
}

fn bench_marginal_queries(c: &mut Criterion) {
    let graph = create_chain_graph(50, 4, false);
    let marginals = JunctionTree::new().compute_marginals(&graph).unwrap();

    c.bench_function("normalized_marginal_chain50", |b| {
        b.iter(|| black_box(marginals.normalized_marginal(&["X_25"]).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_construction,
    bench_sum_product,
    bench_max_product,
    bench_log_space,
    bench_marginal_queries,
);
criterion_main!(benches);
