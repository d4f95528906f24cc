//! Benchmarks for rule insertion and incremental updates
use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use evaltree_core::graph::{
    DepthOrderedQueue, ExprDag, FifoQueue, GraphIdAllocator, NodeId, PendingQueue,
};
use evaltree_core::ops::{BinaryOp, UnaryOp};
use evaltree_core::value::{Fuzzy, Value};
use evaltree_core::world::{Source, Substitution, WorldObject};

/// `rule_i = or(gt(x, i), not(and(hungry, gt(x, i))))`, all sharing `x`
/// and `hungry`.
fn insert_rules<Q: PendingQueue>(
    dag: &mut ExprDag<Q>,
    subst: &Substitution,
    count: i64,
) -> Vec<NodeId> {
    (0..count)
        .map(|i| {
            let arena = dag.arena_mut();
            let x = arena.int_link("A", "x");
            let threshold = arena.int(i);
            let gt = arena.binary(BinaryOp::IntGt, x, threshold).unwrap();
            let x2 = arena.int_link("A", "x");
            let threshold2 = arena.int(i);
            let gt2 = arena.binary(BinaryOp::IntGt, x2, threshold2).unwrap();
            let hungry = arena.fuzzy_link("A", "hungry");
            let both = arena.binary(BinaryOp::And, hungry, gt2).unwrap();
            let not = arena.unary(UnaryOp::Not, both).unwrap();
            let root = arena.binary(BinaryOp::Or, gt, not).unwrap();
            arena.instantiate(root, subst, &[]).unwrap();
            dag.insert_expression(root).unwrap()
        })
        .collect()
}

fn world() -> (WorldObject, Substitution) {
    let actor = WorldObject::new("actor");
    actor.set_attribute("x", Value::Int(0));
    actor.set_attribute("hungry", Value::Fuzzy(Fuzzy::TRUE));
    let subst = Substitution::new().with("A", Source::of(&actor));
    (actor, subst)
}

// ===== Insertion Benchmarks =====

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_expression");
    for count in [16i64, 128, 512] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let (_actor, subst) = world();
            b.iter(|| {
                let ids = GraphIdAllocator::new();
                let mut dag: ExprDag = ExprDag::new(&ids);
                black_box(insert_rules(&mut dag, &subst, count));
            });
        });
    }
    group.finish();
}

// ===== Update Benchmarks =====

fn bench_update<Q: PendingQueue>(c: &mut Criterion, name: &str) {
    let mut group = c.benchmark_group(name);
    for count in [16i64, 128, 512] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let (actor, subst) = world();
            let ids = GraphIdAllocator::new();
            let mut dag: ExprDag<Q> = ExprDag::new(&ids);
            insert_rules(&mut dag, &subst, count);
            let mut x = 0;
            b.iter(|| {
                x = (x + 37) % count;
                actor.set_attribute("x", Value::Int(x));
                black_box(dag.update());
            });
        });
    }
    group.finish();
}

fn bench_update_fifo(c: &mut Criterion) {
    bench_update::<FifoQueue>(c, "update_fifo");
}

fn bench_update_strict(c: &mut Criterion) {
    bench_update::<DepthOrderedQueue>(c, "update_strict");
}

criterion_group!(benches, bench_insert, bench_update_fifo, bench_update_strict);
criterion_main!(benches);
