//! Integration Tests for the Expression DAG
//!
//! These tests drive the engine the way a simulation does: build trees,
//! bind them to world objects, insert them, change the world and update.

use evaltree_core::graph::{
    ExprArena, ExprDag, GraphIdAllocator, NodeId, PendingQueue, Removal, StrictExprDag,
};
use evaltree_core::ops::signature::OperatorRegistry;
use evaltree_core::ops::{BinaryOp, UnaryOp};
use evaltree_core::value::{Fuzzy, Value, ValueHolder};
use evaltree_core::world::{Source, Substitution, WorldObject};
use evaltree_core::{DagConfig, EvalError, ExprTemplate};

fn actor(name: &str, x: i64) -> WorldObject {
    let object = WorldObject::new(name);
    object.set_attribute("x", Value::Int(x));
    object
}

/// gt(intlink(role.x), int(5)), instantiated with `subst`.
fn gt_x_5(arena: &mut ExprArena, role: &str, subst: &Substitution) -> NodeId {
    let x = arena.int_link(role, "x");
    let five = arena.int(5);
    let gt = arena.binary(BinaryOp::IntGt, x, five).unwrap();
    arena.instantiate(gt, subst, &[]).unwrap();
    gt
}

fn truth<Q: PendingQueue>(dag: &ExprDag<Q>, id: NodeId) -> Option<Fuzzy> {
    dag.value(id).and_then(ValueHolder::as_fuzzy)
}

/// Bindings to different sources never merge, even with equal values;
/// the same source under another role name does.
#[test]
fn sharing_follows_source_identity() {
    let ids = GraphIdAllocator::new();
    let mut dag: ExprDag = ExprDag::new(&ids);
    let a1 = actor("a1", 7);
    let a2 = actor("a2", 7);
    let s1 = Source::of(&a1);
    let s2 = Source::of(&a2);

    let t1 = gt_x_5(dag.arena_mut(), "A", &Substitution::new().with("A", s1.clone()));
    let r1 = dag.insert_expression(t1).unwrap();
    let t2 = gt_x_5(dag.arena_mut(), "A", &Substitution::new().with("A", s2));
    let r2 = dag.insert_expression(t2).unwrap();
    let t3 = gt_x_5(dag.arena_mut(), "B", &Substitution::new().with("B", s1));
    let r3 = dag.insert_expression(t3).unwrap();

    assert_ne!(r1, r2);
    assert_eq!(r1, r3);
    assert_eq!(dag.root_usage(r1), 2);
    assert_eq!(dag.root_usage(r2), 1);

    let five_1 = dag.arena().node(r1).unwrap().child(1);
    let five_2 = dag.arena().node(r2).unwrap().child(1);
    assert_eq!(five_1, five_2);
    assert_eq!(dag.leaves().count(), 3);
    assert_eq!(dag.resident_count(), 5);

    assert_eq!(truth(&dag, r1), Some(Fuzzy::TRUE));
    a1.set_attribute("x", Value::Int(3));
    dag.update();
    assert_eq!(truth(&dag, r1), Some(Fuzzy::FALSE));
    assert_eq!(truth(&dag, r2), Some(Fuzzy::TRUE));
}

#[test]
fn removal_is_reference_counted() {
    let ids = GraphIdAllocator::new();
    let mut dag: ExprDag = ExprDag::new(&ids);
    let a = actor("a", 7);
    let subst = Substitution::new().with("A", Source::of(&a));

    let mut root = None;
    for _ in 0..3 {
        let tree = gt_x_5(dag.arena_mut(), "A", &subst);
        root = Some(dag.insert_expression(tree).unwrap());
    }
    let root = root.unwrap();
    assert_eq!(dag.root_usage(root), 3);

    assert_eq!(
        dag.remove_expression(root).unwrap(),
        Removal::StillReferenced { remaining: 2 }
    );
    assert_eq!(
        dag.remove_expression(root).unwrap(),
        Removal::StillReferenced { remaining: 1 }
    );
    assert_eq!(dag.resident_count(), 3);
    assert_eq!(dag.remove_expression(root).unwrap(), Removal::Released { freed: 3 });
    assert_eq!(dag.resident_count(), 0);
    assert_eq!(dag.leaves().count(), 0);
    assert!(dag.arena().is_empty());

    // One call too many: reported, nothing changes.
    assert!(matches!(
        dag.remove_expression(root),
        Err(EvalError::UnknownRoot { .. })
    ));
    assert!(dag.arena().is_empty());
}

#[test]
fn shared_subtree_survives_removal_of_one_user() {
    let ids = GraphIdAllocator::new();
    let mut dag: ExprDag = ExprDag::new(&ids);
    let a = actor("a", 7);
    let subst = Substitution::new().with("A", Source::of(&a));

    let gt = gt_x_5(dag.arena_mut(), "A", &subst);
    let gt = dag.insert_expression(gt).unwrap();

    let arena = dag.arena_mut();
    let inner = gt_x_5(arena, "A", &subst);
    let not = arena.unary(UnaryOp::Not, inner).unwrap();
    arena.instantiate(not, &subst, &[]).unwrap();
    let not = dag.insert_expression(not).unwrap();
    assert_eq!(dag.arena().node(not).unwrap().child(0), Some(gt));

    // gt is still a child of not, so nothing below it is freed.
    assert_eq!(dag.remove_expression(gt).unwrap(), Removal::Released { freed: 0 });
    assert!(dag.is_resident(gt));
    assert_eq!(dag.resident_count(), 4);

    assert_eq!(dag.remove_expression(not).unwrap(), Removal::Released { freed: 4 });
    assert!(!dag.is_resident(gt));
}

/// or(n, not(not(n))) with n = gt(x, 5): the FIFO queue recomputes `or`
/// twice, the depth-ordered queue once.
fn diamond<Q: PendingQueue>(dag: &mut ExprDag<Q>, subst: &Substitution) -> NodeId {
    let arena = dag.arena_mut();
    let x = arena.int_link("A", "x");
    let five = arena.int(5);
    let n = arena.binary(BinaryOp::IntGt, x, five).unwrap();
    let not1 = arena.unary(UnaryOp::Not, n).unwrap();
    let not2 = arena.unary(UnaryOp::Not, not1).unwrap();
    let root = arena.binary(BinaryOp::Or, n, not2).unwrap();
    arena.instantiate(root, subst, &[]).unwrap();
    dag.insert_expression(root).unwrap()
}

#[test]
fn fifo_queue_may_recompute_twice() {
    let ids = GraphIdAllocator::new();
    let mut dag: ExprDag = ExprDag::new(&ids);
    let a = actor("a", 7);
    let root = diamond(&mut dag, &Substitution::new().with("A", Source::of(&a)));
    assert_eq!(truth(&dag, root), Some(Fuzzy::TRUE));

    a.set_attribute("x", Value::Int(3));
    let stats = dag.update();
    assert_eq!(stats.recomputed, 6);
    assert_eq!(stats.changed, 5);
    assert_eq!(truth(&dag, root), Some(Fuzzy::FALSE));
}

#[test]
fn strict_queue_recomputes_each_node_once() {
    let ids = GraphIdAllocator::new();
    let mut dag: StrictExprDag = StrictExprDag::new(&ids);
    let a = actor("a", 7);
    let root = diamond(&mut dag, &Substitution::new().with("A", Source::of(&a)));

    a.set_attribute("x", Value::Int(3));
    let stats = dag.update();
    assert_eq!(stats.recomputed, 5);
    assert_eq!(stats.changed, 5);
    assert_eq!(truth(&dag, root), Some(Fuzzy::FALSE));
    assert_eq!(dag.pending_len(), 0);
}

#[test]
fn unchanged_values_stop_propagation() {
    let ids = GraphIdAllocator::new();
    let mut dag: StrictExprDag = StrictExprDag::new(&ids);
    let a = actor("a", 7);
    let root = gt_x_5(dag.arena_mut(), "A", &Substitution::new().with("A", Source::of(&a)));
    let root = dag.insert_expression(root).unwrap();

    a.set_attribute("x", Value::Int(8));
    let stats = dag.update();
    assert_eq!(stats.recomputed, 2);
    assert_eq!(stats.changed, 1);
    assert_eq!(truth(&dag, root), Some(Fuzzy::TRUE));
}

#[test]
fn copies_of_resident_nodes_are_refused() {
    let ids = GraphIdAllocator::new();
    let mut dag: ExprDag = ExprDag::new(&ids);
    let a = actor("a", 7);
    let subst = Substitution::new().with("A", Source::of(&a));

    let tree = gt_x_5(dag.arena_mut(), "A", &subst);
    let copy = dag.arena_mut().create_copy(tree).unwrap();
    let root = dag.insert_expression(tree).unwrap();

    assert!(matches!(
        dag.arena_mut().create_copy(root),
        Err(EvalError::CopyOfResident { .. })
    ));

    // The copy is unbound until instantiated; afterwards it merges.
    dag.arena_mut().instantiate(copy, &subst, &[]).unwrap();
    assert_eq!(dag.insert_expression(copy).unwrap(), root);
    assert_eq!(dag.root_usage(root), 2);
}

#[test]
fn absorbed_and_removed_links_drop_their_subscriptions() {
    let ids = GraphIdAllocator::new();
    let mut dag: ExprDag = ExprDag::new(&ids);
    let a = actor("a", 7);
    let subst = Substitution::new().with("A", Source::of(&a));
    let attr = a.attribute("x").unwrap();

    let first = gt_x_5(dag.arena_mut(), "A", &subst);
    let root = dag.insert_expression(first).unwrap();
    let second = gt_x_5(dag.arena_mut(), "A", &subst);
    assert_eq!(attr.subscriber_count(), 2);
    dag.insert_expression(second).unwrap();
    assert_eq!(attr.subscriber_count(), 1);

    dag.remove_expression(root).unwrap();
    dag.remove_expression(root).unwrap();
    assert_eq!(attr.subscriber_count(), 0);
}

#[test]
fn retargeting_a_source_reaches_bound_links() {
    let ids = GraphIdAllocator::new();
    let mut dag: ExprDag = ExprDag::new(&ids);
    let near = actor("near", 7);
    let far = actor("far", 1);
    let source = Source::of(&near);
    let subst = Substitution::new().with("A", source.clone());

    let root = gt_x_5(dag.arena_mut(), "A", &subst);
    let root = dag.insert_expression(root).unwrap();
    assert_eq!(truth(&dag, root), Some(Fuzzy::TRUE));

    source.set_object(Some(far.clone()));
    assert!(dag.need_update());
    dag.update();
    assert_eq!(truth(&dag, root), Some(Fuzzy::FALSE));

    // Watches moved along with the source.
    far.set_attribute("x", Value::Int(9));
    dag.update();
    assert_eq!(truth(&dag, root), Some(Fuzzy::TRUE));
    near.set_attribute("x", Value::Int(0));
    assert!(!dag.need_update());

    source.set_object(None);
    dag.update();
    assert!(!dag.value(root).unwrap().is_defined());
}

#[test]
fn missing_attribute_reads_undefined_until_added() {
    let ids = GraphIdAllocator::new();
    let mut dag: ExprDag = ExprDag::new(&ids);
    let bare = WorldObject::new("bare");
    let subst = Substitution::new().with("A", Source::of(&bare));

    let root = gt_x_5(dag.arena_mut(), "A", &subst);
    let root = dag.insert_expression(root).unwrap();
    assert!(!dag.value(root).unwrap().is_defined());

    bare.set_attribute("x", Value::Int(6));
    dag.update();
    assert_eq!(truth(&dag, root), Some(Fuzzy::TRUE));
}

#[test]
fn change_sensors_signals_only_moved_links() {
    let ids = GraphIdAllocator::new();
    let mut dag: ExprDag = ExprDag::new(&ids);
    let a = actor("a", 7);
    let subst = Substitution::new().with("A", Source::of(&a));
    let root = gt_x_5(dag.arena_mut(), "A", &subst);
    dag.insert_expression(root).unwrap();

    assert_eq!(dag.change_sensors(&[]).unwrap(), 0);
    assert!(!dag.need_update());
}

#[test]
fn pending_changes_reach_trees_before_insertion() {
    let ids = GraphIdAllocator::new();
    let mut dag: ExprDag = ExprDag::new(&ids);
    let a = actor("a", 7);
    let subst = Substitution::new().with("A", Source::of(&a));

    let tree = gt_x_5(dag.arena_mut(), "A", &subst);
    a.set_attribute("x", Value::Int(2));
    let root = dag.insert_expression(tree).unwrap();

    assert_eq!(truth(&dag, root), Some(Fuzzy::FALSE));
    assert!(!dag.need_update());
}

#[test]
fn unbound_links_merge_by_role() {
    let ids = GraphIdAllocator::new();
    let mut dag: ExprDag = ExprDag::new(&ids);
    let arena = dag.arena_mut();
    let a = arena.int_link("A", "x");
    let b = arena.int_link("A", "x");
    let c = arena.int_link("B", "x");

    let a = dag.insert_expression(a).unwrap();
    assert_eq!(dag.insert_expression(b).unwrap(), a);
    assert_ne!(dag.insert_expression(c).unwrap(), a);
    assert_eq!(dag.leaves().count(), 2);
}

#[test]
fn templates_build_shareable_trees() {
    let ids = GraphIdAllocator::new();
    let registry = OperatorRegistry::standard();
    let mut dag: ExprDag = ExprDag::new(&ids);
    let a = actor("a", 4);
    a.set_attribute("hungry", Value::Fuzzy(Fuzzy::TRUE));
    let subst = Substitution::new().with("me", Source::of(&a));

    let template = ExprTemplate::from_json(
        r#"{
            "op": "and",
            "children": [
                {"op": "fuzzylink", "role": "me", "attribute": "hungry"},
                {"op": "lt", "children": [
                    {"op": "intlink", "role": "me", "attribute": "x"},
                    {"op": "int", "value": 5}
                ]}
            ]
        }"#,
    )
    .unwrap();

    let mut roots = Vec::new();
    for _ in 0..2 {
        let tree = template.build(&registry, dag.arena_mut()).unwrap();
        dag.arena_mut().instantiate(tree, &subst, &[]).unwrap();
        roots.push(dag.insert_expression(tree).unwrap());
    }
    assert_eq!(roots[0], roots[1]);
    assert_eq!(dag.resident_count(), 5);
    assert_eq!(truth(&dag, roots[0]), Some(Fuzzy::TRUE));

    a.set_attribute("hungry", Value::Fuzzy(Fuzzy::FALSE));
    dag.update();
    assert_eq!(truth(&dag, roots[0]), Some(Fuzzy::FALSE));
}

#[test]
fn dump_to_writes_graphviz_file() {
    let ids = GraphIdAllocator::new();
    let config = DagConfig {
        debug_labels: true,
        ..DagConfig::default()
    };
    let mut dag: ExprDag = ExprDag::with_config(&ids, config);
    let a = actor("a", 7);
    let subst = Substitution::new().with("A", Source::of(&a));
    for _ in 0..2 {
        let tree = gt_x_5(dag.arena_mut(), "A", &subst);
        dag.insert_expression(tree).unwrap();
    }

    let path = std::env::temp_dir().join(format!("evaltree-dump-{}.dot", dag.id()));
    dag.dump_to(&path).unwrap();
    let dot = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert!(dot.starts_with(&format!("digraph DAG_{} {{", dag.id())));
    assert!(dot.contains(" used:2\"];"));
    assert!(dot.contains(" : id="));
    assert!(dot.contains("level=1"));
}

#[test]
fn dags_from_one_allocator_get_distinct_ids() {
    let ids = GraphIdAllocator::new();
    let first: ExprDag = ExprDag::new(&ids);
    let second: StrictExprDag = StrictExprDag::new(&ids);
    assert_ne!(first.id(), second.id());
    assert_eq!(first.id().get() + 1, second.id().get());
}
