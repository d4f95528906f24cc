//! Graphviz export of a DAG.
//!
//! Nodes are reached breadth-first from the roots. Each node is written as
//! `id<instance>[ label="..."];` with the root usage count appended for
//! roots, followed by one `id<parent>-> id<child>;` line per child edge.

use std::collections::{HashSet, VecDeque};
use std::fmt::{self, Write};

use indexmap::IndexMap;

use super::arena::ExprArena;
use super::ids::DagId;
use super::node::NodeId;

pub(crate) fn write_dot<W: Write>(
    out: &mut W,
    dag: DagId,
    arena: &ExprArena,
    roots: &IndexMap<NodeId, usize>,
    debug: bool,
) -> fmt::Result {
    writeln!(out, "digraph DAG_{} {{", dag)?;
    writeln!(out)?;

    let mut visited: HashSet<NodeId> = roots.keys().copied().collect();
    let mut queue: VecDeque<NodeId> = roots.keys().copied().collect();
    while let Some(id) = queue.pop_front() {
        let Some(node) = arena.get(id) else {
            continue;
        };
        let name = format!("id{}", node.instance_id());
        let label = escape(&node.info(debug));
        match roots.get(&id) {
            Some(used) => writeln!(out, "{}[ label=\"{} used:{}\"];", name, label, used)?,
            None => writeln!(out, "{}[ label=\"{}\"];", name, label)?,
        }
        for &child in node.children() {
            let Some(child_node) = arena.get(child) else {
                continue;
            };
            writeln!(out, "{}-> id{};", name, child_node.instance_id())?;
            if visited.insert(child) {
                queue.push_back(child);
            }
        }
    }

    writeln!(out, "}}")
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}
