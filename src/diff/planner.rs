//! Turns a filtered difference list into an ordered, executable change plan.
//! Ordering is driven by the dependency edges both models carry; a cycle in
//! the combined graph fails the whole plan rather than producing a script
//! that cannot run.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::diff::{Difference, DifferenceKind};
use crate::model::{ObjectDefinition, ObjectId, ObjectType, SchemaModel, SchemaObject};
use crate::mssql::sqlgen;
use crate::util::{Result, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeAction {
    Drop,
    Rename,
    Create,
    Alter,
}

impl ChangeAction {
    pub fn verb(&self) -> &'static str {
        match self {
            ChangeAction::Drop => "drop",
            ChangeAction::Rename => "rename",
            ChangeAction::Create => "create",
            ChangeAction::Alter => "alter",
        }
    }
}

/// One executable step. `statement` may hold several T-SQL statements for
/// in-place table alters; the executor runs each op as one batch.
#[derive(Debug, Clone)]
pub struct ChangeOp {
    pub action: ChangeAction,
    pub object: ObjectId,
    pub statement: String,
    pub depends_on: Vec<ObjectId>,
}

/// Planner output: the full difference list for reporting plus the ordered
/// operations for the included subset.
#[derive(Debug, Clone)]
pub struct SyncScript {
    pub differences: Vec<Difference>,
    pub ops: Vec<ChangeOp>,
}

/// Builds the plan for every included difference. Returns
/// [`SyncError::NoChanges`] when nothing is included, and
/// [`SyncError::UnresolvableDependency`] naming every object on a cycle.
pub fn plan(
    differences: &[Difference],
    source: &SchemaModel,
    target: &SchemaModel,
) -> Result<SyncScript> {
    let included: Vec<&Difference> = differences.iter().filter(|d| d.included).collect();
    if included.is_empty() {
        return Err(SyncError::NoChanges);
    }

    let renames = coalesce_index_renames(&included);
    let mut ops = Vec::new();

    for difference in &included {
        let id = difference.id();
        if let Some(op) = renames.get(&id) {
            // Both halves of a rename pair map to the same op; emit it once,
            // on the OnlySource side.
            if difference.kind == DifferenceKind::OnlySource {
                ops.push(op.clone());
            }
            continue;
        }
        match difference.kind {
            DifferenceKind::OnlySource => {
                let object = difference.source.as_ref().unwrap_or_else(|| {
                    unreachable!("OnlySource carries a source object")
                });
                ops.push(ChangeOp {
                    action: ChangeAction::Create,
                    object: id,
                    statement: create_statement(object),
                    depends_on: Vec::new(),
                });
            }
            DifferenceKind::OnlyTarget => {
                let object = difference.target.as_ref().unwrap_or_else(|| {
                    unreachable!("OnlyTarget carries a target object")
                });
                ops.push(ChangeOp {
                    action: ChangeAction::Drop,
                    object: id,
                    statement: drop_statement_for(object),
                    depends_on: Vec::new(),
                });
            }
            DifferenceKind::Changed => {
                let src = difference.source.as_ref().unwrap_or_else(|| {
                    unreachable!("Changed carries both objects")
                });
                let tgt = difference.target.as_ref().unwrap_or_else(|| {
                    unreachable!("Changed carries both objects")
                });
                ops.push(ChangeOp {
                    action: ChangeAction::Alter,
                    object: id,
                    statement: alter_statement(src, tgt),
                    depends_on: Vec::new(),
                });
            }
            DifferenceKind::Equal => {}
        }
    }

    let ops = order_ops(ops, source, target)?;
    Ok(SyncScript {
        differences: differences.to_vec(),
        ops,
    })
}

fn create_statement(object: &SchemaObject) -> String {
    match &object.definition {
        ObjectDefinition::Table(def) => sqlgen::create_table(&object.id.name, def),
        ObjectDefinition::Index(def) => sqlgen::create_index(&object.id.name, def),
        ObjectDefinition::Routine(def) => sqlgen::create_routine(def),
        ObjectDefinition::Principal(def) => def.definition.trim().to_string(),
    }
}

fn drop_statement_for(object: &SchemaObject) -> String {
    match &object.definition {
        ObjectDefinition::Index(def) => sqlgen::drop_index(&object.id.name, def),
        _ => sqlgen::drop_statement(&object.id),
    }
}

fn alter_statement(source: &SchemaObject, target: &SchemaObject) -> String {
    match (&source.definition, &target.definition) {
        (ObjectDefinition::Table(desired), ObjectDefinition::Table(current)) => {
            sqlgen::alter_table(&source.id.name, desired, current).join("\n")
        }
        (ObjectDefinition::Routine(def), _) => sqlgen::alter_routine(def),
        (ObjectDefinition::Index(def), _) => {
            // Same name, different shape: rebuild.
            format!(
                "{}\n{}",
                drop_statement_for(target),
                sqlgen::create_index(&source.id.name, def)
            )
        }
        (ObjectDefinition::Principal(def), _) => {
            format!("{}\n{}", sqlgen::drop_statement(&source.id), def.definition.trim())
        }
        _ => create_statement(source),
    }
}

/// Pairs an index that exists only in the source with a target-only index of
/// identical shape on the same table; the pair becomes one `sp_rename` op
/// keyed under both identities.
fn coalesce_index_renames(included: &[&Difference]) -> BTreeMap<ObjectId, ChangeOp> {
    let mut renames = BTreeMap::new();
    let new_indexes: Vec<&&Difference> = included
        .iter()
        .filter(|d| d.object_type == ObjectType::Index && d.kind == DifferenceKind::OnlySource)
        .collect();
    let old_indexes: Vec<&&Difference> = included
        .iter()
        .filter(|d| d.object_type == ObjectType::Index && d.kind == DifferenceKind::OnlyTarget)
        .collect();

    let mut taken: BTreeSet<ObjectId> = BTreeSet::new();
    for new in &new_indexes {
        let Some(ObjectDefinition::Index(new_def)) = new.source.as_ref().map(|o| &o.definition)
        else {
            continue;
        };
        for old in &old_indexes {
            if taken.contains(&old.id()) {
                continue;
            }
            let Some(ObjectDefinition::Index(old_def)) =
                old.target.as_ref().map(|o| &o.definition)
            else {
                continue;
            };
            if new_def == old_def {
                let op = ChangeOp {
                    action: ChangeAction::Rename,
                    object: new.id(),
                    statement: sqlgen::rename_index(
                        &new_def.table,
                        sqlgen::leaf_name(&old.name),
                        sqlgen::leaf_name(&new.name),
                    ),
                    depends_on: Vec::new(),
                };
                taken.insert(old.id());
                renames.insert(old.id(), op.clone());
                renames.insert(new.id(), op);
                break;
            }
        }
    }
    renames
}

/// Topological ordering over the per-op dependency graph. Ready ops are
/// released smallest-first by (action, object) so output is reproducible;
/// leftover nodes after the sweep sit on a cycle.
fn order_ops(
    ops: Vec<ChangeOp>,
    source: &SchemaModel,
    target: &SchemaModel,
) -> Result<Vec<ChangeOp>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..ops.len()).map(|i| graph.add_node(i)).collect();
    let index_of: BTreeMap<ObjectId, usize> = ops
        .iter()
        .enumerate()
        .map(|(i, op)| (op.object.clone(), i))
        .collect();

    // Edge a -> b means a must run before b.
    let mut edges: BTreeSet<(usize, usize)> = BTreeSet::new();
    for (i, op) in ops.iter().enumerate() {
        match op.action {
            ChangeAction::Create | ChangeAction::Alter => {
                // Anything the new definition depends on must reach its new
                // shape first, whether that takes a create or an alter.
                for dep in source.dependencies_of(&op.object) {
                    if let Some(&j) = index_of.get(&dep) {
                        if matches!(ops[j].action, ChangeAction::Create | ChangeAction::Alter)
                            && j != i
                        {
                            edges.insert((j, i));
                        }
                    }
                }
            }
            ChangeAction::Drop => {
                // Everything that still references this object in the target
                // must be dropped or altered away first.
                for referrer in target.ids() {
                    if target.dependencies_of(referrer).contains(&op.object) {
                        if let Some(&j) = index_of.get(referrer) {
                            if matches!(ops[j].action, ChangeAction::Drop | ChangeAction::Alter)
                                && j != i
                            {
                                edges.insert((j, i));
                            }
                        }
                    }
                }
            }
            ChangeAction::Rename => {}
        }
    }
    for (a, b) in &edges {
        graph.add_edge(nodes[*a], nodes[*b], ());
    }

    let mut in_degree: Vec<usize> = nodes
        .iter()
        .map(|&n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();
    let mut ready: BTreeSet<(ChangeAction, ObjectId, usize)> = ops
        .iter()
        .enumerate()
        .filter(|(i, _)| in_degree[*i] == 0)
        .map(|(i, op)| (op.action, op.object.clone(), i))
        .collect();

    let mut order: Vec<usize> = Vec::with_capacity(ops.len());
    while let Some(entry) = ready.iter().next().cloned() {
        ready.remove(&entry);
        let (_, _, i) = entry;
        order.push(i);
        for succ in graph.neighbors_directed(nodes[i], Direction::Outgoing) {
            let j = graph[succ];
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.insert((ops[j].action, ops[j].object.clone(), j));
            }
        }
    }

    if order.len() != ops.len() {
        let mut cyclic: Vec<ObjectId> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .flatten()
            .map(|n| ops[graph[n]].object.clone())
            .collect();
        cyclic.sort();
        return Err(SyncError::UnresolvableDependency { objects: cyclic });
    }

    let predecessors: BTreeMap<usize, Vec<ObjectId>> = (0..ops.len())
        .map(|i| {
            let deps = edges
                .iter()
                .filter(|(_, b)| *b == i)
                .map(|(a, _)| ops[*a].object.clone())
                .collect();
            (i, deps)
        })
        .collect();

    let mut ordered: Vec<ChangeOp> = Vec::with_capacity(ops.len());
    let mut ops: Vec<Option<ChangeOp>> = ops.into_iter().map(Some).collect();
    for i in order {
        let mut op = ops[i].take().unwrap_or_else(|| unreachable!("each index appears once"));
        op.depends_on = predecessors.get(&i).cloned().unwrap_or_default();
        ordered.push(op);
    }
    Ok(ordered)
}
