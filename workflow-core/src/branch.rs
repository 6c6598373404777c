//! Judge branches: id allocation, edge sync and first-match selection.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::debug;

use crate::document::*;
use crate::error::{EditError, StructuralError};
use crate::graph::{branch_handle, ops::remove_edges_by_handle};
use crate::value::ValueType;

/// Hands out branch ids never seen before in this session, so a new branch
/// cannot pick up edges left behind by a deleted one.
#[derive(Debug, Clone, Default)]
pub struct BranchIdAllocator {
    next: u64,
    seen: HashSet<String>,
}

impl BranchIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every branch id present in `doc`.
    pub fn observe(&mut self, doc: &GraphDocument) {
        for node in &doc.nodes {
            if let Some(branches) = node.branches() {
                self.observe_branches(branches);
            }
        }
    }

    pub fn observe_branches(&mut self, branches: &[Branch]) {
        self.seen.extend(branches.iter().map(|b| b.id.clone()));
    }

    pub fn allocate(&mut self) -> String {
        loop {
            self.next += 1;
            let id = format!("branch_{}", self.next);
            if self.seen.insert(id.clone()) {
                return id;
            }
        }
    }
}

fn judge_branches_mut<'a>(doc: &'a mut GraphDocument, judge_id: &str) -> Result<&'a mut Vec<Branch>, EditError> {
    let node = doc
        .node_mut(judge_id)
        .ok_or_else(|| StructuralError::UnknownNode(judge_id.to_string()))?;
    let node_type = node.node_type();
    node.branches_mut()
        .ok_or_else(|| EditError::unsupported(format!("{} nodes have no branches", node_type)))
}

/// A Judge must keep exactly one unguarded branch. Other node types pass.
pub fn ensure_single_default(node: &WorkflowNode) -> Result<(), EditError> {
    let Some(branches) = node.branches() else {
        return Ok(());
    };
    let defaults = default_count(branches);
    if defaults != 1 {
        return Err(EditError::unsupported(format!(
            "judge '{}' must keep exactly one default branch, found {}",
            node.id(),
            defaults
        )));
    }
    Ok(())
}

pub fn default_count(branches: &[Branch]) -> usize {
    branches.iter().filter(|b| b.is_default()).count()
}

/// Add a guarded branch just before the default branch. Returns its id.
pub fn add_branch(
    doc: &mut GraphDocument,
    alloc: &mut BranchIdAllocator,
    judge_id: &str,
    label: impl Into<String>,
    condition: PredicateTree,
) -> Result<String, EditError> {
    let branches = judge_branches_mut(doc, judge_id)?;
    let id = alloc.allocate();
    let at = branches.iter().position(Branch::is_default).unwrap_or(branches.len());
    branches.insert(
        at,
        Branch {
            id: id.clone(),
            label: label.into(),
            condition: Some(condition),
        },
    );
    debug!(judge_id, branch_id = %id, "branch added");
    Ok(id)
}

/// Remove a guarded branch and the edge leaving through it.
pub fn remove_branch(doc: &mut GraphDocument, judge_id: &str, branch_id: &str) -> Result<Vec<WorkflowEdge>, EditError> {
    let branches = judge_branches_mut(doc, judge_id)?;
    let pos = branches
        .iter()
        .position(|b| b.id == branch_id)
        .ok_or_else(|| EditError::unsupported(format!("judge '{}' has no branch '{}'", judge_id, branch_id)))?;
    if branches[pos].is_default() {
        return Err(EditError::unsupported("the default branch cannot be removed"));
    }
    branches.remove(pos);
    let removed = remove_edges_by_handle(doc, judge_id, &branch_handle(judge_id, branch_id));
    debug!(judge_id, branch_id, removed_edges = removed.len(), "branch removed");
    Ok(removed)
}

/// Replace a guarded branch's label and condition.
pub fn update_branch(
    doc: &mut GraphDocument,
    judge_id: &str,
    branch_id: &str,
    label: impl Into<String>,
    condition: PredicateTree,
) -> Result<(), EditError> {
    let branches = judge_branches_mut(doc, judge_id)?;
    let branch = branches
        .iter_mut()
        .find(|b| b.id == branch_id)
        .ok_or_else(|| EditError::unsupported(format!("judge '{}' has no branch '{}'", judge_id, branch_id)))?;
    if branch.is_default() {
        return Err(EditError::unsupported("the default branch has no condition"));
    }
    branch.label = label.into();
    branch.condition = Some(condition);
    Ok(())
}

/// Move a guarded branch to `index`, never past the default branch.
pub fn move_branch(doc: &mut GraphDocument, judge_id: &str, branch_id: &str, index: usize) -> Result<(), EditError> {
    let branches = judge_branches_mut(doc, judge_id)?;
    let pos = branches
        .iter()
        .position(|b| b.id == branch_id && !b.is_default())
        .ok_or_else(|| EditError::unsupported(format!("judge '{}' has no guarded branch '{}'", judge_id, branch_id)))?;
    let branch = branches.remove(pos);
    let default_at = branches.iter().position(Branch::is_default).unwrap_or(branches.len());
    branches.insert(index.min(default_at), branch);
    Ok(())
}

// =============================================================================
// SELECTION
// =============================================================================

/// Pick the branch a run would take given concrete variable values keyed
/// by reference path (`${node.key}`). Guarded branches are tried in
/// declaration order; the default branch is taken only when none matches.
pub fn select_branch<'a>(branches: &'a [Branch], values: &HashMap<String, Value>) -> Option<&'a Branch> {
    branches
        .iter()
        .filter(|b| !b.is_default())
        .find(|b| b.condition.as_ref().is_some_and(|tree| eval_tree(tree, values)))
        .or_else(|| branches.iter().find(|b| b.is_default()))
}

fn eval_tree(tree: &PredicateTree, values: &HashMap<String, Value>) -> bool {
    if tree.conditions.is_empty() {
        return false;
    }
    let mut results = tree.conditions.iter().map(|p| match p {
        Predicate::Group(inner) => eval_tree(inner, values),
        Predicate::Compare(cond) => eval_condition(cond, values),
    });
    match tree.logic {
        Logic::And => results.all(|r| r),
        Logic::Or => results.any(|r| r),
    }
}

fn eval_condition(cond: &Condition, values: &HashMap<String, Value>) -> bool {
    let left = operand(&cond.left, values);
    let right = cond.right.as_ref().map(|r| operand(r, values));
    cond.operator.evaluate(&left, right.as_ref())
}

fn operand(r: &VariableRef, values: &HashMap<String, Value>) -> Value {
    let Some(raw) = r.value.as_deref() else {
        return Value::Null;
    };
    match r.value_from {
        ValueFrom::Refer => values.get(raw.trim()).cloned().unwrap_or(Value::Null),
        ValueFrom::Input => literal(raw, &r.value_type),
    }
}

/// Literal typed into a condition, read according to its declared type.
fn literal(raw: &str, ty: &ValueType) -> Value {
    match ty {
        ValueType::Number => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        ValueType::Boolean => match raw.trim() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
        ValueType::Object | ValueType::Array(_) => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        }
        ValueType::String | ValueType::File => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{add_edge, add_node};
    use crate::schema::default_node;
    use crate::value::Operator;
    use serde_json::json;

    fn gt(path: &str, n: &str) -> PredicateTree {
        PredicateTree {
            logic: Logic::And,
            conditions: vec![Predicate::Compare(Condition {
                left: VariableRef::refer("", Some(path.into()), ValueType::Number),
                operator: Operator::Greater,
                right: Some(VariableRef::literal("", n, ValueType::Number)),
            })],
        }
    }

    fn judge_doc() -> GraphDocument {
        let mut doc = GraphDocument::default();
        for (t, id) in [(NodeType::Start, "start"), (NodeType::Judge, "j"), (NodeType::Output, "x"), (NodeType::Output, "y")] {
            add_node(&mut doc, default_node(t, id), ScopeId::Root).unwrap();
        }
        add_edge(&mut doc, WorkflowEdge::new("start", "j")).unwrap();
        doc
    }

    #[test]
    fn new_ids_never_reuse_deleted_ones() {
        let mut doc = judge_doc();
        let mut alloc = BranchIdAllocator::new();
        alloc.observe(&doc);
        let first = add_branch(&mut doc, &mut alloc, "j", "big", gt("${start.age}", "10")).unwrap();
        remove_branch(&mut doc, "j", &first).unwrap();
        let second = add_branch(&mut doc, &mut alloc, "j", "big", gt("${start.age}", "10")).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn observed_ids_are_skipped() {
        let mut doc = judge_doc();
        doc.node_mut("j").unwrap().branches_mut().unwrap().insert(
            0,
            Branch {
                id: "branch_1".into(),
                label: "loaded".into(),
                condition: Some(gt("${start.age}", "1")),
            },
        );
        let mut alloc = BranchIdAllocator::new();
        alloc.observe(&doc);
        assert_eq!(alloc.allocate(), "branch_2");
    }

    #[test]
    fn branches_stay_ahead_of_default() {
        let mut doc = judge_doc();
        let mut alloc = BranchIdAllocator::new();
        let a = add_branch(&mut doc, &mut alloc, "j", "a", gt("${start.age}", "1")).unwrap();
        let b = add_branch(&mut doc, &mut alloc, "j", "b", gt("${start.age}", "2")).unwrap();
        move_branch(&mut doc, "j", &b, 0).unwrap();
        let ids: Vec<&str> = doc.node("j").unwrap().branches().unwrap().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, [b.as_str(), a.as_str(), "default"]);
    }

    #[test]
    fn move_never_passes_a_default_loaded_mid_list() {
        let mut doc = judge_doc();
        let guarded = |id: &str| Branch {
            id: id.into(),
            label: id.into(),
            condition: Some(gt("${start.age}", "1")),
        };
        let branches = doc.node_mut("j").unwrap().branches_mut().unwrap();
        branches.insert(0, guarded("a"));
        branches.push(guarded("b"));

        move_branch(&mut doc, "j", "b", 5).unwrap();
        let ids: Vec<&str> = doc.node("j").unwrap().branches().unwrap().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "default"]);
    }

    #[test]
    fn removing_branch_drops_its_edge_only() {
        let mut doc = judge_doc();
        let mut alloc = BranchIdAllocator::new();
        let b2 = add_branch(&mut doc, &mut alloc, "j", "b2", gt("${start.age}", "1")).unwrap();
        add_edge(&mut doc, WorkflowEdge::new("j", "x").with_source_handle("j_default")).unwrap();
        add_edge(&mut doc, WorkflowEdge::new("j", "y").with_source_handle(branch_handle("j", &b2))).unwrap();

        let removed = remove_branch(&mut doc, "j", &b2).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].target, "y");
        assert!(doc.edges.iter().any(|e| e.target == "x"));
        assert!(matches!(remove_branch(&mut doc, "j", "default"), Err(EditError::Unsupported(_))));
    }

    #[test]
    fn first_declared_match_wins() {
        let branches = vec![
            Branch { id: "a".into(), label: "over 10".into(), condition: Some(gt("${start.age}", "10")) },
            Branch { id: "b".into(), label: "over 5".into(), condition: Some(gt("${start.age}", "5")) },
            Branch { id: "default".into(), label: "Default".into(), condition: None },
        ];
        let pick = |age: i64| {
            let values = HashMap::from([("${start.age}".to_string(), json!(age))]);
            select_branch(&branches, &values).map(|b| b.id.clone())
        };
        assert_eq!(pick(20).as_deref(), Some("a"));
        assert_eq!(pick(7).as_deref(), Some("b"));
        assert_eq!(pick(1).as_deref(), Some("default"));
    }
}
