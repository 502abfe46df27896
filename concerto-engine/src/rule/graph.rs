//! The rule graph: which actions trigger which rules, and what they fire

use super::Rule;
use crate::types::ActionRef;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One rule as seen by the graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleNode {
    pub rule: String,
    /// Actions whose log events evaluate this rule
    pub triggers: Vec<ActionRef>,
    /// Actions this rule invokes
    pub fires: Vec<ActionRef>,
}

/// Rule index plus the action-level dependency graph
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleGraph {
    pub nodes: Vec<RuleNode>,
    #[serde(skip)]
    index: HashMap<ActionRef, Vec<usize>>,
}

impl RuleGraph {
    /// Build the graph for `rules`; rule indices follow slice order
    pub fn build(rules: &[Rule]) -> Self {
        let mut graph = RuleGraph::default();

        for (i, rule) in rules.iter().enumerate() {
            let triggers: BTreeSet<ActionRef> = rule.when.iter().map(|p| p.target.clone()).collect();
            let fires: BTreeSet<ActionRef> = rule.then.iter().map(|t| t.target.clone()).collect();

            for target in &triggers {
                graph.index.entry(target.clone()).or_default().push(i);
            }
            graph.nodes.push(RuleNode {
                rule: rule.name.clone(),
                triggers: triggers.into_iter().collect(),
                fires: fires.into_iter().collect(),
            });
        }

        graph
    }

    /// Indices of the rules whose when clauses mention `concept.action`
    pub fn rules_for(&self, concept: &str, action: &str) -> &[usize] {
        self.index
            .get(&ActionRef::new(concept, action))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Action → actions it can cause through some rule
    pub fn edges(&self) -> BTreeMap<&ActionRef, BTreeSet<&ActionRef>> {
        let mut edges: BTreeMap<&ActionRef, BTreeSet<&ActionRef>> = BTreeMap::new();
        for node in &self.nodes {
            for from in &node.triggers {
                edges.entry(from).or_default().extend(node.fires.iter());
            }
        }
        edges
    }

    /// A cycle in the action graph, as the path that closes it, if one exists
    pub fn find_cycle(&self) -> Option<Vec<ActionRef>> {
        let edges = self.edges();
        let mut marks: HashMap<&ActionRef, Mark> = HashMap::new();
        let mut stack = Vec::new();

        for &start in edges.keys() {
            if marks.contains_key(start) {
                continue;
            }
            if let Some(cycle) = visit(start, &edges, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Active,
    Done,
}

fn visit<'a>(
    node: &'a ActionRef,
    edges: &BTreeMap<&'a ActionRef, BTreeSet<&'a ActionRef>>,
    marks: &mut HashMap<&'a ActionRef, Mark>,
    stack: &mut Vec<&'a ActionRef>,
) -> Option<Vec<ActionRef>> {
    marks.insert(node, Mark::Active);
    stack.push(node);

    for &next in edges.get(node).into_iter().flatten() {
        match marks.get(next) {
            Some(Mark::Active) => {
                let start = stack.iter().position(|n| *n == next)?;
                let mut cycle: Vec<ActionRef> = stack[start..].iter().map(|n| (*n).clone()).collect();
                cycle.push(next.clone());
                return Some(cycle);
            }
            Some(Mark::Done) => {}
            None => {
                if let Some(cycle) = visit(next, edges, marks, stack) {
                    return Some(cycle);
                }
            }
        }
    }

    stack.pop();
    marks.insert(node, Mark::Done);
    None
}
