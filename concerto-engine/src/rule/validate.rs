//! Static rule checks run before an engine starts

use super::{Rule, RuleGraph};
use crate::concept::ConceptCatalog;
use crate::error::{RuleError, RuleResult};
use crate::types::{ActionRef, Var};
use std::collections::HashSet;
use tracing::warn;

/// Outcome of a successful validation
#[derive(Debug, Clone)]
pub struct Validation {
    pub graph: RuleGraph,
    /// Set when the rule graph has a cycle and strict checking is off
    pub cycle: Option<Vec<ActionRef>>,
}

fn describe(cycle: &[ActionRef]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Check `rules` against `catalog`.
///
/// Every rule must have a when clause and a unique name, reference only
/// declared concepts, actions and queries, never mix `error` with other
/// output fields, and use each variable only after something binds it.
/// A cycle in the rule graph is an error when `strict_acyclic` is set and a
/// warning otherwise.
pub fn validate(
    rules: &[Rule],
    catalog: &dyn ConceptCatalog,
    strict_acyclic: bool,
) -> RuleResult<Validation> {
    let mut names = HashSet::new();
    for rule in rules {
        if !names.insert(rule.name.as_str()) {
            return Err(RuleError::DuplicateRule(rule.name.clone()));
        }
        check_rule(rule, catalog)?;
    }

    let graph = RuleGraph::build(rules);
    let cycle = graph.find_cycle();
    if let Some(cycle) = &cycle {
        let path = describe(cycle);
        if strict_acyclic {
            return Err(RuleError::Cycle(path));
        }
        warn!(cycle = %path, "rule graph is cyclic; the chain depth limit bounds it at runtime");
    }

    Ok(Validation { graph, cycle })
}

fn check_action(rule: &Rule, target: &ActionRef, catalog: &dyn ConceptCatalog) -> RuleResult<()> {
    if !catalog.has_concept(&target.concept) {
        return Err(RuleError::UnknownConcept {
            rule: rule.name.clone(),
            concept: target.concept.clone(),
        });
    }
    if !catalog.has_action(&target.concept, &target.name) {
        return Err(RuleError::UnknownAction {
            rule: rule.name.clone(),
            concept: target.concept.clone(),
            action: target.name.clone(),
        });
    }
    Ok(())
}

fn check_query(rule: &Rule, target: &ActionRef, catalog: &dyn ConceptCatalog) -> RuleResult<()> {
    if !catalog.has_concept(&target.concept) {
        return Err(RuleError::UnknownConcept {
            rule: rule.name.clone(),
            concept: target.concept.clone(),
        });
    }
    if !catalog.has_query(&target.concept, &target.name) {
        return Err(RuleError::UnknownQuery {
            rule: rule.name.clone(),
            concept: target.concept.clone(),
            query: target.name.clone(),
        });
    }
    Ok(())
}

fn require_bound<'a>(
    rule: &Rule,
    bound: &HashSet<Var>,
    vars: impl IntoIterator<Item = &'a Var>,
    site: impl Fn() -> String,
) -> RuleResult<()> {
    match vars.into_iter().find(|var| !bound.contains(*var)) {
        Some(var) => Err(RuleError::UnboundVariable {
            rule: rule.name.clone(),
            var: var.clone(),
            site: site(),
        }),
        None => Ok(()),
    }
}

fn check_rule(rule: &Rule, catalog: &dyn ConceptCatalog) -> RuleResult<()> {
    if rule.when.is_empty() {
        return Err(RuleError::EmptyWhen(rule.name.clone()));
    }

    // Every variable in a when clause is bound once the join succeeds
    let mut bound: HashSet<Var> = HashSet::new();
    for pattern in &rule.when {
        check_action(rule, &pattern.target, catalog)?;
        if pattern.is_mixed_output() {
            return Err(RuleError::MixedOutputPattern {
                rule: rule.name.clone(),
                concept: pattern.target.concept.clone(),
                action: pattern.target.name.clone(),
            });
        }
        bound.extend(pattern.variables().cloned());
    }

    for (i, step) in rule.where_steps.iter().enumerate() {
        if let Some(target) = step.query_target() {
            check_query(rule, target, catalog)?;
        }
        require_bound(rule, &bound, step.uses(), || format!("where step {}", i + 1))?;
        bound.extend(step.binds());
    }

    for template in &rule.then {
        check_action(rule, &template.target, catalog)?;
        require_bound(rule, &bound, template.variables(), || {
            format!("then {}", template.target)
        })?;
    }

    Ok(())
}
