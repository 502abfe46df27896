//! Validate a rule file and report its rule graph.

use anyhow::{Context, Result};
use concerto_engine::rule::{RuleFile, RuleNode};
use concerto_engine::{ActionRef, EngineConfig};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct CheckSummary<'a> {
    concepts: usize,
    rules: usize,
    nodes: &'a [RuleNode],
    cycle: Option<&'a [ActionRef]>,
}

fn join(refs: &[ActionRef]) -> String {
    refs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load `rules_path`, validate it against its own catalog, and print the result.
pub fn check_rules(config: &EngineConfig, rules_path: &Path, json: bool) -> Result<()> {
    let file = RuleFile::from_file(rules_path)
        .with_context(|| format!("Failed to load rules from {}", rules_path.display()))?;
    let validation = file
        .validate(config.strict_acyclic)
        .with_context(|| format!("Invalid rules in {}", rules_path.display()))?;

    let summary = CheckSummary {
        concepts: file.concepts.len(),
        rules: file.rules.len(),
        nodes: &validation.graph.nodes,
        cycle: validation.cycle.as_deref(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!(
        "Rules OK: {} rules over {} concepts",
        summary.rules, summary.concepts
    );
    for node in summary.nodes {
        println!(
            "- {}: on [{}] -> [{}]",
            node.rule,
            join(&node.triggers),
            join(&node.fires)
        );
    }
    if let Some(cycle) = summary.cycle {
        let path = cycle
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ");
        println!("warning: cyclic rule graph: {}", path);
    }

    Ok(())
}
