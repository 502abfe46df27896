//! Concept registry and the catalog interface rule validation checks against

use super::Concept;
use crate::error::{EngineError, RuleError, RuleResult};
use crate::log::Output;
use crate::types::{ActionRef, Record};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// What rule validation needs to know about the available concepts.
///
/// Implemented by the live [`ConceptRegistry`] and by the declarative
/// catalog of a rule file, so the same checks run in both places.
pub trait ConceptCatalog {
    /// Check if a concept with this name exists
    fn has_concept(&self, concept: &str) -> bool;

    /// Check if the concept declares this action
    fn has_action(&self, concept: &str, action: &str) -> bool;

    /// Check if the concept declares this query
    fn has_query(&self, concept: &str, query: &str) -> bool;
}

struct Entry {
    concept: Arc<dyn Concept>,
    actions: Vec<String>,
    queries: Vec<String>,
}

/// Name → concept table
#[derive(Default)]
pub struct ConceptRegistry {
    entries: HashMap<String, Entry>,
}

impl ConceptRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a concept under its own name
    pub fn register(&mut self, concept: Arc<dyn Concept>) -> RuleResult<()> {
        let name = concept.name().to_string();
        if self.entries.contains_key(&name) {
            return Err(RuleError::DuplicateConcept(name));
        }
        let entry = Entry {
            actions: concept.actions(),
            queries: concept.queries(),
            concept,
        };
        self.entries.insert(name, entry);
        Ok(())
    }

    /// Look up a concept by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Concept>> {
        self.entries.get(name).map(|entry| &entry.concept)
    }

    /// Registered concept names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered concepts
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Perform `target` with `input`
    pub async fn perform(&self, target: &ActionRef, input: Record) -> Result<Output, EngineError> {
        let concept = self
            .get(&target.concept)
            .ok_or_else(|| EngineError::UnknownConcept(target.concept.clone()))?;
        Ok(concept.perform(&target.name, input).await)
    }

    /// Run the query `target` with `input`. Query calls are never logged.
    pub async fn query(&self, target: &ActionRef, input: Record) -> Result<Vec<Record>, String> {
        let concept = self
            .get(&target.concept)
            .ok_or_else(|| format!("unknown concept {}", target.concept))?;
        let rows = concept.query(&target.name, input).await?;
        debug!(query = %target, rows = rows.len(), "query returned");
        Ok(rows)
    }
}

impl ConceptCatalog for ConceptRegistry {
    fn has_concept(&self, concept: &str) -> bool {
        self.entries.contains_key(concept)
    }

    fn has_action(&self, concept: &str, action: &str) -> bool {
        self.entries
            .get(concept)
            .is_some_and(|entry| entry.actions.iter().any(|a| a == action))
    }

    fn has_query(&self, concept: &str, query: &str) -> bool {
        self.entries
            .get(concept)
            .is_some_and(|entry| entry.queries.iter().any(|q| q == query))
    }
}
